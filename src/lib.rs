pub mod accessory;
mod client;
mod command;
mod control;
mod diff;
mod error;
mod logger;
pub mod manager;
mod protocol;
pub mod status;
mod store;
mod types;

pub use client::{MyPlaceClient, MyPlaceClientBuilder};
pub use command::{Command, CommandReceiver, CommandSender, DEFAULT_QUEUE_CAPACITY, channel};
pub use control::{ControlLoop, ControlLoopBuilder, Device, read_initial_state};
pub use diff::diff_systems;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use manager::{AirConManager, FanManager, Manager, Tuning, managers_for};
pub use protocol::{DEFAULT_PORT, WriteRequest};
pub use store::ModeStore;
pub use types::*;
