//! The long-lived loop that polls the device, feeds snapshots to the
//! managers and delivers their command batches.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::command::{Command, CommandReceiver};
use crate::diff::diff_systems;
use crate::manager::Manager;
use crate::types::{Event, System};
use crate::{Error, Result};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);
const DEFAULT_MAX_DEBOUNCE: Duration = Duration::from_secs(1);
const INITIAL_READ_RETRY: Duration = Duration::from_secs(1);

/// Reads and writes device state.
pub trait Device: Send + Sync {
    fn read(&self) -> impl Future<Output = Result<System>> + Send;

    /// Deliver `commands` as a single write.
    fn write(&self, commands: &[Command]) -> impl Future<Output = Result<()>> + Send;
}

impl<D: Device> Device for Arc<D> {
    fn read(&self) -> impl Future<Output = Result<System>> + Send {
        (**self).read()
    }

    fn write(&self, commands: &[Command]) -> impl Future<Output = Result<()>> + Send {
        (**self).write(commands)
    }
}

/// Read the system, retrying every second until it succeeds or `cancel` fires.
pub async fn read_initial_state<D: Device>(device: &D, cancel: &CancellationToken) -> Result<System> {
    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            r = device.read() => r,
        };
        match result {
            Ok(system) => return Ok(system),
            Err(e) => warn!(error = %e, "initial read failed, retrying"),
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(INITIAL_READ_RETRY) => {}
        }
    }
}

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;

pub struct ControlLoopBuilder<D> {
    device: D,
    managers: Vec<Manager>,
    receiver: CommandReceiver,
    poll_interval: Duration,
    debounce: Duration,
    max_debounce: Duration,
    initial_state: Option<System>,
    on_event: Vec<EventCallback>,
}

impl<D: Device> ControlLoopBuilder<D> {
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Quiet period after the latest batch before the accumulated commands
    /// are written.
    pub fn debounce(mut self, window: Duration) -> Self {
        self.debounce = window;
        self
    }

    /// Upper bound on how long a steady stream of batches can defer a write.
    pub fn max_debounce(mut self, limit: Duration) -> Self {
        self.max_debounce = limit;
        self
    }

    /// The snapshot the managers were built from; the first poll's change
    /// events are computed against it.
    pub fn initial_state(mut self, system: System) -> Self {
        self.initial_state = Some(system);
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.on_event.push(Box::new(f));
        self
    }

    pub fn build(self) -> ControlLoop<D> {
        ControlLoop {
            device: self.device,
            managers: self.managers,
            receiver: self.receiver,
            poll_interval: self.poll_interval,
            debounce: self.debounce,
            max_debounce: self.max_debounce.max(self.debounce),
            previous: self.initial_state,
            on_event: self.on_event,
        }
    }
}

pub struct ControlLoop<D> {
    device: D,
    managers: Vec<Manager>,
    receiver: CommandReceiver,
    poll_interval: Duration,
    debounce: Duration,
    max_debounce: Duration,
    previous: Option<System>,
    on_event: Vec<EventCallback>,
}

impl<D: Device> ControlLoop<D> {
    pub fn builder(device: D, managers: Vec<Manager>, receiver: CommandReceiver) -> ControlLoopBuilder<D> {
        ControlLoopBuilder {
            device,
            managers,
            receiver,
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            max_debounce: DEFAULT_MAX_DEBOUNCE,
            initial_state: None,
            on_event: Vec::new(),
        }
    }

    /// Run until `cancel` fires. Read and write failures are logged and never
    /// end the loop.
    pub async fn run(mut self, cancel: CancellationToken) {
        let start = Instant::now() + self.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut queue_open = true;

        info!(poll_interval = ?self.poll_interval, managers = self.managers.len(), "control loop started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                batch = self.receiver.recv(), if queue_open => {
                    let Some(batch) = batch else {
                        debug!("command queue closed");
                        queue_open = false;
                        continue;
                    };
                    let commands = tokio::select! {
                        _ = cancel.cancelled() => break,
                        commands = self.collect(batch) => commands,
                    };
                    self.write(commands, &cancel).await;
                }
                _ = ticker.tick() => self.poll(&cancel).await,
            }
        }

        info!("control loop stopped");
    }

    /// Accumulate batches until none has arrived for a full debounce window.
    async fn collect(&mut self, first: Vec<Command>) -> Vec<Command> {
        let mut commands = first;
        let deadline = Instant::now() + self.max_debounce;

        loop {
            let window = (Instant::now() + self.debounce).min(deadline);
            match tokio::time::timeout_at(window, self.receiver.recv()).await {
                Ok(Some(batch)) => commands.extend(batch),
                Ok(None) | Err(_) => return commands,
            }
        }
    }

    async fn write(&self, commands: Vec<Command>, cancel: &CancellationToken) {
        if commands.is_empty() {
            return;
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            r = self.device.write(&commands) => r,
        };
        if let Err(e) = result {
            warn!(error = %e, commands = commands.len(), "write failed");
        }
    }

    async fn poll(&mut self, cancel: &CancellationToken) {
        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            r = self.device.read() => r,
        };
        match result {
            Ok(system) => self.observe(system),
            Err(e) => warn!(error = %e, "poll failed"),
        }
    }

    fn observe(&mut self, system: System) {
        if let Some(previous) = &self.previous {
            for event in diff_systems(previous, &system) {
                debug!(?event, "state changed");
                for callback in &self.on_event {
                    callback(&event);
                }
            }
        }

        for manager in &self.managers {
            manager.reconcile(&system);
        }
        self.previous = Some(system);
    }
}
