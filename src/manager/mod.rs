//! Reconcilers that turn accessory controls into device commands.

mod aircon;
mod fan;

use std::sync::Arc;

use tracing::info;

pub use aircon::{AirConManager, Tuning};
pub use fan::{FanManager, percent_to_speed, speed_to_percent};

use crate::accessory::Accessory;
use crate::command::CommandSender;
use crate::store::ModeStore;
use crate::types::System;

/// Every kind of reconciler the control loop drives.
#[derive(Clone)]
pub enum Manager {
    AirCon(Arc<AirConManager>),
    Fan(Arc<FanManager>),
}

impl Manager {
    pub fn exposes(&self) -> Vec<Accessory> {
        match self {
            Manager::AirCon(m) => m.exposes(),
            Manager::Fan(m) => m.exposes(),
        }
    }

    /// Fold a fresh snapshot in. The zone reconciler also re-derives and
    /// submits commands so drift from the desired state gets corrected.
    pub fn reconcile(&self, system: &System) {
        match self {
            Manager::AirCon(m) => m.reconcile(system),
            Manager::Fan(m) => m.update(system),
        }
    }
}

/// Build the reconcilers for every air-conditioner in `system`.
pub fn managers_for(
    system: &System,
    commands: &CommandSender,
    tuning: Tuning,
    store: Option<Arc<ModeStore>>,
) -> Vec<Manager> {
    let mut managers = Vec::with_capacity(system.aircons.len() * 2);
    for ac in &system.aircons {
        info!(aircon = %ac.id, name = %ac.name, zones = ac.zones.len(), "adding air-conditioner");
        managers.push(Manager::AirCon(AirConManager::new(
            commands.clone(),
            ac,
            tuning,
            store.clone(),
        )));
        managers.push(Manager::Fan(FanManager::new(commands.clone(), ac)));
    }
    managers
}
