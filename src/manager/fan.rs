use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, warn};

use crate::Error;
use crate::accessory::{
    Accessory, AccessoryInfo, Active, FAN_SPEED_OVERRIDE_ID, Fan, MANUFACTURER, Service,
    aircon_accessory_id,
};
use crate::command::{Command, CommandSender};
use crate::types::{AirCon, FanSpeed, System};

const LOW_MAX: f64 = 33.33;
const MEDIUM_MAX: f64 = 66.66;

/// Rotation speed shown for a fixed fan speed.
pub fn speed_to_percent(speed: FanSpeed) -> Option<f64> {
    match speed {
        FanSpeed::Low => Some(25.0),
        FanSpeed::Medium => Some(50.0),
        FanSpeed::High => Some(100.0),
        FanSpeed::AutoHardware | FanSpeed::AutoSoftware => None,
    }
}

/// Fan speed for a requested rotation speed. Zero hands control back to the
/// unit via `auto`.
pub fn percent_to_speed(percent: f64, auto: FanSpeed) -> FanSpeed {
    if percent <= 0.0 {
        auto
    } else if percent <= LOW_MAX {
        FanSpeed::Low
    } else if percent <= MEDIUM_MAX {
        FanSpeed::Medium
    } else {
        FanSpeed::High
    }
}

struct State {
    prev_speed: FanSpeed,
    auto_speed: FanSpeed,
}

/// Exposes the unit's fan as an override: active means a fixed speed,
/// inactive means the unit's automatic fan.
pub struct FanManager {
    aircon_id: String,
    info: AccessoryInfo,
    fan: Arc<Fan>,
    state: Mutex<State>,
    commands: CommandSender,
}

impl FanManager {
    pub fn new(commands: CommandSender, ac: &AirCon) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let fan = Arc::new(Fan::new());

            let manager = weak.clone();
            fan.active.on_remote_update(move |v| {
                if let Some(m) = manager.upgrade() {
                    m.set_active(v);
                }
            });

            let manager = weak.clone();
            fan.rotation_speed.on_remote_update(move |v| {
                if let Some(m) = manager.upgrade() {
                    m.set_rotation_speed(v);
                }
            });

            let manager = Self {
                aircon_id: ac.id.clone(),
                info: AccessoryInfo {
                    id: aircon_accessory_id(ac, FAN_SPEED_OVERRIDE_ID),
                    name: format!("{} Fan Speed Override", ac.name),
                    manufacturer: MANUFACTURER.to_string(),
                    model: "MyAir".to_string(),
                    serial_number: ac.id.clone(),
                    firmware: ac.firmware(),
                },
                fan,
                state: Mutex::new(State {
                    prev_speed: FanSpeed::Medium,
                    auto_speed: FanSpeed::AutoHardware,
                }),
                commands,
            };
            manager.project(&mut manager.lock(), ac);
            manager
        })
    }

    pub fn exposes(&self) -> Vec<Accessory> {
        vec![Accessory {
            info: self.info.clone(),
            service: Service::Fan(self.fan.clone()),
        }]
    }

    pub fn fan(&self) -> &Arc<Fan> {
        &self.fan
    }

    pub fn update(&self, system: &System) {
        let Some(ac) = system.aircon(&self.aircon_id) else {
            warn!(error = %Error::UnknownAirCon(self.aircon_id.clone()), "skipping snapshot");
            return;
        };
        self.project(&mut self.lock(), ac);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn project(&self, state: &mut State, ac: &AirCon) {
        match speed_to_percent(ac.fan_speed) {
            Some(percent) => {
                state.prev_speed = ac.fan_speed;
                self.fan.active.set_value(Active::Active);
                self.fan.rotation_speed.set_value(percent);
            }
            None => self.fan.active.set_value(Active::Inactive),
        }

        state.auto_speed = if ac.smart_fan_enabled {
            FanSpeed::AutoSoftware
        } else {
            FanSpeed::AutoHardware
        };
    }

    fn set_active(&self, active: Active) {
        let speed = {
            let state = self.lock();
            match active {
                Active::Active => state.prev_speed,
                Active::Inactive => state.auto_speed,
            }
        };
        debug!(aircon = %self.aircon_id, ?active, speed = speed.as_myplace_str(), "fan override toggled");
        self.commands
            .submit(vec![Command::set_fan_speed(&self.aircon_id, speed)]);
    }

    fn set_rotation_speed(&self, percent: f64) {
        let speed = percent_to_speed(percent, self.lock().auto_speed);
        debug!(aircon = %self.aircon_id, percent, speed = speed.as_myplace_str(), "fan speed edited");
        self.commands
            .submit(vec![Command::set_fan_speed(&self.aircon_id, speed)]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::channel;

    #[test]
    fn percent_breakpoints() {
        let auto = FanSpeed::AutoSoftware;
        assert_eq!(percent_to_speed(0.0, auto), FanSpeed::AutoSoftware);
        assert_eq!(percent_to_speed(20.0, auto), FanSpeed::Low);
        assert_eq!(percent_to_speed(33.0, auto), FanSpeed::Low);
        assert_eq!(percent_to_speed(50.0, auto), FanSpeed::Medium);
        assert_eq!(percent_to_speed(67.0, auto), FanSpeed::High);
        assert_eq!(percent_to_speed(90.0, auto), FanSpeed::High);
    }

    #[test]
    fn fixed_speeds_map_to_percent() {
        assert_eq!(speed_to_percent(FanSpeed::Low), Some(25.0));
        assert_eq!(speed_to_percent(FanSpeed::Medium), Some(50.0));
        assert_eq!(speed_to_percent(FanSpeed::High), Some(100.0));
        assert_eq!(speed_to_percent(FanSpeed::AutoHardware), None);
    }

    fn aircon(fan_speed: FanSpeed, smart_fan_enabled: bool) -> AirCon {
        AirCon {
            id: "ac1".to_string(),
            number: 1,
            name: "Home".to_string(),
            fan_speed,
            smart_fan_enabled,
            ..Default::default()
        }
    }

    #[test]
    fn auto_speed_shows_inactive() {
        let (tx, _rx) = channel(4);
        let m = FanManager::new(tx, &aircon(FanSpeed::AutoHardware, false));
        assert_eq!(m.fan().active.value(), Active::Inactive);
    }

    #[test]
    fn reactivating_restores_last_fixed_speed() {
        let (tx, mut rx) = channel(4);
        let m = FanManager::new(tx, &aircon(FanSpeed::High, true));
        assert_eq!(m.fan().active.value(), Active::Active);
        assert_eq!(m.fan().rotation_speed.value(), 100.0);

        let system = System {
            aircons: vec![aircon(FanSpeed::AutoSoftware, true)],
            ..Default::default()
        };
        m.update(&system);
        assert_eq!(m.fan().active.value(), Active::Inactive);

        m.fan().active.remote_update(Active::Active);
        assert_eq!(
            rx.try_recv(),
            Some(vec![Command::set_fan_speed("ac1", FanSpeed::High)])
        );

        m.fan().active.remote_update(Active::Inactive);
        assert_eq!(
            rx.try_recv(),
            Some(vec![Command::set_fan_speed("ac1", FanSpeed::AutoSoftware)])
        );
    }

    #[test]
    fn zero_speed_uses_hardware_auto_without_smart_fan() {
        let (tx, mut rx) = channel(4);
        let m = FanManager::new(tx, &aircon(FanSpeed::Low, false));
        m.fan().rotation_speed.remote_update(0.0);
        assert_eq!(
            rx.try_recv(),
            Some(vec![Command::set_fan_speed("ac1", FanSpeed::AutoHardware)])
        );
    }
}
