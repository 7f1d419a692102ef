use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::{debug, info, warn};

use crate::accessory::{
    Accessory, AccessoryInfo, ContactSensor, ContactSensorState, CurrentHeatingCoolingState,
    MANUFACTURER, Service, StatusLowBattery, Thermostat, ZONE_MYZONE_INDICATOR_ID,
    ZONE_THERMOSTAT_ID, zone_accessory_id,
};
use crate::command::{Command, CommandSender};
use crate::store::ModeStore;
use crate::types::*;
use crate::{Error, Result};

/// Hysteresis parameters for unit-wide mode arbitration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tuning {
    /// Cool while `current - target` is above this.
    pub cool_threshold: f64,
    /// Heat only once `current - target` drops below this.
    pub heat_threshold: f64,
    /// Consecutive passes a constant zone may be sent a close command.
    pub constant_zone_attempts: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            cool_threshold: -0.1,
            heat_threshold: -0.5,
            constant_zone_attempts: 3,
        }
    }
}

struct ZoneControls {
    number: u8,
    id: String,
    thermostat: Arc<Thermostat>,
    my_zone_indicator: Arc<ContactSensor>,
    thermostat_info: AccessoryInfo,
    indicator_info: AccessoryInfo,
}

impl ZoneControls {
    fn new(ac: &AirCon, zone: &Zone) -> Self {
        let thermostat_info = AccessoryInfo {
            id: zone_accessory_id(ac, zone, ZONE_THERMOSTAT_ID),
            name: format!("{} {}", zone.name, ac.name),
            manufacturer: MANUFACTURER.to_string(),
            model: "MyAir Zone".to_string(),
            serial_number: format!("{}.{}", ac.id, zone.id),
            firmware: ac.firmware(),
        };
        let indicator_info = AccessoryInfo {
            id: zone_accessory_id(ac, zone, ZONE_MYZONE_INDICATOR_ID),
            name: format!("{} MyZone", zone.name),
            ..thermostat_info.clone()
        };

        Self {
            number: zone.number,
            id: zone.id.clone(),
            thermostat: Arc::new(Thermostat::new()),
            my_zone_indicator: Arc::new(ContactSensor::default()),
            thermostat_info,
            indicator_info,
        }
    }

    fn delta(&self) -> f64 {
        self.thermostat.current_temperature.value() - self.thermostat.target_temperature.value()
    }

    fn allowed_modes(&self) -> (bool, bool) {
        self.thermostat.target_state.value().allowed_modes()
    }
}

struct State {
    ac: AirCon,
    constant_zone_attempts: u32,
}

/// Owns one thermostat per zone of an air-conditioner and reconciles the
/// unit's power, mode, zone dampers, setpoints and MyZone with them.
pub struct AirConManager {
    aircon_id: String,
    zones: Vec<ZoneControls>,
    state: Mutex<State>,
    commands: CommandSender,
    tuning: Tuning,
}

impl AirConManager {
    pub fn new(
        commands: CommandSender,
        ac: &AirCon,
        tuning: Tuning,
        store: Option<Arc<ModeStore>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let zones: Vec<ZoneControls> = ac
                .zones
                .iter()
                .map(|z| {
                    let controls = ZoneControls::new(ac, z);
                    let key = ModeStore::key(&ac.id, &z.id);

                    if let Some(saved) = store.as_ref().and_then(|s| s.get(&key)) {
                        controls.thermostat.target_state.set_value(saved);
                    }

                    let manager = weak.clone();
                    let (aircon, zone) = (ac.id.clone(), z.number);
                    controls.thermostat.target_temperature.on_remote_update(move |v| {
                        debug!(%aircon, zone, target = v, "target temperature edited");
                        if let Some(m) = manager.upgrade() {
                            m.on_remote_edit();
                        }
                    });

                    let manager = weak.clone();
                    let store = store.clone();
                    let (aircon, zone) = (ac.id.clone(), z.number);
                    controls.thermostat.target_state.on_remote_update(move |v| {
                        debug!(%aircon, zone, state = ?v, "target mode edited");
                        if let Some(store) = &store {
                            store.set(&key, v);
                        }
                        if let Some(m) = manager.upgrade() {
                            m.on_remote_edit();
                        }
                    });

                    controls
                })
                .collect();

            let manager = Self {
                aircon_id: ac.id.clone(),
                zones,
                state: Mutex::new(State {
                    ac: ac.clone(),
                    constant_zone_attempts: 0,
                }),
                commands,
                tuning,
            };
            manager.project(ac);
            manager
        })
    }

    pub fn exposes(&self) -> Vec<Accessory> {
        self.zones
            .iter()
            .flat_map(|c| {
                [
                    Accessory {
                        info: c.thermostat_info.clone(),
                        service: Service::Thermostat(c.thermostat.clone()),
                    },
                    Accessory {
                        info: c.indicator_info.clone(),
                        service: Service::ContactSensor(c.my_zone_indicator.clone()),
                    },
                ]
            })
            .collect()
    }

    /// The thermostat control for zone `number`.
    pub fn thermostat(&self, number: u8) -> Option<&Arc<Thermostat>> {
        self.zones.iter().find(|c| c.number == number).map(|c| &c.thermostat)
    }

    pub fn my_zone_indicator(&self, number: u8) -> Option<&Arc<ContactSensor>> {
        self.zones
            .iter()
            .find(|c| c.number == number)
            .map(|c| &c.my_zone_indicator)
    }

    pub fn constant_zone_attempts(&self) -> u32 {
        self.lock().constant_zone_attempts
    }

    /// Publish the snapshot's state to the controls.
    pub fn update(&self, system: &System) {
        let mut state = self.lock();
        self.update_locked(&mut state, system);
    }

    /// Derive the commands that move the unit toward what the controls ask for.
    pub fn apply(&self) -> Vec<Command> {
        let mut state = self.lock();
        self.apply_locked(&mut state)
    }

    /// `update` then `apply` as one step, submitting the result.
    pub fn reconcile(&self, system: &System) {
        let batch = {
            let mut state = self.lock();
            if !self.update_locked(&mut state, system) {
                return;
            }
            self.apply_locked(&mut state)
        };
        self.commands.submit(batch);
    }

    fn on_remote_edit(&self) {
        let batch = self.apply();
        self.commands.submit(batch);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_locked(&self, state: &mut State, system: &System) -> bool {
        let ac = match system.aircon(&self.aircon_id) {
            Some(ac) => ac,
            None => {
                let e = Error::UnknownAirCon(self.aircon_id.clone());
                warn!(error = %e, "skipping snapshot");
                return false;
            }
        };
        self.project(ac);
        state.ac = ac.clone();
        true
    }

    fn project(&self, ac: &AirCon) {
        for controls in &self.zones {
            let Some(z) = ac.zone(controls.number) else {
                continue;
            };
            let t = &controls.thermostat;

            t.current_temperature.set_value(z.current_temperature);
            t.target_temperature.set_value(z.target_temperature);
            t.current_state.set_value(observed_state(ac, z));
            t.low_battery.set_value(match z.error {
                ZoneError::None => StatusLowBattery::Normal,
                _ => StatusLowBattery::Low,
            });

            controls.my_zone_indicator.state.set_value(if z.number == ac.my_zone {
                ContactSensorState::Detected
            } else {
                ContactSensorState::NotDetected
            });
        }
    }

    fn apply_locked(&self, state: &mut State) -> Vec<Command> {
        match self.plan(state) {
            Ok(commands) => {
                if !commands.is_empty() {
                    debug!(aircon = %self.aircon_id, count = commands.len(), "reconciled");
                }
                commands
            }
            Err(e) => {
                warn!(aircon = %self.aircon_id, error = %e, "skipping reconciliation");
                Vec::new()
            }
        }
    }

    fn plan(&self, state: &mut State) -> Result<Vec<Command>> {
        let State { ac, constant_zone_attempts } = state;
        let ac: &AirCon = ac;
        let zones = self.pair_zones(ac)?;
        let mut commands = Vec::new();

        for (controls, z) in &zones {
            let target = controls.thermostat.target_temperature.value();
            if target != z.target_temperature {
                commands.push(Command::set_zone_target_temperature(ac, z, target));
            }
        }

        let (power, mode) = self.target_mode(ac, &zones);

        if power != ac.power {
            commands.push(Command::set_power(ac, power));
        }

        // Nothing else is meaningful (or accepted) while the unit is off.
        if power == Power::Off {
            return Ok(commands);
        }

        if mode != ac.mode {
            commands.push(Command::set_mode(ac, mode));
        }

        let is_cooling = mode == Mode::Cool;
        let (open, closed): (Vec<&(&ZoneControls, &Zone)>, Vec<_>) =
            zones.iter().partition(|(controls, _)| {
                let (cool, heat) = controls.allowed_modes();
                (is_cooling && cool) || (!is_cooling && heat)
            });

        let mut modified_non_constant = false;
        for (_, z) in &open {
            if z.state != ZoneState::Open {
                modified_non_constant = true;
                commands.push(Command::set_zone_state(ac, z, ZoneState::Open));
            }
        }

        if let Some(z) = select_my_zone(is_cooling, &open)
            && z.number != ac.my_zone
        {
            commands.push(Command::set_my_zone(ac, z));
        }

        let limit = self.tuning.constant_zone_attempts;
        let mut closed_constant = false;
        for (_, z) in &closed {
            if z.state == ZoneState::Closed {
                continue;
            }
            if ac.is_constant_zone(z.number) {
                closed_constant = true;
                if *constant_zone_attempts >= limit {
                    continue;
                }
            } else {
                modified_non_constant = true;
            }
            commands.push(Command::set_zone_state(ac, z, ZoneState::Closed));
        }

        if modified_non_constant {
            if *constant_zone_attempts > limit {
                info!(aircon = %ac.id, "enabling closing of constant zones");
            }
            *constant_zone_attempts = 0;
        } else if closed_constant {
            *constant_zone_attempts += 1;
            if *constant_zone_attempts == limit + 1 {
                info!(aircon = %ac.id, "disabling closing of constant zones");
            }
        }

        Ok(commands)
    }

    /// Pair each control with its zone in the snapshot, by zone number.
    fn pair_zones<'a>(&'a self, ac: &'a AirCon) -> Result<Vec<(&'a ZoneControls, &'a Zone)>> {
        if self.zones.is_empty() {
            return Err(Error::InvalidSnapshot(format!("{}: no zones", ac.id)));
        }
        if ac.zones.len() != self.zones.len() {
            return Err(Error::InvalidSnapshot(format!(
                "{}: expected {} zones, snapshot has {}",
                ac.id,
                self.zones.len(),
                ac.zones.len()
            )));
        }
        self.zones
            .iter()
            .map(|c| {
                ac.zone(c.number)
                    .filter(|z| z.id == c.id)
                    .map(|z| (c, z))
                    .ok_or(Error::InvalidZone(c.number))
            })
            .collect()
    }

    /// Desired power and mode. Cooling always wins: any zone that may cool
    /// and is warm enough switches the whole unit to cool.
    fn target_mode(&self, ac: &AirCon, zones: &[(&ZoneControls, &Zone)]) -> (Power, Mode) {
        let mut needs_heating = false;

        for (controls, _) in zones {
            let (cool, heat) = controls.allowed_modes();
            let delta = controls.delta();

            if cool && delta > self.tuning.cool_threshold {
                return (Power::On, Mode::Cool);
            }
            if heat && delta < self.tuning.heat_threshold {
                needs_heating = true;
            }
        }

        if needs_heating {
            (Power::On, Mode::Heat)
        } else {
            (Power::Off, ac.mode)
        }
    }
}

/// The open zone furthest from its setpoint in the direction of the active
/// mode. Zones that cannot report a temperature are never chosen.
fn select_my_zone<'a>(is_cooling: bool, open: &[&(&ZoneControls, &'a Zone)]) -> Option<&'a Zone> {
    let mut best: Option<(&Zone, f64)> = None;

    for &&(controls, z) in open {
        if !z.has_temp_sensor || z.error != ZoneError::None {
            continue;
        }

        let delta = if is_cooling { controls.delta() } else { -controls.delta() };
        if best.is_none_or(|(_, max)| delta > max) {
            best = Some((z, delta));
        }
    }

    best.map(|(z, _)| z)
}

fn observed_state(ac: &AirCon, z: &Zone) -> CurrentHeatingCoolingState {
    if !z.is_open() || ac.power == Power::Off {
        return CurrentHeatingCoolingState::Off;
    }
    match ac.mode {
        Mode::Cool => CurrentHeatingCoolingState::Cool,
        Mode::Heat => CurrentHeatingCoolingState::Heat,
        // vent, dry and the unit's own auto mode have no thermostat equivalent
        Mode::Vent | Mode::Dry | Mode::Auto => CurrentHeatingCoolingState::Off,
    }
}
