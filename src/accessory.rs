//! Accessory-side controls owned by the managers.
//!
//! Each control is a set of characteristics. The accessory server reads them,
//! pushes user edits through [`Characteristic::remote_update`], and observes
//! values the managers publish with [`Characteristic::set_value`]. Only remote
//! updates notify the owning manager, so publishing polled state never loops
//! back into a reconciliation pass.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{AirCon, System, Zone};

pub const MANUFACTURER: &str = "Advantage Air";

pub const FAN_SPEED_OVERRIDE_ID: u32 = 1;
pub const ZONE_THERMOSTAT_ID: u32 = 1;
pub const ZONE_MYZONE_INDICATOR_ID: u32 = 2;

type RemoteUpdateCallback<T> = Arc<dyn Fn(T) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Value bounds advertised to the accessory server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

pub struct Characteristic<T> {
    value: Mutex<T>,
    bounds: Option<Bounds>,
    on_remote_update: Mutex<Option<RemoteUpdateCallback<T>>>,
}

impl<T: Copy + Send + 'static> Characteristic<T> {
    pub fn new(initial: T) -> Self {
        Self {
            value: Mutex::new(initial),
            bounds: None,
            on_remote_update: Mutex::new(None),
        }
    }

    pub fn value(&self) -> T {
        *lock(&self.value)
    }

    /// Publish a value without notifying the remote-update callback.
    pub fn set_value(&self, v: T) {
        *lock(&self.value) = v;
    }

    /// Commit a user edit and notify the owning manager.
    pub fn remote_update(&self, v: T) {
        self.set_value(v);
        let callback = lock(&self.on_remote_update).clone();
        if let Some(cb) = callback {
            cb(v);
        }
    }

    pub fn on_remote_update(&self, f: impl Fn(T) + Send + Sync + 'static) {
        *lock(&self.on_remote_update) = Some(Arc::new(f));
    }
}

impl Characteristic<f64> {
    pub fn with_bounds(initial: f64, min: f64, max: f64, step: f64) -> Self {
        Self {
            bounds: Some(Bounds { min, max, step }),
            ..Self::new(initial)
        }
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CurrentHeatingCoolingState {
    #[default]
    Off,
    Heat,
    Cool,
}

/// A zone's requested mode. `Auto` allows either heating or cooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetHeatingCoolingState {
    #[default]
    Off,
    Heat,
    Cool,
    Auto,
}

impl TargetHeatingCoolingState {
    pub fn as_u8(&self) -> u8 {
        match self {
            TargetHeatingCoolingState::Off => 0,
            TargetHeatingCoolingState::Heat => 1,
            TargetHeatingCoolingState::Cool => 2,
            TargetHeatingCoolingState::Auto => 3,
        }
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(TargetHeatingCoolingState::Off),
            1 => Some(TargetHeatingCoolingState::Heat),
            2 => Some(TargetHeatingCoolingState::Cool),
            3 => Some(TargetHeatingCoolingState::Auto),
            _ => None,
        }
    }

    /// `(cool, heat)`: whether this request lets the zone be cooled and/or heated.
    pub fn allowed_modes(&self) -> (bool, bool) {
        match self {
            TargetHeatingCoolingState::Cool => (true, false),
            TargetHeatingCoolingState::Heat => (false, true),
            TargetHeatingCoolingState::Auto => (true, true),
            TargetHeatingCoolingState::Off => (false, false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusLowBattery {
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContactSensorState {
    Detected,
    #[default]
    NotDetected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Active {
    #[default]
    Inactive,
    Active,
}

pub struct Thermostat {
    pub current_state: Characteristic<CurrentHeatingCoolingState>,
    pub target_state: Characteristic<TargetHeatingCoolingState>,
    pub current_temperature: Characteristic<f64>,
    pub target_temperature: Characteristic<f64>,
    /// Reused to surface zone sensor errors.
    pub low_battery: Characteristic<StatusLowBattery>,
}

impl Thermostat {
    pub fn new() -> Self {
        Self {
            current_state: Characteristic::new(CurrentHeatingCoolingState::Off),
            target_state: Characteristic::new(TargetHeatingCoolingState::Off),
            current_temperature: Characteristic::with_bounds(0.0, 0.0, 100.0, 0.1),
            target_temperature: Characteristic::with_bounds(16.0, 16.0, 32.0, 1.0),
            low_battery: Characteristic::new(StatusLowBattery::Normal),
        }
    }
}

impl Default for Thermostat {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
pub struct ContactSensor {
    pub state: Characteristic<ContactSensorState>,
}

impl<T: Copy + Send + Default + 'static> Default for Characteristic<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

pub struct Fan {
    pub active: Characteristic<Active>,
    pub rotation_speed: Characteristic<f64>,
}

impl Fan {
    pub fn new() -> Self {
        Self {
            active: Characteristic::new(Active::Inactive),
            rotation_speed: Characteristic::with_bounds(0.0, 0.0, 100.0, 1.0),
        }
    }
}

impl Default for Fan {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessoryInfo {
    pub id: u64,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub serial_number: String,
    pub firmware: String,
}

#[derive(Clone)]
pub enum Service {
    Bridge,
    Thermostat(Arc<Thermostat>),
    ContactSensor(Arc<ContactSensor>),
    Fan(Arc<Fan>),
}

#[derive(Clone)]
pub struct Accessory {
    pub info: AccessoryInfo,
    pub service: Service,
}

pub fn aircon_accessory_id(ac: &AirCon, id: u32) -> u64 {
    (ac.number as u64) << 56 | id as u64
}

pub fn zone_accessory_id(ac: &AirCon, zone: &Zone, id: u32) -> u64 {
    (ac.number as u64) << 56 | (zone.number as u64) << 48 | id as u64
}

/// The bridge accessory describing the touch panel itself.
pub fn bridge(system: &System, version: &str) -> Accessory {
    Accessory {
        info: AccessoryInfo {
            id: 1,
            name: "MyPlace".to_string(),
            manufacturer: MANUFACTURER.to_string(),
            model: system.details.touch_screen_model.clone(),
            serial_number: "Unknown".to_string(),
            firmware: format!("MyPlace v{} / bridge v{version}", system.details.app_version),
        },
        service: Service::Bridge,
    }
}
