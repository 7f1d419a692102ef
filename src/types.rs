use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Power {
    On,
    #[default]
    Off,
}

impl Power {
    pub fn as_myplace_str(&self) -> &'static str {
        match self {
            Power::On => "on",
            Power::Off => "off",
        }
    }

    pub fn from_myplace_str(s: &str) -> Option<Self> {
        match s {
            "on" => Some(Power::On),
            "off" => Some(Power::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    Heat,
    #[default]
    Cool,
    Vent,
    Dry,
    /// The unit's own heat/cool arbitration ("MyAuto").
    Auto,
}

impl Mode {
    pub fn as_myplace_str(&self) -> &'static str {
        match self {
            Mode::Heat => "heat",
            Mode::Cool => "cool",
            Mode::Vent => "vent",
            Mode::Dry => "dry",
            Mode::Auto => "myauto",
        }
    }

    pub fn from_myplace_str(s: &str) -> Option<Self> {
        match s {
            "heat" => Some(Mode::Heat),
            "cool" => Some(Mode::Cool),
            "vent" => Some(Mode::Vent),
            "dry" => Some(Mode::Dry),
            "myauto" => Some(Mode::Auto),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FanSpeed {
    Low,
    #[default]
    Medium,
    High,
    /// Auto speed chosen by the unit itself.
    AutoHardware,
    /// Auto speed chosen by the touch panel ("MyFan").
    AutoSoftware,
}

impl FanSpeed {
    pub fn as_myplace_str(&self) -> &'static str {
        match self {
            FanSpeed::Low => "low",
            FanSpeed::Medium => "medium",
            FanSpeed::High => "high",
            FanSpeed::AutoHardware => "auto",
            FanSpeed::AutoSoftware => "autoAA",
        }
    }

    pub fn from_myplace_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(FanSpeed::Low),
            "medium" => Some(FanSpeed::Medium),
            "high" => Some(FanSpeed::High),
            "auto" => Some(FanSpeed::AutoHardware),
            "autoAA" => Some(FanSpeed::AutoSoftware),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneState {
    Open,
    #[default]
    Closed,
}

impl ZoneState {
    pub fn as_myplace_str(&self) -> &'static str {
        match self {
            ZoneState::Open => "open",
            // no trailing 'd' on the wire
            ZoneState::Closed => "close",
        }
    }

    pub fn from_myplace_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(ZoneState::Open),
            "close" => Some(ZoneState::Closed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZoneError {
    #[default]
    None,
    /// The zone's wireless temperature sensor is unreachable.
    NoSignal,
    Other(u32),
}

impl ZoneError {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => ZoneError::None,
            1 => ZoneError::NoSignal,
            c => ZoneError::Other(c),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            ZoneError::None => 0,
            ZoneError::NoSignal => 1,
            ZoneError::Other(c) => *c,
        }
    }
}

impl fmt::Display for ZoneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneError::None => write!(f, "none"),
            ZoneError::NoSignal => write!(f, "no signal"),
            ZoneError::Other(c) => write!(f, "code {c}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Zone {
    pub id: String,
    /// 1-based zone number; the device addresses zones by this, not by position.
    pub number: u8,
    pub name: String,
    pub state: ZoneState,
    /// Damper opening, 5-1000 while open.
    pub damper_percentage: u16,
    pub has_temp_sensor: bool,
    pub current_temperature: f64,
    pub target_temperature: f64,
    pub error: ZoneError,
}

impl Zone {
    pub fn is_open(&self) -> bool {
        self.state == ZoneState::Open
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AirCon {
    pub id: String,
    /// 1-based position of this unit within the system, ordered by ID.
    pub number: u8,
    pub name: String,
    pub power: Power,
    pub mode: Mode,
    pub fan_speed: FanSpeed,
    pub my_zone: u8,
    /// Up to three zones the firmware never fully closes. Zero entries are unset.
    pub constant_zones: [u8; 3],
    pub firmware_major: u32,
    pub firmware_minor: u32,
    pub filter_clean_status: u32,
    pub smart_fan_enabled: bool,
    pub my_temp_enabled: bool,
    pub my_auto_enabled: bool,
    pub my_auto_mode: Option<Mode>,
    pub sleep_saver_enabled: bool,
    /// Ordered by zone number.
    pub zones: Vec<Zone>,
}

impl AirCon {
    pub fn zone(&self, number: u8) -> Option<&Zone> {
        self.zones.iter().find(|z| z.number == number)
    }

    pub fn zone_by_id(&self, id: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.id == id)
    }

    pub fn is_constant_zone(&self, number: u8) -> bool {
        number != 0 && self.constant_zones.contains(&number)
    }

    pub fn firmware(&self) -> String {
        format!("{}.{}", self.firmware_major, self.firmware_minor)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemDetails {
    pub app_version: String,
    pub touch_screen_model: String,
    pub needs_update: bool,
    pub has_aircons: bool,
    pub has_lights: bool,
}

/// One complete read of the device. Superseded wholesale by the next poll.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct System {
    pub details: SystemDetails,
    /// Ordered by ID.
    pub aircons: Vec<AirCon>,
}

impl System {
    pub fn aircon(&self, id: &str) -> Option<&AirCon> {
        self.aircons.iter().find(|ac| ac.id == id)
    }

    /// The touch panel answers with an empty payload for a few seconds after
    /// every accepted write.
    pub fn is_mid_update(&self) -> bool {
        self.details.app_version.is_empty()
    }
}

/// Changes between two successive snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    AirConAdded { aircon: String },
    AirConRemoved { aircon: String },
    PowerChanged { aircon: String, power: Power },
    ModeChanged { aircon: String, mode: Mode },
    FanSpeedChanged { aircon: String, speed: FanSpeed },
    MyZoneChanged { aircon: String, zone: u8 },
    ZoneStateChanged { aircon: String, zone: u8, name: String, state: ZoneState },
    ZoneTemperatureChanged { aircon: String, zone: u8, name: String, temp: f64 },
    ZoneSetpointChanged { aircon: String, zone: u8, name: String, temp: f64 },
    ZoneErrorChanged { aircon: String, zone: u8, name: String, error: ZoneError },
}
