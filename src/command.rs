use std::fmt;

use tokio::sync::mpsc;
use tracing::warn;

use crate::protocol::WriteRequest;
use crate::types::*;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One intended mutation of device state. Commands are merged into a single
/// [`WriteRequest`] and consumed by one write.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetPower { aircon: String, power: Power },
    SetMode { aircon: String, mode: Mode },
    SetFanSpeed { aircon: String, speed: FanSpeed },
    SetMyZone { aircon: String, zone: u8 },
    SetZoneState { aircon: String, zone: String, state: ZoneState },
    SetZoneTargetTemperature { aircon: String, zone: String, temp: f64 },
}

impl Command {
    pub fn set_power(ac: &AirCon, power: Power) -> Self {
        Command::SetPower { aircon: ac.id.clone(), power }
    }

    pub fn set_mode(ac: &AirCon, mode: Mode) -> Self {
        Command::SetMode { aircon: ac.id.clone(), mode }
    }

    pub fn set_fan_speed(aircon: impl Into<String>, speed: FanSpeed) -> Self {
        Command::SetFanSpeed { aircon: aircon.into(), speed }
    }

    pub fn set_my_zone(ac: &AirCon, zone: &Zone) -> Self {
        Command::SetMyZone { aircon: ac.id.clone(), zone: zone.number }
    }

    pub fn set_zone_state(ac: &AirCon, zone: &Zone, state: ZoneState) -> Self {
        Command::SetZoneState {
            aircon: ac.id.clone(),
            zone: zone.id.clone(),
            state,
        }
    }

    pub fn set_zone_target_temperature(ac: &AirCon, zone: &Zone, temp: f64) -> Self {
        Command::SetZoneTargetTemperature {
            aircon: ac.id.clone(),
            zone: zone.id.clone(),
            temp,
        }
    }

    /// Fold this command into a pending write.
    pub fn apply(&self, req: &mut WriteRequest) {
        match self {
            Command::SetPower { aircon, power } => {
                req.aircon(aircon).info.state = Some(power.as_myplace_str());
            }
            Command::SetMode { aircon, mode } => {
                req.aircon(aircon).info.mode = Some(mode.as_myplace_str());
            }
            Command::SetFanSpeed { aircon, speed } => {
                req.aircon(aircon).info.fan = Some(speed.as_myplace_str());
            }
            Command::SetMyZone { aircon, zone } => {
                req.aircon(aircon).info.my_zone = Some(*zone);
            }
            Command::SetZoneState { aircon, zone, state } => {
                req.zone(aircon, zone).state = Some(state.as_myplace_str());
            }
            Command::SetZoneTargetTemperature { aircon, zone, temp } => {
                req.zone(aircon, zone).set_temp = Some(*temp);
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetPower { aircon, power } => {
                write!(f, "{aircon} power={}", power.as_myplace_str())
            }
            Command::SetMode { aircon, mode } => {
                write!(f, "{aircon} mode={}", mode.as_myplace_str())
            }
            Command::SetFanSpeed { aircon, speed } => {
                write!(f, "{aircon} fan={}", speed.as_myplace_str())
            }
            Command::SetMyZone { aircon, zone } => write!(f, "{aircon} myZone={zone}"),
            Command::SetZoneState { aircon, zone, state } => {
                write!(f, "{aircon}/{zone} state={}", state.as_myplace_str())
            }
            Command::SetZoneTargetTemperature { aircon, zone, temp } => {
                write!(f, "{aircon}/{zone} setTemp={temp:.1}")
            }
        }
    }
}

impl WriteRequest {
    /// Merge commands in order; later commands win on the same field.
    pub fn from_commands<'a>(commands: impl IntoIterator<Item = &'a Command>) -> Self {
        let mut req = WriteRequest::default();
        for cmd in commands {
            cmd.apply(&mut req);
        }
        req
    }
}

pub fn channel(capacity: usize) -> (CommandSender, CommandReceiver) {
    let (tx, rx) = mpsc::channel(capacity);
    (CommandSender { tx }, CommandReceiver { rx })
}

/// Producer side of the command queue, held by every reconciler.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<Vec<Command>>,
}

impl CommandSender {
    /// Hand a batch to the control loop without waiting. A full or closed
    /// queue drops the batch; the next poll re-derives it.
    pub fn submit(&self, batch: Vec<Command>) {
        if batch.is_empty() {
            return;
        }
        match self.tx.try_send(batch) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(batch)) => {
                warn!(commands = batch.len(), "command queue full, dropping batch");
            }
            Err(mpsc::error::TrySendError::Closed(batch)) => {
                warn!(commands = batch.len(), "command queue closed, dropping batch");
            }
        }
    }
}

#[derive(Debug)]
pub struct CommandReceiver {
    rx: mpsc::Receiver<Vec<Command>>,
}

impl CommandReceiver {
    pub async fn recv(&mut self) -> Option<Vec<Command>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<Command>> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn zone(id: &str, number: u8) -> Zone {
        Zone {
            id: id.to_string(),
            number,
            ..Default::default()
        }
    }

    fn aircon() -> AirCon {
        AirCon {
            id: "ac1".to_string(),
            zones: vec![zone("z01", 1), zone("z02", 2)],
            ..Default::default()
        }
    }

    #[test]
    fn commands_merge_per_target() {
        let ac = aircon();
        let cmds = vec![
            Command::set_power(&ac, Power::On),
            Command::set_mode(&ac, Mode::Cool),
            Command::set_zone_state(&ac, &ac.zones[0], ZoneState::Open),
            Command::set_zone_target_temperature(&ac, &ac.zones[0], 21.0),
            Command::set_my_zone(&ac, &ac.zones[0]),
        ];
        let req = WriteRequest::from_commands(&cmds);
        let json: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({
                "ac1": {
                    "info": {"state": "on", "mode": "cool", "myZone": 1},
                    "zones": {"z01": {"state": "open", "setTemp": 21.0}}
                }
            })
        );
    }

    #[test]
    fn later_command_wins() {
        let ac = aircon();
        let cmds = vec![
            Command::set_zone_target_temperature(&ac, &ac.zones[1], 20.0),
            Command::set_zone_target_temperature(&ac, &ac.zones[1], 23.0),
        ];
        let req = WriteRequest::from_commands(&cmds);
        assert_eq!(req.aircons["ac1"].zones["z02"].set_temp, Some(23.0));
    }

    #[test]
    fn display_is_compact() {
        let ac = aircon();
        assert_eq!(Command::set_power(&ac, Power::Off).to_string(), "ac1 power=off");
        assert_eq!(
            Command::set_zone_state(&ac, &ac.zones[1], ZoneState::Closed).to_string(),
            "ac1/z02 state=close"
        );
        assert_eq!(
            Command::set_fan_speed("ac1", FanSpeed::AutoSoftware).to_string(),
            "ac1 fan=autoAA"
        );
    }

    #[test]
    fn submit_drops_when_full() {
        let (tx, mut rx) = channel(1);
        let ac = aircon();
        tx.submit(vec![Command::set_power(&ac, Power::On)]);
        tx.submit(vec![Command::set_power(&ac, Power::Off)]);
        tx.submit(Vec::new());
        let first = rx.try_recv().unwrap();
        assert_eq!(first, vec![Command::set_power(&ac, Power::On)]);
        assert!(rx.try_recv().is_none());
    }
}
