use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::*;
use crate::{Error, Result};

pub const DEFAULT_PORT: u16 = 2025;

pub const READ_PATH: &str = "/getSystemData";
pub const WRITE_PATH: &str = "/setAircon";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireSystem {
    system: WireSystemDetails,
    aircons: BTreeMap<String, WireAirCon>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireSystemDetails {
    my_app_rev: String,
    tsp_model: String,
    needs_update: bool,
    has_aircons: bool,
    has_lights: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WireAirCon {
    info: WireAirConInfo,
    zones: BTreeMap<String, WireZone>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireAirConInfo {
    name: String,
    state: String,
    mode: String,
    fan: String,
    my_zone: u8,
    constant1: u8,
    constant2: u8,
    constant3: u8,
    #[serde(rename = "cbFWRevMajor")]
    cb_fw_rev_major: u32,
    #[serde(rename = "cbFWRevMinor")]
    cb_fw_rev_minor: u32,
    filter_clean_status: u32,
    aa_auto_fan_mode_enabled: bool,
    climate_control_mode_enabled: bool,
    my_auto_mode_enabled: bool,
    my_auto_mode_current_set_mode: String,
    quiet_night_mode_enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WireZone {
    number: u8,
    name: String,
    state: String,
    value: u16,
    #[serde(rename = "type")]
    sensor_type: u32,
    measured_temp: f64,
    set_temp: f64,
    error: u32,
}

/// Decode a `getSystemData` body.
///
/// A mid-update payload (empty `myAppRev`) decodes to a `System` with no
/// aircons; callers check `System::is_mid_update` and retry.
pub fn parse_system(body: &str) -> Result<System> {
    let wire: WireSystem = serde_json::from_str(body)?;

    let details = SystemDetails {
        app_version: wire.system.my_app_rev,
        touch_screen_model: wire.system.tsp_model,
        needs_update: wire.system.needs_update,
        has_aircons: wire.system.has_aircons,
        has_lights: wire.system.has_lights,
    };

    if details.app_version.is_empty() {
        return Ok(System {
            details,
            aircons: Vec::new(),
        });
    }

    // BTreeMap iteration gives aircons in ID order. A unit that fails to
    // decode is left out so the others stay visible.
    let mut aircons = Vec::with_capacity(wire.aircons.len());
    for (idx, (id, ac)) in wire.aircons.into_iter().enumerate() {
        let number = u8::try_from(idx + 1).map_err(|_| {
            Error::InvalidSnapshot(format!("{id}: more than 255 air-conditioners"))
        })?;
        match convert_aircon(id, number, ac) {
            Ok(ac) => aircons.push(ac),
            Err(e) => warn!(error = %e, "skipping air-conditioner"),
        }
    }

    Ok(System { details, aircons })
}

fn convert_aircon(id: String, number: u8, wire: WireAirCon) -> Result<AirCon> {
    let info = wire.info;

    let power = parse_enum(&id, "state", &info.state, Power::from_myplace_str)?;
    let mode = parse_enum(&id, "mode", &info.mode, Mode::from_myplace_str)?;
    let fan_speed = parse_enum(&id, "fan", &info.fan, FanSpeed::from_myplace_str)?;
    let my_auto_mode = Mode::from_myplace_str(&info.my_auto_mode_current_set_mode);

    let mut zones = Vec::with_capacity(wire.zones.len());
    for (zone_id, z) in wire.zones {
        let state = parse_enum(&id, "zone state", &z.state, ZoneState::from_myplace_str)?;
        if z.number == 0 {
            return Err(Error::InvalidSnapshot(format!(
                "{id}/{zone_id}: zone number must be 1-based"
            )));
        }
        zones.push(Zone {
            id: zone_id,
            number: z.number,
            name: z.name,
            state,
            damper_percentage: z.value,
            has_temp_sensor: z.sensor_type != 0,
            current_temperature: z.measured_temp,
            target_temperature: z.set_temp,
            error: ZoneError::from_code(z.error),
        });
    }
    zones.sort_by_key(|z| z.number);

    if let Some(dup) = zones.windows(2).find(|w| w[0].number == w[1].number) {
        return Err(Error::InvalidSnapshot(format!(
            "{id}: duplicate zone number {}",
            dup[0].number
        )));
    }

    Ok(AirCon {
        id,
        number,
        name: info.name,
        power,
        mode,
        fan_speed,
        my_zone: info.my_zone,
        constant_zones: [info.constant1, info.constant2, info.constant3],
        firmware_major: info.cb_fw_rev_major,
        firmware_minor: info.cb_fw_rev_minor,
        filter_clean_status: info.filter_clean_status,
        smart_fan_enabled: info.aa_auto_fan_mode_enabled,
        my_temp_enabled: info.climate_control_mode_enabled,
        my_auto_enabled: info.my_auto_mode_enabled,
        my_auto_mode,
        sleep_saver_enabled: info.quiet_night_mode_enabled,
        zones,
    })
}

/// Absent fields take the type's default; anything else must be a known value.
fn parse_enum<T: Default>(
    aircon: &str,
    field: &str,
    value: &str,
    parse: fn(&str) -> Option<T>,
) -> Result<T> {
    if value.is_empty() {
        return Ok(T::default());
    }
    parse(value).ok_or_else(|| {
        Error::InvalidSnapshot(format!("{aircon}: unknown {field} {value:?}"))
    })
}

/// Pending write, keyed by aircon ID. Commands mutate this before it is sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct WriteRequest {
    pub aircons: BTreeMap<String, AirConPatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AirConPatch {
    #[serde(skip_serializing_if = "InfoPatch::is_empty")]
    pub info: InfoPatch,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub zones: BTreeMap<String, ZonePatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub my_zone: Option<u8>,
}

impl InfoPatch {
    pub fn is_empty(&self) -> bool {
        self.state.is_none() && self.mode.is_none() && self.fan.is_none() && self.my_zone.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZonePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub set_temp: Option<f64>,
}

impl WriteRequest {
    pub fn aircon(&mut self, id: &str) -> &mut AirConPatch {
        self.aircons.entry(id.to_string()).or_default()
    }

    pub fn zone(&mut self, aircon: &str, zone: &str) -> &mut ZonePatch {
        self.aircon(aircon).zones.entry(zone.to_string()).or_default()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(alias = "Ack")]
    ack: bool,
    #[serde(default, alias = "Reason")]
    reason: String,
}

/// Decode a `setAircon` acknowledgement.
pub fn parse_write_response(body: &str) -> Result<()> {
    let res: WriteResponse = serde_json::from_str(body)?;
    if res.ack {
        Ok(())
    } else {
        Err(Error::Rejected(res.reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SYSTEM_BODY: &str = r#"{
        "system": {"myAppRev": "15.1120", "tspModel": "tsp7", "hasAircons": true},
        "aircons": {
            "ac2": {"info": {"name": "Upstairs", "state": "off", "mode": "heat", "fan": "auto"}, "zones": {}},
            "ac1": {
                "info": {
                    "name": "Downstairs", "state": "on", "mode": "cool", "fan": "autoAA",
                    "myZone": 2, "constant1": 1, "cbFWRevMajor": 11, "cbFWRevMinor": 3,
                    "aaAutoFanModeEnabled": true
                },
                "zones": {
                    "z02": {"number": 2, "name": "Bed", "state": "close", "value": 100, "type": 1,
                            "measuredTemp": 23.4, "setTemp": 22, "error": 0},
                    "z01": {"number": 1, "name": "Living", "state": "open", "value": 80, "type": 1,
                            "measuredTemp": 25.1, "setTemp": 24, "error": 1}
                }
            }
        }
    }"#;

    #[test]
    fn parses_aircons_in_id_order() {
        let sys = parse_system(SYSTEM_BODY).unwrap();
        assert_eq!(sys.details.app_version, "15.1120");
        assert_eq!(sys.aircons.len(), 2);
        assert_eq!(sys.aircons[0].id, "ac1");
        assert_eq!(sys.aircons[0].number, 1);
        assert_eq!(sys.aircons[1].id, "ac2");
        assert_eq!(sys.aircons[1].number, 2);
    }

    #[test]
    fn parses_aircon_info() {
        let sys = parse_system(SYSTEM_BODY).unwrap();
        let ac = sys.aircon("ac1").unwrap();
        assert_eq!(ac.name, "Downstairs");
        assert_eq!(ac.power, Power::On);
        assert_eq!(ac.mode, Mode::Cool);
        assert_eq!(ac.fan_speed, FanSpeed::AutoSoftware);
        assert_eq!(ac.my_zone, 2);
        assert!(ac.is_constant_zone(1));
        assert!(!ac.is_constant_zone(2));
        assert!(!ac.is_constant_zone(0));
        assert_eq!(ac.firmware(), "11.3");
        assert!(ac.smart_fan_enabled);
    }

    #[test]
    fn zones_sorted_by_number() {
        let sys = parse_system(SYSTEM_BODY).unwrap();
        let ac = sys.aircon("ac1").unwrap();
        assert_eq!(ac.zones[0].number, 1);
        assert_eq!(ac.zones[0].id, "z01");
        assert_eq!(ac.zones[1].number, 2);
        let bed = ac.zone_by_id("z02").unwrap();
        assert_eq!(bed.state, ZoneState::Closed);
        assert_eq!(bed.target_temperature, 22.0);
        assert_eq!(ac.zone(1).unwrap().error, ZoneError::NoSignal);
    }

    #[test]
    fn empty_app_version_is_mid_update() {
        let sys = parse_system(r#"{"system": {"myAppRev": ""}, "aircons": {}}"#).unwrap();
        assert!(sys.is_mid_update());
        let sys = parse_system("{}").unwrap();
        assert!(sys.is_mid_update());
    }

    #[test]
    fn unknown_value_drops_only_that_unit() {
        let body = r#"{"system": {"myAppRev": "1"},
            "aircons": {
                "ac1": {"info": {"state": "on", "mode": "cool", "fan": "low"}},
                "ac2": {"info": {"state": "on", "mode": "cool", "fan": "autoXX"}},
                "ac3": {"info": {"state": "off", "mode": "turbo", "fan": "low"}}
            }}"#;
        let sys = parse_system(body).unwrap();
        let ids: Vec<&str> = sys.aircons.iter().map(|ac| ac.id.as_str()).collect();
        assert_eq!(ids, ["ac1"]);
        assert_eq!(sys.aircons[0].fan_speed, FanSpeed::Low);
    }

    #[test]
    fn unit_numbers_follow_id_order_across_skipped_units() {
        let body = r#"{"system": {"myAppRev": "1"},
            "aircons": {
                "ac1": {"info": {"mode": "turbo"}},
                "ac2": {"info": {"state": "on"}}
            }}"#;
        let sys = parse_system(body).unwrap();
        assert_eq!(sys.aircons.len(), 1);
        assert_eq!(sys.aircons[0].id, "ac2");
        assert_eq!(sys.aircons[0].number, 2);
    }

    #[test]
    fn bad_zone_numbers_drop_the_unit() {
        let body = r#"{"system": {"myAppRev": "1"},
            "aircons": {"ac1": {"info": {"state": "on", "mode": "cool", "fan": "low"},
                "zones": {"z01": {"number": 0, "state": "open"}}}}}"#;
        assert!(parse_system(body).unwrap().aircons.is_empty());

        let body = r#"{"system": {"myAppRev": "1"},
            "aircons": {"ac1": {"zones": {
                "z01": {"number": 1}, "z02": {"number": 1}}}}}"#;
        assert!(parse_system(body).unwrap().aircons.is_empty());
    }

    #[test]
    fn too_many_units_is_an_error() {
        let aircons: serde_json::Map<String, serde_json::Value> = (0..256)
            .map(|i| (format!("ac{i:03}"), serde_json::json!({"info": {"state": "off"}})))
            .collect();
        let body = serde_json::json!({"system": {"myAppRev": "1"}, "aircons": aircons});
        let err = parse_system(&body.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidSnapshot(_)), "got {err:?}");
    }

    #[test]
    fn write_request_omits_unset_fields() {
        let mut req = WriteRequest::default();
        req.aircon("ac1").info.state = Some("on");
        req.zone("ac1", "z03").set_temp = Some(21.0);
        let json: serde_json::Value = serde_json::from_str(&req.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ac1": {"info": {"state": "on"}, "zones": {"z03": {"setTemp": 21.0}}}})
        );
    }

    #[test]
    fn write_response_ack() {
        assert!(parse_write_response(r#"{"ack": true, "request": "setAircon"}"#).is_ok());
        match parse_write_response(r#"{"ack": false, "reason": "zone is constant"}"#) {
            Err(Error::Rejected(reason)) => assert_eq!(reason, "zone is constant"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }
}
