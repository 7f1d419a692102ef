use serde_json::Value;

use crate::types::*;

/// Collect `(path, old, new)` for every leaf that differs. Keys only present
/// in `previous` are not reported.
pub(crate) fn diff_json(
    previous: &Value,
    current: &Value,
    path_prefix: &str,
    changes: &mut Vec<(String, Value, Value)>,
) {
    match (previous, current) {
        (Value::Object(prev_map), Value::Object(curr_map)) => {
            for (key, curr_val) in curr_map {
                let path = if path_prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{path_prefix}.{key}")
                };
                match prev_map.get(key) {
                    Some(prev_val) => diff_json(prev_val, curr_val, &path, changes),
                    None => {
                        if curr_val.is_object() {
                            diff_json(&Value::Object(serde_json::Map::new()), curr_val, &path, changes);
                        } else {
                            changes.push((path, Value::Null, curr_val.clone()));
                        }
                    }
                }
            }
        }
        (prev, curr) if prev != curr => {
            changes.push((path_prefix.to_string(), prev.clone(), curr.clone()));
        }
        _ => {}
    }
}

/// Events describing how `current` differs from `previous`.
pub fn diff_systems(previous: &System, current: &System) -> Vec<Event> {
    let mut events = Vec::new();

    for ac in &current.aircons {
        match previous.aircon(&ac.id) {
            Some(prev) => diff_aircon(prev, ac, &mut events),
            None => events.push(Event::AirConAdded { aircon: ac.id.clone() }),
        }
    }

    for prev in &previous.aircons {
        if current.aircon(&prev.id).is_none() {
            events.push(Event::AirConRemoved { aircon: prev.id.clone() });
        }
    }

    events
}

fn diff_aircon(prev: &AirCon, curr: &AirCon, events: &mut Vec<Event>) {
    let aircon = || curr.id.clone();

    if prev.power != curr.power {
        events.push(Event::PowerChanged { aircon: aircon(), power: curr.power });
    }
    if prev.mode != curr.mode {
        events.push(Event::ModeChanged { aircon: aircon(), mode: curr.mode });
    }
    if prev.fan_speed != curr.fan_speed {
        events.push(Event::FanSpeedChanged { aircon: aircon(), speed: curr.fan_speed });
    }
    if prev.my_zone != curr.my_zone {
        events.push(Event::MyZoneChanged { aircon: aircon(), zone: curr.my_zone });
    }

    for z in &curr.zones {
        let Some(pz) = prev.zone_by_id(&z.id) else {
            continue;
        };
        if pz.state != z.state {
            events.push(Event::ZoneStateChanged {
                aircon: aircon(),
                zone: z.number,
                name: z.name.clone(),
                state: z.state,
            });
        }
        if pz.current_temperature != z.current_temperature {
            events.push(Event::ZoneTemperatureChanged {
                aircon: aircon(),
                zone: z.number,
                name: z.name.clone(),
                temp: z.current_temperature,
            });
        }
        if pz.target_temperature != z.target_temperature {
            events.push(Event::ZoneSetpointChanged {
                aircon: aircon(),
                zone: z.number,
                name: z.name.clone(),
                temp: z.target_temperature,
            });
        }
        if pz.error != z.error {
            events.push(Event::ZoneErrorChanged {
                aircon: aircon(),
                zone: z.number,
                name: z.name.clone(),
                error: z.error,
            });
        }
    }
}
