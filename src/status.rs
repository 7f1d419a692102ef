//! Human-readable rendering of a snapshot.

use std::fmt::Write;

use crate::types::{AirCon, Mode, Zone, ZoneError, ZoneState};

/// Render one unit and its zones as a block of text.
pub fn format_aircon(ac: &AirCon) -> String {
    let mut out = String::new();
    let title = format!("{} ({})", ac.name, ac.id);

    let _ = writeln!(out, "{title}");
    let _ = writeln!(out, "{}", "-".repeat(title.chars().count()));
    let _ = writeln!(out);

    let _ = writeln!(out, "Power:    {}", ac.power.as_myplace_str());

    let _ = write!(out, "Mode:     {}", ac.mode.as_myplace_str());
    if ac.mode == Mode::Auto
        && let Some(mode) = ac.my_auto_mode
    {
        let _ = write!(out, " ({})", mode.as_myplace_str());
    }
    for (enabled, label) in [
        (ac.my_temp_enabled, "mytemp"),
        (ac.my_auto_enabled, "myauto"),
        (ac.sleep_saver_enabled, "mysleep$aver"),
    ] {
        if enabled {
            let _ = write!(out, " [{label} enabled]");
        }
    }
    let _ = writeln!(out);

    let _ = write!(out, "Fan:      {}", ac.fan_speed.as_myplace_str());
    if ac.smart_fan_enabled {
        let _ = write!(out, " [myfan enabled]");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "Firmware: v{}", ac.firmware());
    let _ = writeln!(out);

    let pad = ac.zones.iter().map(|z| z.name.chars().count()).max().unwrap_or(0);
    for z in &ac.zones {
        format_zone(&mut out, ac, z, pad);
    }

    out
}

fn format_zone(out: &mut String, ac: &AirCon, z: &Zone, pad: usize) {
    let _ = write!(out, "  {:>2} {:<pad$}", z.number, z.name);

    let marker = if z.number == ac.my_zone {
        " (my)"
    } else if z.is_open() {
        " (on)"
    } else {
        "     "
    };
    out.push_str(marker);

    if z.is_open() {
        let _ = write!(out, "  {:>3}%", z.damper_percentage);
    } else {
        out.push_str("     -");
    }

    if z.has_temp_sensor {
        out.push_str("  ");
        if z.state == ZoneState::Closed {
            let _ = write!(out, "         {:.1}°", z.target_temperature);
        } else if z.current_temperature == z.target_temperature {
            let _ = write!(out, "{:.1}°         ", z.current_temperature);
        } else {
            let _ = write!(out, "{:.1}° -> {:.1}°", z.current_temperature, z.target_temperature);
        }
    }

    if z.error != ZoneError::None {
        let _ = write!(out, "  (error: {})", z.error);
    }

    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FanSpeed, Power};

    fn aircon() -> AirCon {
        AirCon {
            id: "ac1".to_string(),
            number: 1,
            name: "Home".to_string(),
            power: Power::On,
            mode: Mode::Cool,
            fan_speed: FanSpeed::AutoSoftware,
            smart_fan_enabled: true,
            my_zone: 1,
            firmware_major: 11,
            firmware_minor: 2,
            zones: vec![
                Zone {
                    id: "z01".to_string(),
                    number: 1,
                    name: "Living".to_string(),
                    state: ZoneState::Open,
                    damper_percentage: 100,
                    has_temp_sensor: true,
                    current_temperature: 24.0,
                    target_temperature: 22.0,
                    ..Default::default()
                },
                Zone {
                    id: "z02".to_string(),
                    number: 2,
                    name: "Bed".to_string(),
                    state: ZoneState::Closed,
                    has_temp_sensor: true,
                    target_temperature: 20.0,
                    error: ZoneError::NoSignal,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn renders_header_and_zones() {
        let text = format_aircon(&aircon());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Home (ac1)");
        assert_eq!(lines[1], "----------");
        assert_eq!(lines[3], "Power:    on");
        assert_eq!(lines[4], "Mode:     cool");
        assert_eq!(lines[5], "Fan:      autoAA [myfan enabled]");
        assert_eq!(lines[6], "Firmware: v11.2");
        assert_eq!(lines[8], "   1 Living (my)  100%  24.0° -> 22.0°");
        assert!(lines[9].starts_with("   2 Bed             -           20.0°  (error: "));
    }

    #[test]
    fn myauto_shows_current_set_mode() {
        let ac = AirCon {
            mode: Mode::Auto,
            my_auto_mode: Some(Mode::Heat),
            my_auto_enabled: true,
            ..aircon()
        };
        let text = format_aircon(&ac);
        assert!(text.contains("Mode:     myauto (heat) [myauto enabled]\n"));
    }
}
