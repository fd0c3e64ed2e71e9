use chrono::NaiveTime;

use crate::codec;
use crate::error::{DecodeError, require_len};

pub const CONFIGURATION_OPCODE: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ConfigTag {
    BootCounter = 0x01,
    LocalTimeOffset = 0x02,
    MotorSpeed = 0x03,
    SunTimes = 0x04,
}

impl ConfigTag {
    pub const ALL: [ConfigTag; 4] = [
        ConfigTag::BootCounter,
        ConfigTag::LocalTimeOffset,
        ConfigTag::MotorSpeed,
        ConfigTag::SunTimes,
    ];
}

/// Build a query for `tags`. An empty list asks for everything.
pub fn query(tags: &[ConfigTag]) -> Vec<u8> {
    let tags = if tags.is_empty() { &ConfigTag::ALL[..] } else { tags };
    let mut frame = Vec::with_capacity(tags.len() + 2);
    frame.push(CONFIGURATION_OPCODE);
    frame.push(tags.len() as u8);
    frame.extend(tags.iter().map(|tag| *tag as u8));
    frame
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShadeConfiguration {
    pub status: u8,
    pub boot_counter: Option<u32>,
    /// Seconds east of UTC.
    pub local_time_offset: Option<i32>,
    pub motor_speed: Option<u8>,
    pub sunrise: Option<NaiveTime>,
    pub sunset: Option<NaiveTime>,
    /// Tags this driver does not know, skipped by length.
    pub skipped: Vec<u8>,
}

struct TagRule {
    tag: u8,
    width: usize,
    apply: fn(&mut ShadeConfiguration, &[u8]) -> Result<(), DecodeError>,
}

static TAG_RULES: &[TagRule] = &[
    TagRule {
        tag: ConfigTag::BootCounter as u8,
        width: 4,
        apply: |config, value| {
            config.boot_counter = Some(codec::le_u32(value, 0)?);
            Ok(())
        },
    },
    TagRule {
        tag: ConfigTag::LocalTimeOffset as u8,
        width: 4,
        apply: |config, value| {
            config.local_time_offset = Some(codec::le_i32(value, 0)?);
            Ok(())
        },
    },
    TagRule {
        tag: ConfigTag::MotorSpeed as u8,
        width: 1,
        apply: |config, value| {
            config.motor_speed = Some(value[0]);
            Ok(())
        },
    },
    TagRule {
        tag: ConfigTag::SunTimes as u8,
        width: 4,
        apply: |config, value| {
            config.sunrise = Some(minutes_after_midnight(codec::le_u16(value, 0)?)?);
            config.sunset = Some(minutes_after_midnight(codec::le_u16(value, 2)?)?);
            Ok(())
        },
    },
];

fn minutes_after_midnight(minutes: u16) -> Result<NaiveTime, DecodeError> {
    NaiveTime::from_hms_opt(u32::from(minutes / 60), u32::from(minutes % 60), 0)
        .ok_or_else(|| DecodeError::invalid("minutes after midnight", minutes.to_string()))
}

impl ShadeConfiguration {
    /// Decode a `[opcode, status, (tag, len, value)*]` response.
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        require_len(frame, 2)?;
        if frame[0] != CONFIGURATION_OPCODE {
            return Err(DecodeError::invalid(
                "configuration opcode",
                format!("{:#04x}", frame[0]),
            ));
        }

        let mut config = ShadeConfiguration {
            status: frame[1],
            ..ShadeConfiguration::default()
        };
        let mut offset = 2;
        while offset < frame.len() {
            require_len(frame, offset + 2)?;
            let (tag, len) = (frame[offset], usize::from(frame[offset + 1]));
            let start = offset + 2;
            require_len(frame, start + len)?;
            let value = &frame[start..start + len];

            match TAG_RULES.iter().find(|rule| rule.tag == tag) {
                Some(rule) if rule.width != len => {
                    return Err(DecodeError::invalid(
                        "configuration value",
                        format!("tag {tag:#04x} is {len} bytes, expected {}", rule.width),
                    ));
                }
                Some(rule) => (rule.apply)(&mut config, value)?,
                None => config.skipped.push(tag),
            }
            offset = start + len;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_frames() {
        assert_eq!(query(&[ConfigTag::MotorSpeed]), vec![0x10, 1, 0x03]);
        assert_eq!(query(&[]), vec![0x10, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn decodes_known_and_skips_unknown_tags() {
        let frame = [
            0x10, 0x00, //
            0x01, 4, 0x2a, 0, 0, 0, //
            0x7e, 3, 9, 9, 9, //
            0x02, 4, 0x10, 0x0e, 0, 0, //
            0x03, 1, 80, //
            0x04, 4, 0x68, 0x01, 0x92, 0x04,
        ];
        let config = ShadeConfiguration::decode(&frame).unwrap();
        assert_eq!(config.status, 0);
        assert_eq!(config.boot_counter, Some(42));
        assert_eq!(config.local_time_offset, Some(3600));
        assert_eq!(config.motor_speed, Some(80));
        assert_eq!(config.sunrise, NaiveTime::from_hms_opt(6, 0, 0));
        assert_eq!(config.sunset, NaiveTime::from_hms_opt(19, 30, 0));
        assert_eq!(config.skipped, vec![0x7e]);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let frame = [0x10, 0x00, 0x03, 2, 80, 0];
        assert!(matches!(
            ShadeConfiguration::decode(&frame),
            Err(DecodeError::Invalid { field: "configuration value", .. })
        ));
    }

    #[test]
    fn truncated_value_is_too_short() {
        let frame = [0x10, 0x00, 0x01, 4, 1, 2];
        assert!(matches!(
            ShadeConfiguration::decode(&frame),
            Err(DecodeError::TooShort { expected: 8, actual: 6 })
        ));
    }

    #[test]
    fn minutes_past_midnight_are_bounded() {
        let frame = [0x10, 0x00, 0x04, 4, 0xa0, 0x05, 0, 0];
        assert!(ShadeConfiguration::decode(&frame).is_err());
    }
}
