use crate::client::DeviceFound;
use crate::codec;
use crate::error::{DecodeError, require_len};

/// Company identifier shades advertise under.
pub const SHADE_MANUFACTURER_ID: u16 = 0x0371;

const HEADER_LEN: usize = 6;

/// State broadcast in a shade's manufacturer data, readable without
/// connecting.
///
/// Layout after the little-endian company identifier: protocol version,
/// a byte carrying the tilt capability in bit 7 and battery percent in the
/// low seven bits, current and target position, then an optional
/// NUL-terminated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadeAdvertisement {
    pub protocol_version: u8,
    pub battery: u8,
    pub supports_tilt: bool,
    /// 0..=100, or -100..=100 on tilting shades.
    pub position: i16,
    pub target: i16,
    pub name: Option<String>,
}

impl ShadeAdvertisement {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        require_len(data, HEADER_LEN)?;
        let manufacturer = codec::le_u16(data, 0)?;
        if manufacturer != SHADE_MANUFACTURER_ID {
            return Err(DecodeError::invalid(
                "manufacturer",
                format!("{manufacturer:#06x} is not a shade"),
            ));
        }

        let status = data[3];
        let supports_tilt = codec::bit(status, 7);
        let battery = codec::bits(status, 0, 7);
        if battery > 100 {
            return Err(DecodeError::invalid("battery", format!("{battery}%")));
        }

        let name = Some(codec::read_cstring(&data[HEADER_LEN..])).filter(|n| !n.is_empty());
        Ok(ShadeAdvertisement {
            protocol_version: data[2],
            battery,
            supports_tilt,
            position: scale_position(data[4], supports_tilt),
            target: scale_position(data[5], supports_tilt),
            name,
        })
    }

    /// Parse the advertisement of a discovered device, `None` when it is not
    /// a shade or its payload is malformed.
    pub fn from_device(device: &DeviceFound) -> Option<Self> {
        let manufacturer = device.manufacturer?;
        if manufacturer.code != SHADE_MANUFACTURER_ID {
            return None;
        }
        let data = device.peripheral.manufacturer_data.as_deref()?;
        Self::parse(data).ok()
    }
}

/// Map a raw 0..=100 position onto the range the shade exposes: tilting
/// shades report -100..=100 with 50 as level.
pub fn scale_position(raw: u8, tilt: bool) -> i16 {
    if tilt { i16::from(raw) * 2 - 100 } else { i16::from(raw) }
}

pub fn unscale_position(position: i16, tilt: bool) -> Result<u8, DecodeError> {
    let range = if tilt { -100..=100 } else { 0..=100 };
    if !range.contains(&position) {
        return Err(DecodeError::invalid("position", position.to_string()));
    }
    let raw = if tilt { (position + 100) / 2 } else { position };
    u8::try_from(raw).map_err(|_| DecodeError::invalid("position", position.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(status: u8, position: u8, target: u8, name: &[u8]) -> Vec<u8> {
        let mut data = vec![0x71, 0x03, 2, status, position, target];
        data.extend_from_slice(name);
        data
    }

    #[test]
    fn parses_roller_shade() {
        let adv = ShadeAdvertisement::parse(&frame(87, 40, 60, b"Kitchen\0")).unwrap();
        assert_eq!(adv.protocol_version, 2);
        assert_eq!(adv.battery, 87);
        assert!(!adv.supports_tilt);
        assert_eq!((adv.position, adv.target), (40, 60));
        assert_eq!(adv.name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn tilt_positions_are_scaled() {
        let adv = ShadeAdvertisement::parse(&frame(0x80 | 50, 0, 75, b"")).unwrap();
        assert!(adv.supports_tilt);
        assert_eq!(adv.battery, 50);
        assert_eq!((adv.position, adv.target), (-100, 50));
        assert_eq!(adv.name, None);
    }

    #[test]
    fn tilt_flag_shares_the_battery_byte() {
        let adv = ShadeAdvertisement::parse(&frame(0x8a, 30, 70, b"")).unwrap();
        assert!(adv.supports_tilt);
        assert_eq!(adv.battery, 10);
        assert_eq!((adv.position, adv.target), (-40, 40));
        assert_eq!(ShadeAdvertisement::parse(&frame(0x8a, 30, 70, b"")).unwrap(), adv);
    }

    #[test]
    fn rejects_foreign_and_short_payloads() {
        assert!(matches!(
            ShadeAdvertisement::parse(&[0x71, 0x03, 2]),
            Err(DecodeError::TooShort { expected: 6, actual: 3 })
        ));
        let mut apple = frame(50, 0, 0, b"");
        apple[0] = 0x4c;
        apple[1] = 0x00;
        assert!(matches!(
            ShadeAdvertisement::parse(&apple),
            Err(DecodeError::Invalid { field: "manufacturer", .. })
        ));
    }

    #[test]
    fn unscale_inverts_scale() {
        for raw in [0u8, 1, 50, 99, 100] {
            assert_eq!(unscale_position(scale_position(raw, true), true).unwrap(), raw);
            assert_eq!(unscale_position(scale_position(raw, false), false).unwrap(), raw);
        }
        assert!(unscale_position(101, false).is_err());
        assert!(unscale_position(-1, false).is_err());
    }
}
