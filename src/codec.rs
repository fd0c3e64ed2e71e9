//! Stateless conversions between byte buffers and the values carried in them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use uuid::Uuid;

use crate::error::{DecodeError, require_len};

/// `0000xxxx-0000-1000-8000-00805f9b34fb`
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805f9b34fb;

const SHORT_UUID_MASK: u128 = 0xffffffff_0000_0000_0000_000000000000;

pub fn to_hex(buffer: &[u8]) -> String {
    hex::encode(buffer)
}

/// Parse a hex string, tolerating `:`, `-` and whitespace separators.
pub fn from_hex(text: &str) -> Result<Vec<u8>, DecodeError> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != '-')
        .collect();
    hex::decode(&cleaned).map_err(|e| DecodeError::invalid("hex", e.to_string()))
}

/// Expand a 16-bit assigned number onto the Bluetooth base UUID.
pub const fn uuid_from_u16(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Build a UUID on a vendor base, replacing bits 96..112 with `short`.
pub const fn uuid_on_base(base: u128, short: u16) -> Uuid {
    Uuid::from_u128((base & !SHORT_UUID_MASK) | ((short as u128) << 96))
}

/// The 16-bit form of `uuid` if it lives on the Bluetooth base UUID.
pub fn short_uuid(uuid: &Uuid) -> Option<u16> {
    let value = uuid.as_u128();
    if value & !SHORT_UUID_MASK != BLUETOOTH_BASE_UUID || value >> 112 != 0 {
        return None;
    }
    Some((value >> 96) as u16)
}

/// Lowercase, dash-less form used by most adapters: `180f` for assigned
/// numbers, 32 hex digits otherwise.
pub fn compact_uuid(uuid: &Uuid) -> String {
    match short_uuid(uuid) {
        Some(short) => format!("{short:04x}"),
        None => uuid.simple().to_string(),
    }
}

/// Accepts `180f`, `0000180f`, dashed and dash-less 128-bit forms.
pub fn parse_uuid(text: &str) -> Result<Uuid, DecodeError> {
    let text = text.trim();
    match text.len() {
        4 | 8 => u32::from_str_radix(text, 16)
            .ok()
            .and_then(|v| u16::try_from(v).ok())
            .map(uuid_from_u16)
            .ok_or_else(|| DecodeError::invalid("uuid", text)),
        _ => Uuid::parse_str(text).map_err(|e| DecodeError::invalid("uuid", e.to_string())),
    }
}

/// Company identifier leading a manufacturer data block (little-endian).
pub fn manufacturer_id(data: &[u8]) -> Option<u16> {
    match data {
        [lo, hi, ..] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

pub fn manufacturer_name(id: u16) -> Option<&'static str> {
    let name = match id {
        0x0006 => "Microsoft",
        0x000d => "Texas Instruments Inc.",
        0x004c => "Apple, Inc.",
        0x0059 => "Nordic Semiconductor ASA",
        0x0075 => "Samsung Electronics Co. Ltd.",
        0x00e0 => "Google",
        0x0131 => "Cypress Semiconductor",
        0x0371 => "Wazombi Labs OÜ",
        0x038f => "Xiaomi Inc.",
        _ => return None,
    };
    Some(name)
}

/// Read a string up to the first NUL, trimmed. Some firmware pads names with
/// an ASCII `0` after the terminator position; a trailing `0` is dropped
/// unless it follows another digit.
pub fn read_cstring(buffer: &[u8]) -> String {
    let end = buffer.iter().position(|&b| b == 0).unwrap_or(buffer.len());
    let text = String::from_utf8_lossy(&buffer[..end]);
    let mut text = text.trim().to_string();

    let mut tail = text.chars().rev();
    if let (Some('0'), Some(previous)) = (tail.next(), tail.next()) {
        if !previous.is_ascii_digit() {
            text.pop();
            text.truncate(text.trim_end().len());
        }
    }
    text
}

/// Encode `text` into a fixed-width NUL padded field, truncating if needed.
pub fn write_cstring(text: &str, width: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; width];
    let bytes = text.as_bytes();
    let len = bytes.len().min(width.saturating_sub(1));
    buffer[..len].copy_from_slice(&bytes[..len]);
    buffer
}

pub fn le_u16(buffer: &[u8], offset: usize) -> Result<u16, DecodeError> {
    require_len(buffer, offset + 2)?;
    Ok(u16::from_le_bytes([buffer[offset], buffer[offset + 1]]))
}

pub fn le_i16(buffer: &[u8], offset: usize) -> Result<i16, DecodeError> {
    le_u16(buffer, offset).map(|v| v as i16)
}

pub fn le_u32(buffer: &[u8], offset: usize) -> Result<u32, DecodeError> {
    require_len(buffer, offset + 4)?;
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buffer[offset..offset + 4]);
    Ok(u32::from_le_bytes(raw))
}

pub fn le_i32(buffer: &[u8], offset: usize) -> Result<i32, DecodeError> {
    le_u32(buffer, offset).map(|v| v as i32)
}

/// GATT Date Time (0x2A08 layout): year u16 LE, month, day, hours, minutes,
/// seconds. A zero year, month or day means "unknown".
pub fn gatt_date_time(buffer: &[u8]) -> Result<NaiveDateTime, DecodeError> {
    require_len(buffer, 7)?;
    let year = le_u16(buffer, 0)?;
    let (month, day) = (buffer[2], buffer[3]);
    let (hour, minute, second) = (buffer[4], buffer[5], buffer[6]);

    NaiveDate::from_ymd_opt(year.into(), month.into(), day.into())
        .and_then(|date| date.and_hms_opt(hour.into(), minute.into(), second.into()))
        .ok_or_else(|| {
            DecodeError::invalid(
                "date time",
                format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"),
            )
        })
}

pub fn encode_gatt_date_time(value: &NaiveDateTime) -> Vec<u8> {
    use chrono::{Datelike, Timelike};

    let mut buffer = Vec::with_capacity(7);
    buffer.extend_from_slice(&(value.year() as u16).to_le_bytes());
    buffer.push(value.month() as u8);
    buffer.push(value.day() as u8);
    buffer.push(value.hour() as u8);
    buffer.push(value.minute() as u8);
    buffer.push(value.second() as u8);
    buffer
}

/// Seconds since the Unix epoch, u32 LE.
pub fn unix_time(buffer: &[u8], offset: usize) -> Result<DateTime<Utc>, DecodeError> {
    let seconds = le_u32(buffer, offset)?;
    DateTime::from_timestamp(seconds.into(), 0)
        .ok_or_else(|| DecodeError::invalid("unix time", seconds.to_string()))
}

pub fn encode_unix_time(value: &DateTime<Utc>) -> [u8; 4] {
    (value.timestamp().clamp(0, u32::MAX.into()) as u32).to_le_bytes()
}

pub fn bit(byte: u8, index: u8) -> bool {
    byte & (1 << index) != 0
}

/// Extract `width` bits starting at `offset`.
pub fn bits(byte: u8, offset: u8, width: u8) -> u8 {
    (byte >> offset) & field_mask(width)
}

/// Replace `width` bits starting at `offset` with the low bits of `value`.
pub fn set_bits(byte: u8, offset: u8, width: u8, value: u8) -> u8 {
    let mask = field_mask(width) << offset;
    (byte & !mask) | ((value << offset) & mask)
}

fn field_mask(width: u8) -> u8 {
    if width >= 8 { 0xff } else { (1u8 << width) - 1 }
}

/// Derive a snake_case lookup key from a human readable name:
/// `"Battery Level"` becomes `battery_level`.
pub fn to_key(name: &str) -> String {
    let mut key = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c.to_ascii_lowercase());
        } else if !key.is_empty() && !key.ends_with('_') {
            key.push('_');
        }
    }
    while key.ends_with('_') {
        key.pop();
    }
    key
}
