//! Scheduled movements stored on the shade.
//!
//! Triggers are managed by writing a command frame to the motor service's
//! trigger control characteristic and reading the reply from the trigger
//! response notification.

use std::fmt;

use chrono::Weekday;

use crate::codec;
use crate::error::{DecodeError, require_len};

const RECORD_LEN: usize = 6;

const FLAG_ENABLED: u8 = 0;
const FLAG_MORNING_MODE: u8 = 1;
const FLAG_SUN: u8 = 2;
const FLAG_LIGHT: u8 = 3;
const FLAG_SUNSET: u8 = 4;

/// Days a trigger fires on, one bit per day starting with Sunday at bit 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Weekdays(pub u8);

impl Weekdays {
    pub const EVERY_DAY: Weekdays = Weekdays(0x7f);

    pub fn from_days(days: impl IntoIterator<Item = Weekday>) -> Self {
        Weekdays(
            days.into_iter()
                .fold(0, |mask, day| mask | 1 << day.num_days_from_sunday()),
        )
    }

    pub fn contains(self, day: Weekday) -> bool {
        codec::bit(self.0, day.num_days_from_sunday() as u8)
    }

    pub fn days(self) -> Vec<Weekday> {
        let mut day = Weekday::Sun;
        let mut days = Vec::new();
        for _ in 0..7 {
            if self.contains(day) {
                days.push(day);
            }
            day = day.succ();
        }
        days
    }

    pub fn is_every_day(self) -> bool {
        self.0 & 0x7f == 0x7f
    }

    pub fn is_empty(self) -> bool {
        self.0 & 0x7f == 0
    }
}

impl fmt::Display for Weekdays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_every_day() {
            return f.write_str("every day");
        }
        if self.is_empty() {
            return f.write_str("never");
        }
        let days: Vec<String> = self.days().iter().map(ToString::to_string).collect();
        f.write_str(&days.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunEvent {
    Sunrise,
    Sunset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Relative to sunrise or sunset, in minutes.
    Sun { event: SunEvent, offset_minutes: i16 },
    /// Ambient light crossing a threshold.
    Light { threshold: i16 },
    /// Local wall clock time.
    Time { hour: u8, minute: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trigger {
    pub id: u8,
    pub kind: TriggerKind,
    pub days: Weekdays,
    /// Raw 0..=100 position to move to.
    pub position: u8,
    pub enabled: bool,
    pub morning_mode: bool,
}

impl Trigger {
    pub fn decode(record: &[u8]) -> Result<Self, DecodeError> {
        require_len(record, RECORD_LEN)?;
        let flags = record[1];
        let (p0, p1) = (record[4], record[5]);

        let kind = match (codec::bit(flags, FLAG_SUN), codec::bit(flags, FLAG_LIGHT)) {
            (true, true) => {
                return Err(DecodeError::invalid("trigger kind", "both sun and light"));
            }
            (true, false) => TriggerKind::Sun {
                event: if codec::bit(flags, FLAG_SUNSET) {
                    SunEvent::Sunset
                } else {
                    SunEvent::Sunrise
                },
                offset_minutes: i16::from_le_bytes([p0, p1]),
            },
            (false, true) => TriggerKind::Light {
                threshold: i16::from_le_bytes([p0, p1]),
            },
            (false, false) => {
                if p0 > 23 || p1 > 59 {
                    return Err(DecodeError::invalid("trigger time", format!("{p0}:{p1:02}")));
                }
                TriggerKind::Time { hour: p0, minute: p1 }
            }
        };

        let position = record[3];
        if position > 100 {
            return Err(DecodeError::invalid("trigger position", position.to_string()));
        }

        Ok(Trigger {
            id: record[0],
            kind,
            days: Weekdays(record[2]),
            position,
            enabled: codec::bit(flags, FLAG_ENABLED),
            morning_mode: codec::bit(flags, FLAG_MORNING_MODE),
        })
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut flags = codec::set_bits(0, FLAG_ENABLED, 1, u8::from(self.enabled));
        flags = codec::set_bits(flags, FLAG_MORNING_MODE, 1, u8::from(self.morning_mode));
        let [p0, p1] = match self.kind {
            TriggerKind::Sun {
                event,
                offset_minutes,
            } => {
                flags = codec::set_bits(flags, FLAG_SUN, 1, 1);
                flags = codec::set_bits(flags, FLAG_SUNSET, 1, u8::from(event == SunEvent::Sunset));
                offset_minutes.to_le_bytes()
            }
            TriggerKind::Light { threshold } => {
                flags = codec::set_bits(flags, FLAG_LIGHT, 1, 1);
                threshold.to_le_bytes()
            }
            TriggerKind::Time { hour, minute } => [hour, minute],
        };
        [self.id, flags, self.days.0, self.position, p0, p1]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCommand {
    Add(Trigger),
    Edit(Trigger),
    Read(u8),
    Remove(u8),
}

impl TriggerCommand {
    pub const ADD: u8 = 0x01;
    pub const EDIT: u8 = 0x02;
    pub const READ: u8 = 0x03;
    pub const REMOVE: u8 = 0x04;

    pub fn opcode(&self) -> u8 {
        match self {
            TriggerCommand::Add(_) => Self::ADD,
            TriggerCommand::Edit(_) => Self::EDIT,
            TriggerCommand::Read(_) => Self::READ,
            TriggerCommand::Remove(_) => Self::REMOVE,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![self.opcode()];
        match self {
            TriggerCommand::Add(trigger) | TriggerCommand::Edit(trigger) => {
                frame.extend_from_slice(&trigger.encode())
            }
            TriggerCommand::Read(id) | TriggerCommand::Remove(id) => frame.push(*id),
        }
        frame
    }

    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        require_len(frame, 2)?;
        match frame[0] {
            Self::ADD => Ok(TriggerCommand::Add(Trigger::decode(&frame[1..])?)),
            Self::EDIT => Ok(TriggerCommand::Edit(Trigger::decode(&frame[1..])?)),
            Self::READ => Ok(TriggerCommand::Read(frame[1])),
            Self::REMOVE => Ok(TriggerCommand::Remove(frame[1])),
            other => Err(DecodeError::invalid("trigger opcode", format!("{other:#04x}"))),
        }
    }
}

/// Reply to a [`TriggerCommand`]: opcode echo, status (zero on success)
/// and, for reads and adds, the stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerResponse {
    pub opcode: u8,
    pub status: u8,
    pub trigger: Option<Trigger>,
}

impl TriggerResponse {
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        require_len(frame, 2)?;
        let trigger = match &frame[2..] {
            [] => None,
            record => Some(Trigger::decode(record)?),
        };
        Ok(TriggerResponse {
            opcode: frame[0],
            status: frame[1],
            trigger,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = vec![self.opcode, self.status];
        if let Some(trigger) = &self.trigger {
            frame.extend_from_slice(&trigger.encode());
        }
        frame
    }

    pub fn is_ok(&self) -> bool {
        self.status == 0
    }
}
