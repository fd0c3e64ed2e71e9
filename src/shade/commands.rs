use crate::Error;
use crate::error::{DecodeError, require_len};

/// Values written to the motor control characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MotorCommand {
    Up = 0x69,
    Down = 0x96,
    Stop = 0x00,
}

impl MotorCommand {
    pub fn byte(self) -> u8 {
        self as u8
    }
}

pub const CALIBRATION_OPCODE: u8 = 0x20;
pub const VENETIAN_MODE_OPCODE: u8 = 0x21;

/// Toggle frame sent on the shade configuration characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Calibration(bool),
    VenetianMode(bool),
}

impl Toggle {
    pub fn opcode(self) -> u8 {
        match self {
            Toggle::Calibration(_) => CALIBRATION_OPCODE,
            Toggle::VenetianMode(_) => VENETIAN_MODE_OPCODE,
        }
    }

    pub fn encode(self) -> [u8; 2] {
        let on = match self {
            Toggle::Calibration(on) | Toggle::VenetianMode(on) => on,
        };
        [self.opcode(), u8::from(on)]
    }
}

/// `[opcode, status]` acknowledgement of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub opcode: u8,
    pub status: u8,
}

impl Ack {
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        require_len(frame, 2)?;
        Ok(Ack {
            opcode: frame[0],
            status: frame[1],
        })
    }

    /// Fail with [`Error::Rejected`] unless this acknowledges `opcode` with a
    /// zero status.
    pub fn check(self, opcode: u8, operation: &str) -> Result<(), Error> {
        if self.opcode != opcode {
            return Err(DecodeError::invalid(
                "ack opcode",
                format!("{:#04x}, expected {opcode:#04x}", self.opcode),
            )
            .into());
        }
        if self.status != 0 {
            return Err(Error::Rejected {
                operation: operation.to_string(),
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn motor_bytes() {
        assert_eq!(MotorCommand::Up.byte(), 0x69);
        assert_eq!(MotorCommand::Down.byte(), 0x96);
        assert_eq!(MotorCommand::Stop.byte(), 0x00);
    }

    #[test]
    fn toggle_frames() {
        assert_eq!(Toggle::Calibration(true).encode(), [0x20, 1]);
        assert_eq!(Toggle::VenetianMode(false).encode(), [0x21, 0]);
    }

    #[test]
    fn ack_status() {
        assert_eq!(Ack::decode(&[0x20, 0]).unwrap().check(0x20, "calibrate"), Ok(()));
        assert_eq!(
            Ack::decode(&[0x20, 3]).unwrap().check(0x20, "calibrate"),
            Err(Error::Rejected {
                operation: "calibrate".into(),
                status: 3
            })
        );
        assert!(Ack::decode(&[0x21, 0]).unwrap().check(0x20, "calibrate").is_err());
        assert!(Ack::decode(&[0x20]).is_err());
    }
}
