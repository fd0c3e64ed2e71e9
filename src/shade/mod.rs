//! Motorised shade support: advertisement parsing, command and trigger frames,
//! the configuration TLV reply, and a [`Shade`] driver tying them to a
//! [`Peripheral`](crate::Peripheral).

pub mod advertisement;
pub mod commands;
pub mod configuration;
pub mod device;
pub mod trigger;

pub use advertisement::{SHADE_MANUFACTURER_ID, ShadeAdvertisement};
pub use commands::{Ack, MotorCommand, Toggle};
pub use configuration::{ConfigTag, ShadeConfiguration};
pub use device::Shade;
pub use trigger::{SunEvent, Trigger, TriggerCommand, TriggerKind, TriggerResponse, Weekdays};
