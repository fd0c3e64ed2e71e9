//! BLE peripheral interaction engine.
//!
//! Turns a notification-driven BLE adapter into a request/response protocol
//! with timeouts, retries, disconnect handling and declarative decoding of
//! characteristic values. The adapter itself is supplied by the caller through
//! the [`api::Adapter`] trait.

pub mod api;
pub mod client;
pub mod codec;
pub mod config;
pub mod definitions;
pub mod error;
pub mod shade;

pub use client::{Client, Peripheral};
pub use config::ClientConfig;
pub use error::{AdapterError, BleError, DecodeError, Error};

pub type Result<T, E = Error> = std::result::Result<T, E>;
