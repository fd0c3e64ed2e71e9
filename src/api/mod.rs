//! Interface presented by the native BLE adapter.
//!
//! The engine never talks to radio hardware itself. An implementation of
//! [`Adapter`] performs the primitives and reports everything asynchronous
//! through a `Sender<CentralEvent>` handed to it by the application.

pub mod central;
pub mod central_event;
pub mod characteristic;
pub mod peripheral;

pub use central::{Adapter, PeripheralId, ScanFilter};
pub use central_event::{CentralEvent, CentralState};
pub use characteristic::{CharacteristicProperty, CharacteristicWriteType, NativeCharacteristic};
pub use peripheral::{DiscoveredService, NativePeripheral, NativeService};
