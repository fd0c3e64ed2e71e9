use std::fmt;

use async_trait::async_trait;
use uuid::Uuid;

use crate::api::central_event::CentralState;
use crate::api::characteristic::{CharacteristicWriteType, NativeCharacteristic};
use crate::api::peripheral::{DiscoveredService, NativeService};
use crate::error::AdapterError;

type Result<T> = std::result::Result<T, AdapterError>;

/// Async primitives of a native BLE central. Every call resolves once the
/// adapter has completed the operation or rejects with an [`AdapterError`].
#[async_trait]
pub trait Adapter: Send + Sync {
    async fn state(&self) -> Result<CentralState>;

    async fn start_scan(&self, filter: ScanFilter) -> Result<()>;

    async fn stop_scan(&self) -> Result<()>;

    async fn connect(&self, peripheral: &PeripheralId) -> Result<()>;

    /// Abort an in-flight connect attempt. Platforms that cannot do this keep
    /// the default and the attempt is left to settle on its own.
    async fn cancel_connect(&self, _peripheral: &PeripheralId) -> Result<()> {
        Err(AdapterError::Unsupported)
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<()>;

    async fn discover_services(
        &self,
        peripheral: &PeripheralId,
        services: &[Uuid],
    ) -> Result<Vec<NativeService>>;

    async fn discover_characteristics(
        &self,
        peripheral: &PeripheralId,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<Vec<NativeCharacteristic>>;

    /// Discover every service and characteristic in one pass.
    async fn discover_all(&self, peripheral: &PeripheralId) -> Result<Vec<DiscoveredService>>;

    async fn read(
        &self,
        peripheral: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>>;

    async fn write(
        &self,
        peripheral: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        write_type: CharacteristicWriteType,
    ) -> Result<()>;

    // enable notifications; values arrive as CentralEvent::CharacteristicNotified
    async fn subscribe(
        &self,
        peripheral: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()>;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ScanFilter {
    pub services: Vec<Uuid>,
    pub allow_duplicates: bool,
}

/// Stable identifier of a peripheral across reconnects and scan sessions.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PeripheralId(pub Uuid);

impl From<Uuid> for PeripheralId {
    fn from(uuid: Uuid) -> Self {
        PeripheralId(uuid)
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}
