use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::api::characteristic::NativeCharacteristic;

/// Native peripheral handle as delivered with a discovery event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativePeripheral {
    pub id: PeripheralId,
    /// Not every platform exposes the address before the first connection.
    pub address: Option<String>,
    pub local_name: Option<String>,
    /// Raw manufacturer data, company identifier included.
    pub manufacturer_data: Option<Vec<u8>>,
    pub rssi: i16,
    pub connectable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeService {
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
    pub service: NativeService,
    pub characteristics: Vec<NativeCharacteristic>,
}
