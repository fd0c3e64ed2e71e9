use crate::Error;
use crate::api::{NativePeripheral, PeripheralId};
use crate::client::request::{Request, Response};
use crate::codec;
use crate::definitions::Value;

/// Who caused a scan state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Requested through this client.
    Local,
    /// The adapter, or another process sharing it.
    External,
}

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Request(Request),
    Response(Response),
    Error { request: Request, error: Error },
    Enabled,
    Disabled,
    ScanStarted { origin: Origin },
    ScanStopped { origin: Origin },
    DeviceFound(DeviceFound),
}

#[derive(Debug, Clone)]
pub enum PeripheralEvent {
    Request(Request),
    Response(Response),
    /// Reported once per failed operation, after retries are exhausted.
    Error { operation: String, error: Error },
    Connected { rssi: Option<i16> },
    Disconnected,
    Notification(Notification),
}

/// Unsolicited value pushed by a subscribed characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub service: String,
    pub characteristic: String,
    pub data: Vec<u8>,
    /// `None` when the payload did not decode.
    pub value: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manufacturer {
    pub code: u16,
    pub name: Option<&'static str>,
}

/// Normalised discovery of a connectable peripheral within RSSI range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceFound {
    pub id: PeripheralId,
    pub address: Option<String>,
    pub manufacturer: Option<Manufacturer>,
    pub local_name: Option<String>,
    pub rssi: i16,
    pub peripheral: NativePeripheral,
}

impl From<NativePeripheral> for DeviceFound {
    fn from(peripheral: NativePeripheral) -> Self {
        let manufacturer = peripheral
            .manufacturer_data
            .as_deref()
            .and_then(codec::manufacturer_id)
            .map(|code| Manufacturer {
                code,
                name: codec::manufacturer_name(code),
            });

        DeviceFound {
            id: peripheral.id,
            address: peripheral.address.clone(),
            manufacturer,
            local_name: peripheral.local_name.clone(),
            rssi: peripheral.rssi,
            peripheral,
        }
    }
}
