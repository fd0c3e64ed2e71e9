use uuid::Uuid;

use crate::api::central::PeripheralId;
use crate::api::peripheral::NativePeripheral;

/// Everything the adapter reports asynchronously.
#[derive(Debug, Clone)]
pub enum CentralEvent {
    StateUpdate {
        state: CentralState,
    },
    ScanStarted,
    ScanStopped,
    DeviceDiscovered {
        peripheral: NativePeripheral,
    },
    DeviceConnected {
        peripheral: PeripheralId,
        address: Option<String>,
        rssi: Option<i16>,
    },
    DeviceDisconnected {
        peripheral: PeripheralId,
    },
    CharacteristicNotified {
        peripheral: PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: Vec<u8>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CentralState {
    Unknown = 0,
    PoweredOn = 1,
    PoweredOff = 2,
    Resetting = 3,
    Unsupported = 4,
    Unauthorized = 5,
}

impl CentralState {
    pub fn is_powered_on(self) -> bool {
        self == CentralState::PoweredOn
    }
}
