#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use shadecore::api::{
    Adapter, CentralEvent, CentralState, CharacteristicProperty, CharacteristicWriteType,
    DiscoveredService, NativeCharacteristic, NativePeripheral, NativeService, PeripheralId,
    ScanFilter,
};
use shadecore::codec::uuid_from_u16;
use shadecore::definitions::catalogue::{MOTOR_SERVICE, SHADE_SERVICE, TIME_SERVICE, vendor_uuid};
use shadecore::{AdapterError, Client, ClientConfig};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

pub const SHADE_ID: PeripheralId = PeripheralId(Uuid::from_u128(0x5ade));

pub const BATTERY_SERVICE: Uuid = uuid_from_u16(0x180f);
pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2a19);
pub const POSITION: Uuid = vendor_uuid(0x1525);
pub const TARGET_POSITION: Uuid = vendor_uuid(0x1526);
pub const MOTOR_CONTROL: Uuid = vendor_uuid(0x1530);
pub const TRIGGER_CONTROL: Uuid = vendor_uuid(0x1527);
pub const TRIGGER_RESPONSE: Uuid = vendor_uuid(0x1528);
pub const CONFIGURATION: Uuid = vendor_uuid(0x1881);
pub const CONFIGURATION_RESPONSE: Uuid = vendor_uuid(0x1882);
pub const NAME: Uuid = vendor_uuid(0x1892);
pub const CURRENT_TIME: Uuid = vendor_uuid(0x1871);
pub const UTC_OFFSET: Uuid = vendor_uuid(0x1872);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    StartScan,
    StopScan,
    Connect,
    CancelConnect,
    Disconnect,
    DiscoverServices,
    DiscoverCharacteristics,
    DiscoverAll,
    Read,
    Write,
    Subscribe,
}

/// What the next call of an [`Op`] does instead of succeeding right away.
#[derive(Debug, Clone)]
pub enum Behavior {
    Fail(AdapterError),
    Hang,
    Delay(Duration),
}

/// Answers a write with an optional `(service, characteristic, data)`
/// notification, the way a device replies on its response characteristic.
pub type Responder = Box<dyn FnMut(Uuid, Uuid, &[u8]) -> Option<(Uuid, Uuid, Vec<u8>)> + Send>;

struct MockState {
    power: CentralState,
    calls: Vec<Op>,
    scripts: HashMap<Op, VecDeque<Behavior>>,
    gatt: Vec<DiscoveredService>,
    values: HashMap<Uuid, Vec<u8>>,
    writes: Vec<(Uuid, Vec<u8>)>,
    responder: Option<Responder>,
}

/// Scripted stand-in for a native adapter. Succeeds immediately unless a
/// behaviour is queued for the operation, and reports the events a real
/// adapter would.
pub struct MockAdapter {
    events: mpsc::Sender<CentralEvent>,
    state: Mutex<MockState>,
}

impl MockAdapter {
    pub fn new(events: mpsc::Sender<CentralEvent>) -> Self {
        MockAdapter {
            events,
            state: Mutex::new(MockState {
                power: CentralState::PoweredOn,
                calls: Vec::new(),
                scripts: HashMap::new(),
                gatt: shade_gatt(),
                values: HashMap::new(),
                writes: Vec::new(),
                responder: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn script(&self, op: Op, behaviors: impl IntoIterator<Item = Behavior>) {
        self.lock().scripts.entry(op).or_default().extend(behaviors);
    }

    pub fn set_gatt(&self, gatt: Vec<DiscoveredService>) {
        self.lock().gatt = gatt;
    }

    pub fn set_value(&self, characteristic: Uuid, data: &[u8]) {
        self.lock().values.insert(characteristic, data.to_vec());
    }

    pub fn respond_with(&self, responder: Responder) {
        self.lock().responder = Some(responder);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.lock().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.lock().writes.clone()
    }

    pub async fn emit(&self, event: CentralEvent) {
        self.events.send(event).await.unwrap();
    }

    /// Report a discovery and let the client process it.
    pub async fn discover(&self, peripheral: NativePeripheral) {
        self.emit(CentralEvent::DeviceDiscovered { peripheral }).await;
        settle().await;
    }

    pub async fn power(&self, state: CentralState) {
        self.lock().power = state;
        self.emit(CentralEvent::StateUpdate { state }).await;
        settle().await;
    }

    async fn begin(&self, op: Op) -> Result<(), AdapterError> {
        let behavior = {
            let mut state = self.lock();
            state.calls.push(op);
            state.scripts.get_mut(&op).and_then(VecDeque::pop_front)
        };
        match behavior {
            None => Ok(()),
            Some(Behavior::Fail(error)) => Err(error),
            Some(Behavior::Hang) => std::future::pending().await,
            Some(Behavior::Delay(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn state(&self) -> Result<CentralState, AdapterError> {
        Ok(self.lock().power)
    }

    async fn start_scan(&self, _filter: ScanFilter) -> Result<(), AdapterError> {
        self.begin(Op::StartScan).await?;
        self.emit(CentralEvent::ScanStarted).await;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), AdapterError> {
        self.begin(Op::StopScan).await?;
        self.emit(CentralEvent::ScanStopped).await;
        Ok(())
    }

    async fn connect(&self, peripheral: &PeripheralId) -> Result<(), AdapterError> {
        self.begin(Op::Connect).await?;
        self.emit(CentralEvent::DeviceConnected {
            peripheral: *peripheral,
            address: Some("c8:2b:96:00:5a:de".into()),
            rssi: Some(-61),
        })
        .await;
        Ok(())
    }

    async fn cancel_connect(&self, _peripheral: &PeripheralId) -> Result<(), AdapterError> {
        self.begin(Op::CancelConnect).await
    }

    async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), AdapterError> {
        self.begin(Op::Disconnect).await?;
        self.emit(CentralEvent::DeviceDisconnected {
            peripheral: *peripheral,
        })
        .await;
        Ok(())
    }

    async fn discover_services(
        &self,
        _peripheral: &PeripheralId,
        services: &[Uuid],
    ) -> Result<Vec<NativeService>, AdapterError> {
        self.begin(Op::DiscoverServices).await?;
        Ok(self
            .lock()
            .gatt
            .iter()
            .map(|s| s.service)
            .filter(|s| services.is_empty() || services.contains(&s.uuid))
            .collect())
    }

    async fn discover_characteristics(
        &self,
        _peripheral: &PeripheralId,
        service: Uuid,
        characteristics: &[Uuid],
    ) -> Result<Vec<NativeCharacteristic>, AdapterError> {
        self.begin(Op::DiscoverCharacteristics).await?;
        let state = self.lock();
        let found = state
            .gatt
            .iter()
            .find(|s| s.service.uuid == service)
            .ok_or_else(|| AdapterError::NotFound(service.to_string()))?;
        Ok(found
            .characteristics
            .iter()
            .filter(|c| characteristics.is_empty() || characteristics.contains(&c.uuid))
            .cloned()
            .collect())
    }

    async fn discover_all(
        &self,
        _peripheral: &PeripheralId,
    ) -> Result<Vec<DiscoveredService>, AdapterError> {
        self.begin(Op::DiscoverAll).await?;
        Ok(self.lock().gatt.clone())
    }

    async fn read(
        &self,
        _peripheral: &PeripheralId,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<Vec<u8>, AdapterError> {
        self.begin(Op::Read).await?;
        self.lock()
            .values
            .get(&characteristic)
            .cloned()
            .ok_or_else(|| AdapterError::NotFound(characteristic.to_string()))
    }

    async fn write(
        &self,
        peripheral: &PeripheralId,
        service: Uuid,
        characteristic: Uuid,
        data: &[u8],
        _write_type: CharacteristicWriteType,
    ) -> Result<(), AdapterError> {
        self.begin(Op::Write).await?;
        let reply = {
            let mut state = self.lock();
            state.writes.push((characteristic, data.to_vec()));
            state.values.insert(characteristic, data.to_vec());
            state
                .responder
                .as_mut()
                .and_then(|respond| respond(service, characteristic, data))
        };
        if let Some((service, characteristic, data)) = reply {
            self.emit(CentralEvent::CharacteristicNotified {
                peripheral: *peripheral,
                service,
                characteristic,
                data,
            })
            .await;
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        _peripheral: &PeripheralId,
        _service: Uuid,
        _characteristic: Uuid,
    ) -> Result<(), AdapterError> {
        self.begin(Op::Subscribe).await
    }
}

fn characteristic(uuid: Uuid, properties: &[CharacteristicProperty]) -> NativeCharacteristic {
    NativeCharacteristic::new(uuid, properties.iter().copied())
}

pub fn service(uuid: Uuid, characteristics: Vec<NativeCharacteristic>) -> DiscoveredService {
    DiscoveredService {
        service: NativeService { uuid },
        characteristics,
    }
}

/// GATT table of a shade.
pub fn shade_gatt() -> Vec<DiscoveredService> {
    use CharacteristicProperty::{Notify, Read, Write};
    vec![
        service(
            BATTERY_SERVICE,
            vec![characteristic(BATTERY_LEVEL, &[Read, Notify])],
        ),
        service(
            MOTOR_SERVICE,
            vec![
                characteristic(POSITION, &[Read, Notify]),
                characteristic(TARGET_POSITION, &[Read, Write]),
                characteristic(MOTOR_CONTROL, &[Write]),
                characteristic(TRIGGER_CONTROL, &[Write]),
                characteristic(TRIGGER_RESPONSE, &[Notify]),
            ],
        ),
        service(
            SHADE_SERVICE,
            vec![
                characteristic(CONFIGURATION, &[Write]),
                characteristic(CONFIGURATION_RESPONSE, &[Notify]),
                characteristic(NAME, &[Read, Write]),
            ],
        ),
        service(
            TIME_SERVICE,
            vec![
                characteristic(CURRENT_TIME, &[Read, Write]),
                characteristic(UTC_OFFSET, &[Read, Write]),
            ],
        ),
    ]
}

pub fn native(id: PeripheralId, rssi: i16) -> NativePeripheral {
    NativePeripheral {
        id,
        address: None,
        local_name: Some("Shade".into()),
        manufacturer_data: Some(vec![0x71, 0x03, 2, 87, 40, 60, b'S', b'h', b'a', b'd', b'e', 0]),
        rssi,
        connectable: true,
    }
}

/// Let spawned tasks drain their queues. Time is paused in these tests, so
/// this only advances the clock by a millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn quiet_config() -> ClientConfig {
    ClientConfig::default()
        .with_timeout(Duration::from_secs(2))
        .with_idle_duration(Duration::from_secs(3600))
}

pub async fn start(config: ClientConfig) -> (Arc<MockAdapter>, Client) {
    let _ = pretty_env_logger::try_init();
    let (sender, receiver) = mpsc::channel(256);
    let adapter = Arc::new(MockAdapter::new(sender));
    let client = Client::new(adapter.clone(), receiver, config).await.unwrap();
    (adapter, client)
}

/// Start a client with a shade already discovered.
pub async fn start_with_shade(config: ClientConfig) -> (Arc<MockAdapter>, Client) {
    let (adapter, client) = start(config).await;
    adapter.discover(native(SHADE_ID, -60)).await;
    (adapter, client)
}

/// Everything currently queued on a broadcast receiver.
pub fn drain<T: Clone>(events: &mut broadcast::Receiver<T>) -> Vec<T> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
