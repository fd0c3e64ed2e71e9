//! One physical device across reconnects.
//!
//! Every public operation ensures a connection, lazily discovers the service
//! and characteristic it needs, and runs each step as a request through the
//! dispatcher. Failures classified as transient are retried from the top,
//! reconnect and rediscovery included.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::Stream;
use log::{debug, trace, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::api::{
    Adapter, CharacteristicWriteType, NativeCharacteristic, NativePeripheral, PeripheralId,
};
use crate::client::event::{Notification, PeripheralEvent};
use crate::client::request::{Dispatcher, EventSink, Target};
use crate::client::retry::{RetryPolicy, retry};
use crate::client::service::ServiceDelegate;
use crate::config::ClientConfig;
use crate::definitions::{CharacteristicDefinition, ServiceDefinition, Value, registry};
use crate::error::{AdapterError, BleError, Capability};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Value read from a characteristic.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub data: Vec<u8>,
    pub value: Value,
}

/// Decoded values keyed by service key, then characteristic key.
pub type ReadAll = BTreeMap<String, BTreeMap<String, Value>>;

struct IdleTimer {
    generation: u64,
    handle: AbortHandle,
}

struct State {
    native: NativePeripheral,
    address: Option<String>,
    connection: ConnectionState,
    /// Zero keeps the link up and reconnects whenever it drops.
    idle: Duration,
    /// Set by an application disconnect; suppresses the continuous reconnect.
    stay_disconnected: bool,
    released: bool,
    idle_timer: Option<IdleTimer>,
    timer_generation: u64,
    services: BTreeMap<String, ServiceDelegate>,
}

struct Inner {
    id: PeripheralId,
    adapter: Arc<dyn Adapter>,
    config: ClientConfig,
    dispatcher: Dispatcher,
    events: broadcast::Sender<PeripheralEvent>,
    disconnects: watch::Sender<u64>,
    connect_gate: tokio::sync::Mutex<()>,
    state: Mutex<State>,
}

/// Handle to a peripheral delegate. Clones share the same delegate.
#[derive(Clone)]
pub struct Peripheral {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Peripheral {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peripheral")
            .field("id", &self.inner.id)
            .field("connection", &self.connection_state())
            .finish()
    }
}

impl Peripheral {
    pub(crate) fn new(
        native: NativePeripheral,
        adapter: Arc<dyn Adapter>,
        config: ClientConfig,
        enabled: watch::Receiver<bool>,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity);
        let (disconnects, _) = watch::channel(0);
        let services = registry()
            .services()
            .iter()
            .map(|definition| (definition.key.clone(), ServiceDelegate::new(definition.clone())))
            .collect();

        let state = State {
            address: native.address.clone(),
            native,
            connection: ConnectionState::Disconnected,
            idle: config.idle_duration,
            stay_disconnected: false,
            released: false,
            idle_timer: None,
            timer_generation: 0,
            services,
        };

        Peripheral {
            inner: Arc::new(Inner {
                id: state.native.id,
                adapter,
                dispatcher: Dispatcher::new(enabled, EventSink::Peripheral(events.clone())),
                config,
                events,
                disconnects,
                connect_gate: tokio::sync::Mutex::new(()),
                state: Mutex::new(state),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> PeripheralId {
        self.inner.id
    }

    pub fn address(&self) -> Option<String> {
        self.state().address.clone()
    }

    pub fn local_name(&self) -> Option<String> {
        self.state().native.local_name.clone()
    }

    /// Latest native handle seen for this peripheral.
    pub fn native(&self) -> NativePeripheral {
        self.state().native.clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.state().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn events(&self) -> broadcast::Receiver<PeripheralEvent> {
        self.inner.events.subscribe()
    }

    pub fn notifications(&self) -> impl Stream<Item = Notification> + Send + 'static {
        futures::stream::unfold(self.events(), |mut events| async move {
            loop {
                match events.recv().await {
                    Ok(PeripheralEvent::Notification(notification)) => {
                        return Some((notification, events));
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("notification stream skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }

    /// Snapshot of one service delegate.
    pub fn service(&self, key: &str) -> Option<ServiceDelegate> {
        self.state().services.get(key).cloned()
    }

    pub fn services(&self) -> Vec<ServiceDelegate> {
        self.state().services.values().cloned().collect()
    }

    /// Swap in a fresh native handle from a later discovery. Outstanding
    /// requests keep running; events are routed by identifier.
    pub(crate) fn attach(&self, native: NativePeripheral) {
        let mut state = self.state();
        if state.address.is_none() {
            state.address = native.address.clone();
        }
        state.native = native;
    }

    fn target(&self) -> Target {
        Target::peripheral(self.inner.id)
    }

    fn disconnect_guard(&self) -> Option<watch::Receiver<u64>> {
        Some(self.inner.disconnects.subscribe())
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.inner.config.retry_budget)
    }

    fn report<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(error) = &result {
            if error.is_ble() {
                debug!("{} {operation} failed: {error}", self.inner.id);
            } else {
                warn!("{} {operation} failed: {error}", self.inner.id);
            }
            let _ = self.inner.events.send(PeripheralEvent::Error {
                operation: operation.to_string(),
                error: error.clone(),
            });
        }
        result
    }

    /// Connect if needed. `idle` replaces the idle-disconnect duration;
    /// `None` keeps the current one. A zero duration keeps the link up.
    pub async fn connect(&self, idle: Option<Duration>) -> Result<()> {
        let result = self.connect_inner(idle).await;
        self.report("connect", result)
    }

    async fn connect_inner(&self, idle: Option<Duration>) -> Result<()> {
        let _gate = self.inner.connect_gate.lock().await;

        let idle = {
            let mut state = self.state();
            if let Some(idle) = idle {
                state.idle = idle;
            }
            state.stay_disconnected = false;
            if state.connection == ConnectionState::Connected {
                let idle = state.idle;
                drop(state);
                self.arm_idle_timer(idle);
                return Ok(());
            }
            state.connection = ConnectionState::Connecting;
            state.idle
        };

        let result = self
            .inner
            .dispatcher
            .execute(
                "connect",
                self.target(),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner.adapter.connect(&self.inner.id),
            )
            .await;

        match result {
            Ok(_) => {
                self.state().connection = ConnectionState::Connected;
                self.arm_idle_timer(idle);
                Ok(())
            }
            Err(error) => {
                if matches!(error, Error::Ble(BleError::Timeout { .. })) {
                    self.cancel_connect().await;
                }
                let mut state = self.state();
                if state.connection == ConnectionState::Connecting {
                    state.connection = ConnectionState::Disconnected;
                }
                Err(error)
            }
        }
    }

    async fn cancel_connect(&self) {
        let cancel = self.inner.adapter.cancel_connect(&self.inner.id);
        match tokio::time::timeout(self.inner.config.timeout, cancel).await {
            Ok(Ok(())) => debug!("{} connect attempt cancelled", self.inner.id),
            Ok(Err(AdapterError::Unsupported)) => {
                trace!("{} connect cancel unsupported, attempt left running", self.inner.id)
            }
            Ok(Err(error)) => debug!("{} connect cancel failed: {error}", self.inner.id),
            Err(_) => debug!("{} connect cancel timed out", self.inner.id),
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        let result = self.disconnect_inner().await;
        self.report("disconnect", result)
    }

    async fn disconnect_inner(&self) -> Result<()> {
        {
            let mut state = self.state();
            state.stay_disconnected = true;
            cancel_idle_timer(&mut state);
            if state.connection != ConnectionState::Connected {
                state.services.values_mut().for_each(ServiceDelegate::unbind);
                return Ok(());
            }
            state.connection = ConnectionState::Disconnecting;
        }

        // no disconnect guard: this request's own completion emits one
        let result = self
            .inner
            .dispatcher
            .execute(
                "disconnect",
                self.target(),
                self.inner.config.timeout,
                None,
                self.inner.adapter.disconnect(&self.inner.id),
            )
            .await;

        let mut state = self.state();
        match result {
            Ok(_) => {
                if state.connection == ConnectionState::Disconnecting {
                    state.connection = ConnectionState::Disconnected;
                }
                state.services.values_mut().for_each(ServiceDelegate::unbind);
                Ok(())
            }
            Err(error) => {
                if state.connection == ConnectionState::Disconnecting {
                    state.connection = ConnectionState::Connected;
                }
                Err(error)
            }
        }
    }

    /// Disconnect for good; the client forgets this delegate.
    pub(crate) async fn release(&self) -> Result<()> {
        self.state().released = true;
        self.disconnect().await
    }

    fn arm_idle_timer(&self, idle: Duration) {
        let mut state = self.state();
        cancel_idle_timer(&mut state);
        if idle.is_zero() {
            return;
        }

        state.timer_generation += 1;
        let generation = state.timer_generation;
        let peripheral = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            idle_expired(peripheral, generation).await;
        });
        state.idle_timer = Some(IdleTimer {
            generation,
            handle: task.abort_handle(),
        });
    }

    pub(crate) fn on_connected(&self, address: Option<String>, rssi: Option<i16>) {
        let idle = {
            let mut state = self.state();
            if state.address.is_none() {
                state.address = address;
            }
            if state.connection == ConnectionState::Disconnecting {
                trace!("{} late connect report ignored", self.inner.id);
                return;
            }
            state.connection = ConnectionState::Connected;
            state.idle
        };
        debug!("{} connected (rssi {rssi:?})", self.inner.id);
        let _ = self.inner.events.send(PeripheralEvent::Connected { rssi });
        self.arm_idle_timer(idle);
    }

    pub(crate) fn on_disconnected(&self) {
        let reconnect = {
            let mut state = self.state();
            cancel_idle_timer(&mut state);
            state.connection = ConnectionState::Disconnected;
            state.services.values_mut().for_each(ServiceDelegate::unbind);
            state.idle.is_zero() && !state.stay_disconnected && !state.released
        };
        debug!("{} disconnected", self.inner.id);
        self.inner.disconnects.send_modify(|epoch| *epoch += 1);
        let _ = self.inner.events.send(PeripheralEvent::Disconnected);

        if reconnect {
            let peripheral = self.clone();
            tokio::spawn(async move {
                let result = retry(peripheral.retry_policy(), "reconnect", |_| {
                    peripheral.connect(None)
                })
                .await;
                if let Err(error) = result {
                    warn!("{} continuous reconnect failed: {error}", peripheral.id());
                }
            });
        }
    }

    pub(crate) fn on_notification(&self, service: Uuid, characteristic: Uuid, data: Vec<u8>) {
        let listener = {
            let state = self.state();
            state
                .services
                .values()
                .filter(|s| s.uuid() == service)
                .find_map(|s| {
                    s.characteristic_by_uuid(&characteristic)
                        .filter(|c| c.is_subscribed())
                        .map(|c| (s.key().to_string(), c.definition().clone()))
                })
        };

        let Some((service_key, definition)) = listener else {
            trace!("{} dropping notification for {characteristic}", self.inner.id);
            return;
        };

        let value = match definition.decoder.decode(&data) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!("{} {service_key}.{} notification: {error}", self.inner.id, definition.key);
                None
            }
        };
        let _ = self.inner.events.send(PeripheralEvent::Notification(Notification {
            service: service_key,
            characteristic: definition.key.clone(),
            data,
            value,
        }));
    }

    fn definitions(
        &self,
        service: &str,
        characteristic: &str,
    ) -> Result<(Arc<ServiceDefinition>, Arc<CharacteristicDefinition>)> {
        let state = self.state();
        let delegate = state
            .services
            .get(service)
            .ok_or_else(|| Error::UnknownService(service.to_string()))?;
        let found = delegate
            .characteristic(characteristic)
            .ok_or_else(|| Error::UnknownCharacteristic {
                service: service.to_string(),
                characteristic: characteristic.to_string(),
            })?;
        Ok((delegate.definition().clone(), found.definition().clone()))
    }

    async fn ensure_service(&self, key: &str) -> Result<Arc<ServiceDefinition>> {
        let definition = {
            let state = self.state();
            let delegate = state
                .services
                .get(key)
                .ok_or_else(|| Error::UnknownService(key.to_string()))?;
            if delegate.handle().is_some() {
                return Ok(delegate.definition().clone());
            }
            delegate.definition().clone()
        };

        let (found, _) = self
            .inner
            .dispatcher
            .execute(
                format!("discover {key}"),
                Target::service(self.inner.id, definition.clone()),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner
                    .adapter
                    .discover_services(&self.inner.id, &[definition.uuid]),
            )
            .await?;

        let native = found
            .into_iter()
            .find(|s| s.uuid == definition.uuid)
            .ok_or_else(|| Error::UnknownService(key.to_string()))?;
        if let Some(delegate) = self.state().services.get_mut(key) {
            delegate.bind(native);
        }
        Ok(definition)
    }

    async fn ensure_characteristic(
        &self,
        service: &str,
        characteristic: &str,
    ) -> Result<(Arc<ServiceDefinition>, Arc<CharacteristicDefinition>, NativeCharacteristic)> {
        let (_, definition) = self.definitions(service, characteristic)?;
        self.connect_inner(None).await?;
        let service_definition = self.ensure_service(service).await?;

        let bound = self
            .state()
            .services
            .get(service)
            .and_then(|s| s.characteristic(characteristic))
            .and_then(|c| c.handle().cloned());
        if let Some(handle) = bound {
            return Ok((service_definition, definition, handle));
        }

        let (found, _) = self
            .inner
            .dispatcher
            .execute(
                format!("discover {service}.{characteristic}"),
                Target::characteristic(
                    self.inner.id,
                    service_definition.clone(),
                    definition.clone(),
                ),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner.adapter.discover_characteristics(
                    &self.inner.id,
                    service_definition.uuid,
                    &[definition.uuid],
                ),
            )
            .await?;

        let handle = found
            .into_iter()
            .find(|c| c.uuid == definition.uuid)
            .ok_or_else(|| Error::UnknownCharacteristic {
                service: service.to_string(),
                characteristic: characteristic.to_string(),
            })?;
        if let Some(delegate) = self.state().services.get_mut(service) {
            delegate.bind_characteristic(handle.clone());
        }
        Ok((service_definition, definition, handle))
    }

    pub async fn read(&self, service: &str, characteristic: &str) -> Result<Reading> {
        let operation = format!("read {service}.{characteristic}");
        let result = retry(self.retry_policy(), &operation, |_| {
            self.read_once(service, characteristic)
        })
        .await;
        self.report(&operation, result)
    }

    async fn read_once(&self, service: &str, characteristic: &str) -> Result<Reading> {
        let (service_definition, definition, handle) =
            self.ensure_characteristic(service, characteristic).await?;
        if !handle.can_read() {
            return Err(Error::Unsupported {
                characteristic: characteristic.to_string(),
                capability: Capability::Read,
            });
        }

        let (data, response) = self
            .inner
            .dispatcher
            .execute(
                format!("read {service}.{characteristic}"),
                Target::characteristic(
                    self.inner.id,
                    service_definition.clone(),
                    definition.clone(),
                ),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner
                    .adapter
                    .read(&self.inner.id, service_definition.uuid, definition.uuid),
            )
            .await?;

        let value = response
            .value
            .unwrap_or_else(|| definition.decoder.decode(&data))?;
        Ok(Reading { data, value })
    }

    pub async fn write(
        &self,
        service: &str,
        characteristic: &str,
        data: &[u8],
        without_response: bool,
    ) -> Result<()> {
        let operation = format!("write {service}.{characteristic}");
        let result = retry(self.retry_policy(), &operation, |_| {
            self.write_once(service, characteristic, data, without_response)
        })
        .await;
        self.report(&operation, result)
    }

    /// Encode `value` with the characteristic's declared encoding and write it.
    pub async fn write_value(
        &self,
        service: &str,
        characteristic: &str,
        value: &Value,
    ) -> Result<()> {
        let encoded = self.definitions(service, characteristic).and_then(|(_, definition)| {
            let encoding = definition.encoding.ok_or_else(|| Error::Unsupported {
                characteristic: characteristic.to_string(),
                capability: Capability::Write,
            })?;
            encoding.encode(value)
        });
        let data = self.report(&format!("write {service}.{characteristic}"), encoded)?;
        self.write(service, characteristic, &data, false).await
    }

    async fn write_once(
        &self,
        service: &str,
        characteristic: &str,
        data: &[u8],
        without_response: bool,
    ) -> Result<()> {
        let (service_definition, definition, handle) =
            self.ensure_characteristic(service, characteristic).await?;

        let (supported, capability, write_type) = if without_response {
            (
                handle.can_write_without_response(),
                Capability::WriteWithoutResponse,
                CharacteristicWriteType::WriteWithoutResponse,
            )
        } else {
            (
                handle.can_write(),
                Capability::Write,
                CharacteristicWriteType::WriteWithResponse,
            )
        };
        if !supported {
            return Err(Error::Unsupported {
                characteristic: characteristic.to_string(),
                capability,
            });
        }

        self.inner
            .dispatcher
            .execute(
                format!("write {service}.{characteristic}"),
                Target::characteristic(
                    self.inner.id,
                    service_definition.clone(),
                    definition.clone(),
                ),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner.adapter.write(
                    &self.inner.id,
                    service_definition.uuid,
                    definition.uuid,
                    data,
                    write_type,
                ),
            )
            .await?;
        Ok(())
    }

    /// Enable notifications. Subscriptions do not survive a disconnect and
    /// must be renewed afterwards.
    pub async fn subscribe(&self, service: &str, characteristic: &str) -> Result<()> {
        let operation = format!("subscribe {service}.{characteristic}");
        let result = retry(self.retry_policy(), &operation, |_| {
            self.subscribe_once(service, characteristic)
        })
        .await;
        self.report(&operation, result)
    }

    async fn subscribe_once(&self, service: &str, characteristic: &str) -> Result<()> {
        let (service_definition, definition, handle) =
            self.ensure_characteristic(service, characteristic).await?;
        if !handle.can_notify() {
            return Err(Error::Unsupported {
                characteristic: characteristic.to_string(),
                capability: Capability::Notify,
            });
        }

        let subscribed = self
            .state()
            .services
            .get(service)
            .and_then(|s| s.characteristic(characteristic))
            .is_some_and(|c| c.is_subscribed());
        if subscribed {
            return Ok(());
        }

        self.inner
            .dispatcher
            .execute(
                format!("subscribe {service}.{characteristic}"),
                Target::characteristic(
                    self.inner.id,
                    service_definition.clone(),
                    definition.clone(),
                ),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner
                    .adapter
                    .subscribe(&self.inner.id, service_definition.uuid, definition.uuid),
            )
            .await?;

        if let Some(delegate) = self
            .state()
            .services
            .get_mut(service)
            .and_then(|s| s.characteristic_mut(characteristic))
        {
            delegate.set_subscribed(true);
        }
        Ok(())
    }

    /// Wait for the next notification from `service`.`characteristic`.
    pub async fn notification(&self, service: &str, characteristic: &str) -> Result<Notification> {
        let operation = format!("notification {service}.{characteristic}");
        let mut events = self.events();
        let result = match self.definitions(service, characteristic) {
            Ok(_) => self.next_notification(&mut events, service, characteristic).await,
            Err(error) => Err(error),
        };
        self.report(&operation, result)
    }

    async fn next_notification(
        &self,
        events: &mut broadcast::Receiver<PeripheralEvent>,
        service: &str,
        characteristic: &str,
    ) -> Result<Notification> {
        let description = format!("notification {service}.{characteristic}");
        let wait = async {
            loop {
                match events.recv().await {
                    Ok(PeripheralEvent::Notification(notification))
                        if notification.service == service
                            && notification.characteristic == characteristic =>
                    {
                        return Ok(notification);
                    }
                    Ok(PeripheralEvent::Disconnected) | Err(RecvError::Closed) => {
                        return Err(BleError::Disconnected {
                            request: description.clone(),
                        }
                        .into());
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("{} {description} skipped {skipped} events", self.inner.id);
                    }
                }
            }
        };

        let timeout = self.inner.config.notification_timeout;
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(BleError::Timeout {
                request: description,
                after: timeout,
            }
            .into()),
        }
    }

    /// Write a command frame and wait for the reply it triggers on `notify`.
    /// The listener is in place before the write goes out. A retry repeats
    /// the whole exchange, subscription included.
    pub async fn exchange(
        &self,
        service: &str,
        write: &str,
        notify: &str,
        frame: &[u8],
    ) -> Result<Notification> {
        let operation = format!("exchange {service}.{write}");
        let result = retry(self.retry_policy(), &operation, |_| {
            self.exchange_once(service, write, notify, frame)
        })
        .await;
        self.report(&operation, result)
    }

    async fn exchange_once(
        &self,
        service: &str,
        write: &str,
        notify: &str,
        frame: &[u8],
    ) -> Result<Notification> {
        self.subscribe_once(service, notify).await?;
        let mut events = self.events();
        self.write_once(service, write, frame, false).await?;
        self.next_notification(&mut events, service, notify).await
    }

    /// Discover everything in one pass and read every readable
    /// characteristic. Values that fail to decode are left out.
    pub async fn read_all(&self) -> Result<ReadAll> {
        let result = retry(self.retry_policy(), "read all", |_| self.read_all_once()).await;
        self.report("read all", result)
    }

    async fn read_all_once(&self) -> Result<ReadAll> {
        self.connect_inner(None).await?;
        let (discovered, _) = self
            .inner
            .dispatcher
            .execute(
                "discover all",
                self.target(),
                self.inner.config.timeout,
                self.disconnect_guard(),
                self.inner.adapter.discover_all(&self.inner.id),
            )
            .await?;

        let readable = {
            let mut state = self.state();
            let mut readable = Vec::new();
            for found in discovered {
                let key = service_key_for(&mut state.services, found.service.uuid);
                let Some(delegate) = state.services.get_mut(&key) else {
                    continue;
                };
                delegate.bind(found.service);
                for handle in found.characteristics {
                    let can_read = handle.can_read();
                    let definition = delegate.bind_characteristic(handle);
                    if can_read {
                        readable.push((delegate.definition().clone(), definition));
                    }
                }
            }
            readable
        };

        let mut values = ReadAll::new();
        for (service, characteristic) in readable {
            let (_, response) = self
                .inner
                .dispatcher
                .execute(
                    format!("read {}.{}", service.key, characteristic.key),
                    Target::characteristic(self.inner.id, service.clone(), characteristic.clone()),
                    self.inner.config.timeout,
                    self.disconnect_guard(),
                    self.inner
                        .adapter
                        .read(&self.inner.id, service.uuid, characteristic.uuid),
                )
                .await?;

            match response.value {
                Some(Ok(value)) => {
                    values
                        .entry(service.key.clone())
                        .or_default()
                        .insert(characteristic.key.clone(), value);
                }
                Some(Err(error)) => {
                    warn!(
                        "{} omitting {}.{}: {error}",
                        self.inner.id, service.key, characteristic.key
                    );
                }
                None => {}
            }
        }
        Ok(values)
    }
}

/// Key of the delegate for `uuid`, creating one for services met for the
/// first time during a full discovery.
fn service_key_for(services: &mut BTreeMap<String, ServiceDelegate>, uuid: Uuid) -> String {
    if let Some(existing) = services.values().find(|s| s.uuid() == uuid) {
        return existing.key().to_string();
    }
    let definition = registry()
        .service_by_uuid(&uuid)
        .cloned()
        .unwrap_or_else(|| Arc::new(ServiceDefinition::unknown(uuid)));
    let key = definition.key.clone();
    services.insert(key.clone(), ServiceDelegate::new(definition));
    key
}

fn cancel_idle_timer(state: &mut State) {
    if let Some(timer) = state.idle_timer.take() {
        timer.handle.abort();
    }
}

async fn idle_expired(peripheral: Weak<Inner>, generation: u64) {
    let Some(inner) = peripheral.upgrade() else {
        return;
    };
    let peripheral = Peripheral { inner };
    {
        let mut state = peripheral.state();
        let current = state
            .idle_timer
            .as_ref()
            .is_some_and(|timer| timer.generation == generation);
        if !current {
            return;
        }
        state.idle_timer = None;
    }

    debug!("{} idle, disconnecting", peripheral.id());
    if let Err(error) = peripheral.disconnect_inner().await {
        warn!("{} idle disconnect failed: {error}", peripheral.id());
    }
    // an idle drop is not an application disconnect
    peripheral.state().stay_disconnected = false;
}
