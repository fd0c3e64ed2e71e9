//! The engine's entry point.
//!
//! A [`Client`] owns the adapter handle. It tracks whether the adapter is
//! usable, runs the scan state machine, turns raw discoveries into
//! [`DeviceFound`] events and keeps exactly one [`Peripheral`] per device.
//! Native events arrive on the `mpsc` channel handed to [`Client::new`].

pub mod event;
pub mod peripheral;
pub mod request;
pub mod retry;
pub mod scan;
pub mod service;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::Stream;
use log::{debug, info, trace, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, watch};

use crate::api::{Adapter, CentralEvent, NativePeripheral, PeripheralId};
use crate::config::ClientConfig;
use crate::{Error, Result};

pub use event::{ClientEvent, DeviceFound, Manufacturer, Notification, Origin, PeripheralEvent};
pub use peripheral::{ConnectionState, Peripheral, ReadAll, Reading};
pub use request::{Payload, Request, Response, Target};
pub use retry::{RetryPolicy, retry};
pub use scan::ScanState;
pub use service::{CharacteristicDelegate, ServiceDelegate};

use request::{Dispatcher, EventSink};
use scan::ScanController;

struct Inner {
    adapter: Arc<dyn Adapter>,
    config: ClientConfig,
    enabled: watch::Sender<bool>,
    dispatcher: Dispatcher,
    events: broadcast::Sender<ClientEvent>,
    scan: Mutex<ScanController>,
    peripherals: Mutex<HashMap<PeripheralId, Peripheral>>,
    discovered: Mutex<HashMap<PeripheralId, NativePeripheral>>,
}

#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Client {
    /// Query the adapter's power state and start consuming `events`.
    pub async fn new(
        adapter: Arc<dyn Adapter>,
        events: mpsc::Receiver<CentralEvent>,
        config: ClientConfig,
    ) -> Result<Client> {
        let state = adapter.state().await?;
        info!("adapter state {state:?}");

        let (enabled, enabled_rx) = watch::channel(state.is_powered_on());
        let (sender, _) = broadcast::channel(config.event_capacity);
        let client = Client {
            inner: Arc::new(Inner {
                adapter,
                config,
                enabled,
                dispatcher: Dispatcher::new(enabled_rx, EventSink::Client(sender.clone())),
                events: sender,
                scan: Mutex::new(ScanController::new()),
                peripherals: Mutex::new(HashMap::new()),
                discovered: Mutex::new(HashMap::new()),
            }),
        };

        tokio::spawn(run_events(Arc::downgrade(&client.inner), events));
        Ok(client)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn is_enabled(&self) -> bool {
        *self.inner.enabled.borrow()
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    /// Discoveries that passed the connectable, RSSI and duplicate filters.
    pub fn devices(&self) -> impl Stream<Item = DeviceFound> + Send + 'static {
        futures::stream::unfold(self.events(), |mut events| async move {
            loop {
                match events.recv().await {
                    Ok(ClientEvent::DeviceFound(device)) => return Some((device, events)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("device stream skipped {skipped} events");
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        })
    }

    /// The delegate for a discovered peripheral. Repeated calls return
    /// handles to the same delegate until it is released.
    pub fn peripheral(&self, id: &PeripheralId) -> Result<Peripheral> {
        let mut peripherals = lock(&self.inner.peripherals);
        if let Some(existing) = peripherals.get(id) {
            return Ok(existing.clone());
        }

        let native = lock(&self.inner.discovered)
            .get(id)
            .cloned()
            .ok_or(Error::UnknownPeripheral(*id))?;
        debug!("creating delegate for {id}");
        let peripheral = Peripheral::new(
            native,
            self.inner.adapter.clone(),
            self.inner.config.clone(),
            self.inner.enabled.subscribe(),
        );
        peripherals.insert(*id, peripheral.clone());
        Ok(peripheral)
    }

    /// Disconnect and forget the delegate for `id`.
    pub async fn release(&self, id: &PeripheralId) -> Result<()> {
        let released = lock(&self.inner.peripherals).remove(id);
        match released {
            Some(peripheral) => peripheral.release().await,
            None => Ok(()),
        }
    }

    fn registered(&self, id: &PeripheralId) -> Option<Peripheral> {
        lock(&self.inner.peripherals).get(id).cloned()
    }

    fn emit(&self, event: ClientEvent) {
        let _ = self.inner.events.send(event);
    }

    fn handle_event(&self, event: CentralEvent) {
        trace!("adapter event {event:?}");
        match event {
            CentralEvent::StateUpdate { state } => self.on_state(state.is_powered_on()),
            CentralEvent::ScanStarted => {
                let origin = self.scan().on_native_started();
                self.emit(ClientEvent::ScanStarted { origin });
            }
            CentralEvent::ScanStopped => {
                let (origin, restart) = self.scan().on_native_stopped();
                self.emit(ClientEvent::ScanStopped { origin });
                if restart {
                    self.schedule_restart(self.inner.config.scan_restart_grace);
                }
            }
            CentralEvent::DeviceDiscovered { peripheral } => self.on_discovered(peripheral),
            CentralEvent::DeviceConnected {
                peripheral,
                address,
                rssi,
            } => match self.registered(&peripheral) {
                Some(delegate) => delegate.on_connected(address, rssi),
                None => trace!("connect from unmanaged peripheral {peripheral}"),
            },
            CentralEvent::DeviceDisconnected { peripheral } => {
                if let Some(delegate) = self.registered(&peripheral) {
                    delegate.on_disconnected();
                }
            }
            CentralEvent::CharacteristicNotified {
                peripheral,
                service,
                characteristic,
                data,
            } => {
                if let Some(delegate) = self.registered(&peripheral) {
                    delegate.on_notification(service, characteristic, data);
                }
            }
        }
    }

    fn on_state(&self, enabled: bool) {
        let changed = self.inner.enabled.send_if_modified(|current| {
            if *current == enabled {
                return false;
            }
            *current = enabled;
            true
        });
        if !changed {
            return;
        }

        if enabled {
            info!("adapter enabled");
            self.emit(ClientEvent::Enabled);
            if self.scan().wants_restart() {
                self.schedule_restart(Duration::ZERO);
            }
        } else {
            info!("adapter disabled");
            self.scan().on_disabled();
            self.emit(ClientEvent::Disabled);
        }
    }

    fn on_discovered(&self, peripheral: NativePeripheral) {
        lock(&self.inner.discovered).insert(peripheral.id, peripheral.clone());
        if let Some(delegate) = self.registered(&peripheral.id) {
            delegate.attach(peripheral.clone());
        }

        if !peripheral.connectable {
            trace!("{} not connectable", peripheral.id);
            return;
        }
        if peripheral.rssi < self.inner.config.min_rssi {
            trace!(
                "{} below rssi floor ({} < {})",
                peripheral.id, peripheral.rssi, self.inner.config.min_rssi
            );
            return;
        }
        if !self.scan().should_report(peripheral.id) {
            return;
        }
        self.emit(ClientEvent::DeviceFound(DeviceFound::from(peripheral)));
    }
}

async fn run_events(client: Weak<Inner>, mut events: mpsc::Receiver<CentralEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = client.upgrade() else {
            break;
        };
        Client { inner }.handle_event(event);
    }
    debug!("adapter event loop finished");
}
