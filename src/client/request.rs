//! Request/response correlation for adapter primitives.
//!
//! Every primitive (scan, connect, discover, read, write, subscribe) runs
//! through [`Dispatcher::execute`], which numbers it, reports it to observers
//! and races it against its timeout, the adapter being disabled and, where it
//! applies, the peripheral disconnecting.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use log::{debug, trace};
use tokio::sync::{broadcast, watch};

use crate::Result;
use crate::api::{DiscoveredService, NativeCharacteristic, NativeService, PeripheralId};
use crate::client::event::{ClientEvent, PeripheralEvent};
use crate::codec;
use crate::definitions::{CharacteristicDefinition, ServiceDefinition, Value};
use crate::error::{AdapterError, BleError, DecodeError};

/// Delegates an operation is aimed at, outermost first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Target {
    pub peripheral: Option<PeripheralId>,
    pub service: Option<Arc<ServiceDefinition>>,
    pub characteristic: Option<Arc<CharacteristicDefinition>>,
}

impl Target {
    pub fn peripheral(id: PeripheralId) -> Self {
        Target {
            peripheral: Some(id),
            ..Target::default()
        }
    }

    pub fn service(id: PeripheralId, service: Arc<ServiceDefinition>) -> Self {
        Target {
            peripheral: Some(id),
            service: Some(service),
            characteristic: None,
        }
    }

    pub fn characteristic(
        id: PeripheralId,
        service: Arc<ServiceDefinition>,
        characteristic: Arc<CharacteristicDefinition>,
    ) -> Self {
        Target {
            peripheral: Some(id),
            service: Some(service),
            characteristic: Some(characteristic),
        }
    }
}

/// One in-flight operation. Identifiers increase per owner and are never reused.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u64,
    pub description: String,
    pub target: Target,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    Bytes(Vec<u8>),
    /// Discovery results, as compact UUID strings.
    List(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub request: Request,
    pub payload: Payload,
    /// Present when the payload is a buffer read from a known characteristic.
    pub value: Option<Result<Value, DecodeError>>,
}

pub(crate) trait IntoPayload {
    fn payload(&self) -> Payload;
}

impl IntoPayload for () {
    fn payload(&self) -> Payload {
        Payload::Empty
    }
}

impl IntoPayload for Vec<u8> {
    fn payload(&self) -> Payload {
        Payload::Bytes(self.clone())
    }
}

impl IntoPayload for Vec<NativeService> {
    fn payload(&self) -> Payload {
        Payload::List(self.iter().map(|s| codec::compact_uuid(&s.uuid)).collect())
    }
}

impl IntoPayload for Vec<NativeCharacteristic> {
    fn payload(&self) -> Payload {
        Payload::List(self.iter().map(|c| codec::compact_uuid(&c.uuid)).collect())
    }
}

impl IntoPayload for Vec<DiscoveredService> {
    fn payload(&self) -> Payload {
        Payload::List(
            self.iter()
                .map(|s| codec::compact_uuid(&s.service.uuid))
                .collect(),
        )
    }
}

/// Where request lifecycle events go. Peripheral scoped failures are left to
/// the calling operation so that a retried operation reports once.
pub(crate) enum EventSink {
    Client(broadcast::Sender<ClientEvent>),
    Peripheral(broadcast::Sender<PeripheralEvent>),
}

pub(crate) struct Dispatcher {
    sequence: AtomicU64,
    enabled: watch::Receiver<bool>,
    sink: EventSink,
}

impl Dispatcher {
    pub(crate) fn new(enabled: watch::Receiver<bool>, sink: EventSink) -> Self {
        Dispatcher {
            sequence: AtomicU64::new(0),
            enabled,
            sink,
        }
    }

    /// Run `operation` as a request. `disconnect` is the peripheral's
    /// disconnect epoch, or `None` when a disconnect must not abort it.
    pub(crate) async fn execute<O, F>(
        &self,
        description: impl Into<String>,
        target: Target,
        timeout: Duration,
        disconnect: Option<watch::Receiver<u64>>,
        operation: F,
    ) -> Result<(O, Response)>
    where
        O: IntoPayload,
        F: Future<Output = std::result::Result<O, AdapterError>>,
    {
        let description = description.into();
        let mut enabled = self.enabled.clone();
        if !*enabled.borrow_and_update() {
            debug!("{description} refused: adapter disabled");
            return Err(BleError::AdapterUnavailable.into());
        }

        let request = Request {
            id: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            description,
            target,
        };
        trace!("request #{} {}", request.id, request.description);
        self.emit_request(&request);

        let outcome: Result<O> = tokio::select! {
            result = tokio::time::timeout(timeout, operation) => match result {
                Ok(Ok(output)) => Ok(output),
                Ok(Err(error)) => Err(BleError::Adapter(error).into()),
                Err(_) => Err(BleError::Timeout {
                    request: request.description.clone(),
                    after: timeout,
                }
                .into()),
            },
            _ = disabled(&mut enabled) => Err(BleError::AdapterUnavailable.into()),
            _ = disconnected(disconnect) => Err(BleError::Disconnected {
                request: request.description.clone(),
            }
            .into()),
        };

        match outcome {
            Ok(output) => {
                let payload = output.payload();
                let value = match (&payload, &request.target.characteristic) {
                    (Payload::Bytes(data), Some(characteristic)) => {
                        Some(characteristic.decoder.decode(data))
                    }
                    _ => None,
                };
                let response = Response {
                    request,
                    payload,
                    value,
                };
                trace!("response #{} {}", response.request.id, response.request.description);
                self.emit_response(&response);
                Ok((output, response))
            }
            Err(error) => {
                debug!("request #{} {} failed: {error}", request.id, request.description);
                if let EventSink::Client(events) = &self.sink {
                    let _ = events.send(ClientEvent::Error { request, error: error.clone() });
                }
                Err(error)
            }
        }
    }

    fn emit_request(&self, request: &Request) {
        match &self.sink {
            EventSink::Client(events) => {
                let _ = events.send(ClientEvent::Request(request.clone()));
            }
            EventSink::Peripheral(events) => {
                let _ = events.send(PeripheralEvent::Request(request.clone()));
            }
        }
    }

    fn emit_response(&self, response: &Response) {
        match &self.sink {
            EventSink::Client(events) => {
                let _ = events.send(ClientEvent::Response(response.clone()));
            }
            EventSink::Peripheral(events) => {
                let _ = events.send(PeripheralEvent::Response(response.clone()));
            }
        }
    }
}

async fn disabled(enabled: &mut watch::Receiver<bool>) {
    if enabled.wait_for(|enabled| !*enabled).await.is_err() {
        // client dropped: nothing will ever disable us
        std::future::pending::<()>().await;
    }
}

async fn disconnected(epoch: Option<watch::Receiver<u64>>) {
    match epoch {
        Some(mut epoch) => {
            if epoch.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}
