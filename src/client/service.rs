use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use crate::api::{NativeCharacteristic, NativeService};
use crate::definitions::{CharacteristicDefinition, ServiceDefinition, registry};

/// Per-peripheral state of one characteristic. The native handle is only
/// valid for the connection it was discovered on.
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicDelegate {
    definition: Arc<CharacteristicDefinition>,
    handle: Option<NativeCharacteristic>,
    subscribed: bool,
}

impl CharacteristicDelegate {
    fn new(definition: Arc<CharacteristicDefinition>) -> Self {
        CharacteristicDelegate {
            definition,
            handle: None,
            subscribed: false,
        }
    }

    pub fn definition(&self) -> &Arc<CharacteristicDefinition> {
        &self.definition
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn uuid(&self) -> Uuid {
        self.definition.uuid
    }

    pub fn handle(&self) -> Option<&NativeCharacteristic> {
        self.handle.as_ref()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub(crate) fn bind(&mut self, handle: NativeCharacteristic) {
        self.handle = Some(handle);
    }

    pub(crate) fn set_subscribed(&mut self, subscribed: bool) {
        self.subscribed = subscribed && self.handle.is_some();
    }

    fn unbind(&mut self) {
        self.handle = None;
        self.subscribed = false;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDelegate {
    definition: Arc<ServiceDefinition>,
    handle: Option<NativeService>,
    characteristics: BTreeMap<String, CharacteristicDelegate>,
}

impl ServiceDelegate {
    pub(crate) fn new(definition: Arc<ServiceDefinition>) -> Self {
        let characteristics = definition
            .characteristics
            .iter()
            .map(|c| (c.key.clone(), CharacteristicDelegate::new(c.clone())))
            .collect();
        ServiceDelegate {
            definition,
            handle: None,
            characteristics,
        }
    }

    pub fn definition(&self) -> &Arc<ServiceDefinition> {
        &self.definition
    }

    pub fn key(&self) -> &str {
        &self.definition.key
    }

    pub fn uuid(&self) -> Uuid {
        self.definition.uuid
    }

    pub fn handle(&self) -> Option<&NativeService> {
        self.handle.as_ref()
    }

    pub fn characteristic(&self, key: &str) -> Option<&CharacteristicDelegate> {
        self.characteristics.get(key)
    }

    pub fn characteristics(&self) -> impl Iterator<Item = &CharacteristicDelegate> {
        self.characteristics.values()
    }

    pub(crate) fn characteristic_mut(&mut self, key: &str) -> Option<&mut CharacteristicDelegate> {
        self.characteristics.get_mut(key)
    }

    pub(crate) fn characteristic_by_uuid(&self, uuid: &Uuid) -> Option<&CharacteristicDelegate> {
        self.characteristics.values().find(|c| c.uuid() == *uuid)
    }

    pub(crate) fn bind(&mut self, handle: NativeService) {
        self.handle = Some(handle);
    }

    /// Bind a discovered characteristic, creating a delegate for UUIDs the
    /// service definition does not list.
    pub(crate) fn bind_characteristic(
        &mut self,
        handle: NativeCharacteristic,
    ) -> Arc<CharacteristicDefinition> {
        if let Some(existing) = self
            .characteristics
            .values_mut()
            .find(|c| c.uuid() == handle.uuid)
        {
            existing.bind(handle);
            return existing.definition.clone();
        }

        let definition = registry().characteristic_or_unknown(&handle.uuid);
        let mut delegate = CharacteristicDelegate::new(definition.clone());
        delegate.bind(handle);
        self.characteristics.insert(definition.key.clone(), delegate);
        definition
    }

    /// Drop every native handle; they are rediscovered after reconnecting.
    pub(crate) fn unbind(&mut self) {
        self.handle = None;
        self.characteristics
            .values_mut()
            .for_each(CharacteristicDelegate::unbind);
    }
}
