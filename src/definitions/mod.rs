//! Immutable registry of service and characteristic definitions.
//!
//! Built once from the bundled catalogue. Per-peripheral mutable state lives in
//! the client delegates and only refers to these definitions.

pub mod catalogue;
mod value;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use uuid::Uuid;

use crate::codec;

pub use catalogue::CATALOGUE_VERSION;
pub use value::{Decoder, Encoding, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicDefinition {
    pub uuid: Uuid,
    pub name: String,
    pub key: String,
    pub decoder: Decoder,
    pub encoding: Option<Encoding>,
}

impl CharacteristicDefinition {
    /// Definition for a characteristic the catalogue does not know. Values
    /// are surfaced as hex and written raw.
    pub fn unknown(uuid: Uuid) -> Self {
        let name = codec::compact_uuid(&uuid);
        CharacteristicDefinition {
            uuid,
            key: name.clone(),
            name,
            decoder: Decoder::Hex,
            encoding: Some(Encoding::Raw),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDefinition {
    pub uuid: Uuid,
    pub name: String,
    pub key: String,
    pub characteristics: Vec<Arc<CharacteristicDefinition>>,
}

impl ServiceDefinition {
    pub fn unknown(uuid: Uuid) -> Self {
        let name = codec::compact_uuid(&uuid);
        ServiceDefinition {
            uuid,
            key: name.clone(),
            name,
            characteristics: Vec::new(),
        }
    }

    pub fn characteristic(&self, key: &str) -> Option<&Arc<CharacteristicDefinition>> {
        self.characteristics.iter().find(|c| c.key == key)
    }

    pub fn characteristic_by_uuid(&self, uuid: &Uuid) -> Option<&Arc<CharacteristicDefinition>> {
        self.characteristics.iter().find(|c| c.uuid == *uuid)
    }
}

#[derive(Debug)]
pub struct Registry {
    services: Vec<Arc<ServiceDefinition>>,
    by_uuid: HashMap<Uuid, Arc<ServiceDefinition>>,
    by_key: HashMap<String, Arc<ServiceDefinition>>,
    characteristics: HashMap<Uuid, Arc<CharacteristicDefinition>>,
}

static REGISTRY: LazyLock<Registry> = LazyLock::new(|| Registry::build(catalogue::SERVICES));

pub fn registry() -> &'static Registry {
    &REGISTRY
}

impl Registry {
    fn build(entries: &[catalogue::ServiceEntry]) -> Self {
        let mut registry = Registry {
            services: Vec::with_capacity(entries.len()),
            by_uuid: HashMap::new(),
            by_key: HashMap::new(),
            characteristics: HashMap::new(),
        };

        for entry in entries {
            let characteristics: Vec<_> = entry
                .characteristics
                .iter()
                .map(|c| {
                    Arc::new(CharacteristicDefinition {
                        uuid: c.uuid,
                        name: c.name.to_string(),
                        key: codec::to_key(c.name),
                        decoder: c.decoder,
                        encoding: c.encoding,
                    })
                })
                .collect();

            for characteristic in &characteristics {
                registry
                    .characteristics
                    .entry(characteristic.uuid)
                    .or_insert_with(|| characteristic.clone());
            }

            let service = Arc::new(ServiceDefinition {
                uuid: entry.uuid,
                name: entry.name.to_string(),
                key: codec::to_key(entry.name),
                characteristics,
            });
            registry.by_uuid.insert(service.uuid, service.clone());
            registry.by_key.insert(service.key.clone(), service.clone());
            registry.services.push(service);
        }

        registry
    }

    pub fn services(&self) -> &[Arc<ServiceDefinition>] {
        &self.services
    }

    pub fn service(&self, key: &str) -> Option<&Arc<ServiceDefinition>> {
        self.by_key.get(key)
    }

    pub fn service_by_uuid(&self, uuid: &Uuid) -> Option<&Arc<ServiceDefinition>> {
        self.by_uuid.get(uuid)
    }

    /// Known definition for `uuid` in any service, or a hex fallback.
    pub fn characteristic_or_unknown(&self, uuid: &Uuid) -> Arc<CharacteristicDefinition> {
        self.characteristics
            .get(uuid)
            .cloned()
            .unwrap_or_else(|| Arc::new(CharacteristicDefinition::unknown(*uuid)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::uuid_from_u16;

    #[test]
    fn keys_are_derived_from_names() {
        let battery = registry().service("battery").unwrap();
        assert_eq!(battery.uuid, uuid_from_u16(0x180f));
        let level = battery.characteristic("battery_level").unwrap();
        assert_eq!(level.decoder, Decoder::Percent);

        let motor = registry().service("motor").unwrap();
        assert!(motor.characteristic("target_position").is_some());
        assert!(motor.characteristic("trigger_response").is_some());
    }

    #[test]
    fn lookup_by_uuid() {
        let info = registry().service_by_uuid(&uuid_from_u16(0x180a)).unwrap();
        assert_eq!(info.key, "device_information");
        assert!(info.characteristic_by_uuid(&uuid_from_u16(0x2a29)).is_some());
    }

    #[test]
    fn every_key_is_unique_within_its_service() {
        for service in registry().services() {
            let mut keys: Vec<_> = service.characteristics.iter().map(|c| &c.key).collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), service.characteristics.len(), "{}", service.name);
        }
    }

    #[test]
    fn unknown_falls_back_to_hex() {
        let uuid = Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0);
        let definition = registry().characteristic_or_unknown(&uuid);
        assert_eq!(definition.key, "123456789abcdef0123456789abcdef0");
        assert_eq!(definition.decoder, Decoder::Hex);

        let known = registry().characteristic_or_unknown(&uuid_from_u16(0x2a19));
        assert_eq!(known.key, "battery_level");
    }
}
