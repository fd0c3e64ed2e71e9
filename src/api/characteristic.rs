use std::collections::BTreeSet;

use uuid::Uuid;

/// Native characteristic handle as returned by discovery.
#[derive(Debug, Ord, Eq, PartialEq, PartialOrd, Clone)]
pub struct NativeCharacteristic {
    pub uuid: Uuid,
    pub properties: BTreeSet<CharacteristicProperty>,
}

impl NativeCharacteristic {
    pub fn new(uuid: Uuid, properties: impl IntoIterator<Item = CharacteristicProperty>) -> Self {
        NativeCharacteristic {
            uuid,
            properties: properties.into_iter().collect(),
        }
    }

    pub fn can_read(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Read)
    }

    pub fn can_write(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Write)
    }

    pub fn can_write_without_response(&self) -> bool {
        self.properties
            .contains(&CharacteristicProperty::WriteWithoutResponse)
    }

    pub fn can_notify(&self) -> bool {
        self.properties.contains(&CharacteristicProperty::Notify)
            || self.properties.contains(&CharacteristicProperty::Indicate)
    }
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq)]
pub enum CharacteristicProperty {
    Broadcast,
    Read,
    WriteWithoutResponse,
    Write,
    AuthenticatedSignedWrites,
    Notify,
    Indicate,
    ExtendedProperties,
}

#[derive(Debug, Clone, Copy, PartialOrd, Ord, Eq, PartialEq)]
pub enum CharacteristicWriteType {
    WriteWithoutResponse,
    WriteWithResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indicate_counts_as_notify() {
        let c = NativeCharacteristic::new(Uuid::nil(), [CharacteristicProperty::Indicate]);
        assert!(c.can_notify());
        assert!(!c.can_read());
        assert!(!c.can_write());
    }
}
