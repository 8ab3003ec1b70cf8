use super::{
    att::{AttError, CLIENT_CHARACTERISTIC_CONFIGURATION, CLIENT_CONFIGURATION_NONE},
    properties::Properties,
};
use crate::uuid::BleUuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    /// Constant, read-only value.
    Static,
    /// In-memory value the remote client may overwrite.
    Mutable,
}

#[derive(Debug, Clone)]
pub struct Descriptor {
    pub uuid: BleUuid,
    properties: Properties,
    kind: DescriptorKind,
    value: Vec<u8>,
    owner: Option<u16>,
}

impl Descriptor {
    pub fn new_static(uuid: BleUuid, value: Vec<u8>) -> Self {
        Descriptor {
            uuid,
            properties: Properties::READ,
            kind: DescriptorKind::Static,
            value,
            owner: None,
        }
    }

    pub fn new_mutable(uuid: BleUuid, value: Vec<u8>) -> Self {
        Descriptor {
            uuid,
            properties: Properties::READ | Properties::WRITE | Properties::DYNAMIC,
            kind: DescriptorKind::Mutable,
            value,
            owner: None,
        }
    }

    /// Client characteristic configuration descriptor, starting disabled.
    pub fn client_configuration() -> Self {
        Descriptor::new_mutable(
            CLIENT_CHARACTERISTIC_CONFIGURATION,
            vec![CLIENT_CONFIGURATION_NONE, 0],
        )
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn set_value(&mut self, value: &[u8]) -> AttError {
        match self.kind {
            DescriptorKind::Static => {
                log::error!("Write routed to static descriptor {}", self.uuid);
                AttError::WriteNotPermitted
            }
            DescriptorKind::Mutable => {
                self.value = value.to_vec();
                AttError::Ok
            }
        }
    }

    /// Value handle of the owning characteristic, known once registered.
    pub fn owner(&self) -> Option<u16> {
        self.owner
    }

    pub(crate) fn set_owner(&mut self, characteristic_handle: u16) {
        self.owner = Some(characteristic_handle);
    }
}
