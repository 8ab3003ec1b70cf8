use super::{att::AttError, descriptor::Descriptor, properties::Properties};
use crate::{
    manager::subscription::{self, PushKind, PushSkipped, SubscriptionState},
    radio::RadioStack,
    uuid::BleUuid,
};
use std::{fmt, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacteristicKind {
    /// Constant, read-only value.
    Static,
    /// In-memory value the remote client may overwrite.
    Mutable,
    /// Pushes every new value out as an indication.
    Indicate,
    /// Pushes every new value out as a notification.
    Notify,
}

/// Handle assigned by the radio stack plus the stack that owns it.
#[derive(Clone)]
struct StackLink {
    handle: u16,
    stack: Arc<dyn RadioStack>,
}

/// A local characteristic.
///
/// A client configuration descriptor is created with the characteristic
/// if and only if its properties carry Notify or Indicate.
#[derive(Clone)]
pub struct Characteristic {
    pub uuid: BleUuid,
    properties: Properties,
    kind: CharacteristicKind,
    value: Vec<u8>,
    descriptors: Vec<Descriptor>,
    client_configuration: Option<Descriptor>,
    link: Option<StackLink>,
}

impl Characteristic {
    fn new(
        uuid: BleUuid,
        kind: CharacteristicKind,
        properties: Properties,
        value: Vec<u8>,
    ) -> Self {
        let client_configuration = properties
            .needs_client_configuration()
            .then(Descriptor::client_configuration);
        Characteristic {
            uuid,
            properties,
            kind,
            value,
            descriptors: Vec::new(),
            client_configuration,
            link: None,
        }
    }

    pub fn new_static(uuid: BleUuid, value: Vec<u8>, properties: Properties) -> Self {
        Characteristic::new(
            uuid,
            CharacteristicKind::Static,
            properties | Properties::READ,
            value,
        )
    }

    pub fn new_mutable(uuid: BleUuid, value: Vec<u8>, properties: Properties) -> Self {
        Characteristic::new(
            uuid,
            CharacteristicKind::Mutable,
            properties | Properties::READ | Properties::WRITE | Properties::DYNAMIC,
            value,
        )
    }

    pub fn new_indicate(uuid: BleUuid, value: Vec<u8>, properties: Properties) -> Self {
        Characteristic::new(
            uuid,
            CharacteristicKind::Indicate,
            properties | Properties::READ | Properties::INDICATE,
            value,
        )
    }

    pub fn new_notify(uuid: BleUuid, value: Vec<u8>, properties: Properties) -> Self {
        Characteristic::new(
            uuid,
            CharacteristicKind::Notify,
            properties | Properties::READ | Properties::NOTIFY,
            value,
        )
    }

    pub fn with_descriptor(mut self, descriptor: Descriptor) -> Self {
        self.add_descriptor(descriptor);
        self
    }

    pub fn add_descriptor(&mut self, mut descriptor: Descriptor) {
        if let Some(handle) = self.handle() {
            descriptor.set_owner(handle);
        }
        self.descriptors.push(descriptor);
    }

    pub fn properties(&self) -> Properties {
        self.properties
    }

    pub fn kind(&self) -> CharacteristicKind {
        self.kind
    }

    pub fn is_notify(&self) -> bool {
        self.properties.is_notify()
    }

    pub fn is_indicate(&self) -> bool {
        self.properties.is_indicate()
    }

    pub fn is_dynamic(&self) -> bool {
        self.properties.is_dynamic()
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    /// Stores `value`. Indicate and Notify characteristics then try to push
    /// it out; a skipped push still leaves the new value stored and the
    /// write reports `AttError::Ok`.
    pub fn set_value(&mut self, value: &[u8]) -> AttError {
        match self.kind {
            CharacteristicKind::Static => {
                log::error!(
                    "Write routed to static characteristic {} (handle {:?})",
                    self.uuid,
                    self.handle()
                );
                AttError::UnlikelyError
            }
            CharacteristicKind::Mutable => {
                self.value = value.to_vec();
                AttError::Ok
            }
            CharacteristicKind::Indicate => {
                self.value = value.to_vec();
                let _ = self.send_indicate();
                AttError::Ok
            }
            CharacteristicKind::Notify => {
                self.value = value.to_vec();
                let _ = self.send_notify();
                AttError::Ok
            }
        }
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    pub(crate) fn descriptor_mut(&mut self, index: usize) -> Option<&mut Descriptor> {
        self.descriptors.get_mut(index)
    }

    pub fn client_configuration(&self) -> Option<&Descriptor> {
        self.client_configuration.as_ref()
    }

    pub(crate) fn client_configuration_mut(&mut self) -> Option<&mut Descriptor> {
        self.client_configuration.as_mut()
    }

    /// Interpretation of the current client configuration bytes.
    pub fn subscription(&self) -> SubscriptionState {
        self.client_configuration
            .as_ref()
            .map(|descriptor| SubscriptionState::from_bytes(descriptor.value()))
            .unwrap_or(SubscriptionState::Disabled)
    }

    /// Value handle, `None` until the characteristic is registered.
    pub fn handle(&self) -> Option<u16> {
        self.link.as_ref().map(|link| link.handle)
    }

    pub(crate) fn stack(&self) -> Option<&dyn RadioStack> {
        self.link.as_ref().map(|link| link.stack.as_ref())
    }

    pub(crate) fn attach(&mut self, handle: u16, stack: Arc<dyn RadioStack>) {
        self.link = Some(StackLink { handle, stack });
        for descriptor in self.descriptors.iter_mut() {
            descriptor.set_owner(handle);
        }
        if let Some(descriptor) = self.client_configuration.as_mut() {
            descriptor.set_owner(handle);
        }
    }

    pub fn send_notify(&self) -> Result<(), PushSkipped> {
        subscription::push(self, PushKind::Notify)
    }

    pub fn send_indicate(&self) -> Result<(), PushSkipped> {
        subscription::push(self, PushKind::Indicate)
    }
}

impl fmt::Debug for Characteristic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Characteristic")
            .field("uuid", &self.uuid)
            .field("properties", &self.properties)
            .field("kind", &self.kind)
            .field("value", &self.value)
            .field("descriptors", &self.descriptors)
            .field("client_configuration", &self.client_configuration)
            .field("handle", &self.handle())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid() -> BleUuid {
        BleUuid::from_u128(0x6962cdc6_dcb1_465b_8aa4_23491caf4840)
    }

    #[test]
    fn client_configuration_follows_notify_and_indicate() {
        let empty = Properties::empty();
        assert!(Characteristic::new_static(uuid(), vec![0], empty)
            .client_configuration()
            .is_none());
        assert!(Characteristic::new_mutable(uuid(), vec![0], empty)
            .client_configuration()
            .is_none());
        assert!(Characteristic::new_indicate(uuid(), vec![0], empty)
            .client_configuration()
            .is_some());
        assert!(Characteristic::new_notify(uuid(), vec![0], empty)
            .client_configuration()
            .is_some());
        assert!(Characteristic::new_static(uuid(), vec![0], Properties::NOTIFY)
            .client_configuration()
            .is_some());
    }

    #[test]
    fn static_characteristic_keeps_its_value() {
        let mut characteristic = Characteristic::new_static(uuid(), vec![1, 2], Properties::empty());
        assert_eq!(characteristic.set_value(&[3]), AttError::UnlikelyError);
        assert_eq!(characteristic.value(), &[1, 2]);
    }

    #[test]
    fn writable_variants_store_exact_bytes() {
        let empty = Properties::empty();
        for mut characteristic in [
            Characteristic::new_mutable(uuid(), vec![0], empty),
            Characteristic::new_indicate(uuid(), vec![0], empty),
            Characteristic::new_notify(uuid(), vec![0], empty),
        ] {
            assert_eq!(characteristic.set_value(&[4, 5, 6]), AttError::Ok);
            assert_eq!(characteristic.value(), &[4, 5, 6]);
        }
    }

    #[test]
    fn unregistered_push_is_skipped() {
        let characteristic = Characteristic::new_notify(uuid(), vec![0], Properties::empty());
        assert_eq!(characteristic.handle(), None);
        assert_eq!(characteristic.send_notify(), Err(PushSkipped::NotRegistered));
    }

    #[test]
    fn constructors_add_implied_properties() {
        let mutable = Characteristic::new_mutable(uuid(), vec![], Properties::empty());
        assert!(mutable.properties().contains(Properties::READ | Properties::WRITE));
        assert!(mutable.is_dynamic());
        assert!(Characteristic::new_indicate(uuid(), vec![], Properties::empty()).is_indicate());
        assert!(Characteristic::new_notify(uuid(), vec![], Properties::empty()).is_notify());
    }
}
