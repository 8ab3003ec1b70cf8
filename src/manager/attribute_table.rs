use crate::{
    error::{Error, ErrorType},
    gatt::{characteristic::Characteristic, descriptor::Descriptor, service::Service},
    radio::RadioStack,
};
use std::{collections::BTreeMap, sync::Arc};

/// Position of a characteristic inside the manager's service list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicIndex {
    pub service: usize,
    pub characteristic: usize,
}

impl CharacteristicIndex {
    pub fn resolve<'a>(&self, services: &'a [Service]) -> Option<&'a Characteristic> {
        services
            .get(self.service)
            .and_then(|service| service.characteristics.get(self.characteristic))
    }

    pub fn resolve_mut<'a>(&self, services: &'a mut [Service]) -> Option<&'a mut Characteristic> {
        services
            .get_mut(self.service)
            .and_then(|service| service.characteristics.get_mut(self.characteristic))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorSlot {
    ClientConfiguration,
    /// Index into the characteristic's explicit descriptors.
    Explicit(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorIndex {
    pub characteristic: CharacteristicIndex,
    pub slot: DescriptorSlot,
}

impl DescriptorIndex {
    pub fn resolve<'a>(&self, services: &'a [Service]) -> Option<&'a Descriptor> {
        let characteristic = self.characteristic.resolve(services)?;
        match self.slot {
            DescriptorSlot::ClientConfiguration => characteristic.client_configuration(),
            DescriptorSlot::Explicit(index) => characteristic.descriptors().get(index),
        }
    }

    pub fn resolve_mut<'a>(&self, services: &'a mut [Service]) -> Option<&'a mut Descriptor> {
        let characteristic = self.characteristic.resolve_mut(services)?;
        match self.slot {
            DescriptorSlot::ClientConfiguration => characteristic.client_configuration_mut(),
            DescriptorSlot::Explicit(index) => characteristic.descriptor_mut(index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attribute {
    Characteristic(CharacteristicIndex),
    Descriptor(DescriptorIndex),
}

/// A characteristic as recorded by [`AttributeTable::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registered {
    pub handle: u16,
    pub index: CharacteristicIndex,
    /// Handle of the client configuration descriptor, if one was recorded.
    pub client_configuration: Option<u16>,
}

/// Handle -> entity mapping, filled in as services are pushed to the stack.
#[derive(Debug, Default)]
pub struct AttributeTable {
    characteristics: BTreeMap<u16, CharacteristicIndex>,
    descriptors: BTreeMap<u16, DescriptorIndex>,
}

impl AttributeTable {
    /// Pushes `service` into the radio stack and records every handle the
    /// stack hands back. The client configuration descriptor is recorded at
    /// `handle + 1` without a push; the stack reserves that slot itself when
    /// Notify or Indicate is set.
    ///
    /// Handles are staged and only merged into the table, and the
    /// characteristics only attached, once every stack call has succeeded.
    /// On error the table is left untouched.
    pub fn register(
        &mut self,
        service_index: usize,
        service: &mut Service,
        stack: &Arc<dyn RadioStack>,
    ) -> Result<Vec<Registered>, Error> {
        stack.add_service(&service.uuid)?;

        let mut staged = AttributeTable::default();
        let mut registered = Vec::with_capacity(service.characteristics.len());
        for (position, characteristic) in service.characteristics.iter().enumerate() {
            let index = CharacteristicIndex {
                service: service_index,
                characteristic: position,
            };

            let handle = stack.add_characteristic(
                &characteristic.uuid,
                characteristic.properties(),
                characteristic.value(),
            )?;
            if self.contains(handle) || staged.contains(handle) {
                log::warn!("Characteristic handle {} was already registered, replacing", handle);
            }
            staged.characteristics.insert(handle, index);
            log::debug!("Added characteristic {} handle: {}", characteristic.uuid, handle);

            for (slot, descriptor) in characteristic.descriptors().iter().enumerate() {
                let descriptor_handle =
                    stack.add_descriptor(&descriptor.uuid, descriptor.properties(), descriptor.value())?;
                if self.contains(descriptor_handle) || staged.contains(descriptor_handle) {
                    log::error!(
                        "Descriptor {} handle {} collides with a registered attribute",
                        descriptor.uuid,
                        descriptor_handle
                    );
                    continue;
                }
                staged.descriptors.insert(
                    descriptor_handle,
                    DescriptorIndex {
                        characteristic: index,
                        slot: DescriptorSlot::Explicit(slot),
                    },
                );
                log::debug!("Added descriptor handle: {}", descriptor_handle);
            }

            let mut client_configuration = None;
            if characteristic.client_configuration().is_some() {
                let descriptor_handle = handle.checked_add(1).ok_or_else(|| {
                    Error::from_string(
                        format!("No handle left for client configuration of {}", handle),
                        ErrorType::Registration,
                    )
                })?;
                if self.contains(descriptor_handle) || staged.contains(descriptor_handle) {
                    log::error!(
                        "Client configuration of handle {} collides with a registered attribute at {}",
                        handle,
                        descriptor_handle
                    );
                } else {
                    staged.descriptors.insert(
                        descriptor_handle,
                        DescriptorIndex {
                            characteristic: index,
                            slot: DescriptorSlot::ClientConfiguration,
                        },
                    );
                    client_configuration = Some(descriptor_handle);
                    log::debug!(
                        "Added client characteristic configuration descriptor handle: {}",
                        descriptor_handle
                    );
                }
            }

            registered.push(Registered {
                handle,
                index,
                client_configuration,
            });
        }

        for entry in registered.iter() {
            if let Some(characteristic) = service.characteristics.get_mut(entry.index.characteristic) {
                characteristic.attach(entry.handle, stack.clone());
            }
        }
        self.characteristics.extend(staged.characteristics);
        self.descriptors.extend(staged.descriptors);
        Ok(registered)
    }

    /// Characteristics win over descriptors when a handle is in both maps.
    pub fn by_handle(&self, handle: u16) -> Option<Attribute> {
        if let Some(index) = self.characteristics.get(&handle) {
            return Some(Attribute::Characteristic(*index));
        }
        self.descriptors
            .get(&handle)
            .map(|index| Attribute::Descriptor(*index))
    }

    pub fn contains(&self, handle: u16) -> bool {
        self.characteristics.contains_key(&handle) || self.descriptors.contains_key(&handle)
    }
}
