//! Client configuration descriptor handling.
//!
//! The descriptor itself only stores the raw bytes a client writes; they
//! are interpreted here, lazily, whenever a notification or indication is
//! about to be pushed.

use super::attribute_table::CharacteristicIndex;
use crate::gatt::{
    att::{CLIENT_CONFIGURATION_INDICATION, CLIENT_CONFIGURATION_NONE, CLIENT_CONFIGURATION_NOTIFICATION},
    characteristic::Characteristic,
    service::Service,
};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Disabled,
    NotifyEnabled,
    IndicateEnabled,
}

impl SubscriptionState {
    /// Only byte 0 is inspected, and it must equal one of the enable codes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match bytes.first() {
            Some(&CLIENT_CONFIGURATION_NOTIFICATION) => SubscriptionState::NotifyEnabled,
            Some(&CLIENT_CONFIGURATION_INDICATION) => SubscriptionState::IndicateEnabled,
            _ => SubscriptionState::Disabled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Notify,
    Indicate,
}

impl PushKind {
    fn enable_code(&self) -> u8 {
        match self {
            PushKind::Notify => CLIENT_CONFIGURATION_NOTIFICATION,
            PushKind::Indicate => CLIENT_CONFIGURATION_INDICATION,
        }
    }
}

/// Why a notify/indicate push did not reach the radio stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSkipped {
    NotRegistered,
    NoClientConfiguration,
    NotEnabled,
    ServerBusy,
    StackRejected(String),
}

/// Pushes the characteristic's current value to the subscribed client.
///
/// Preconditions are checked in order and the first failure turns the call
/// into a logged no-op: registered handle, client configuration descriptor
/// present, matching enable code, and for notifications a free outbound
/// packet slot.
pub(crate) fn push(characteristic: &Characteristic, kind: PushKind) -> Result<(), PushSkipped> {
    let (handle, stack) = match (characteristic.handle(), characteristic.stack()) {
        (Some(handle), Some(stack)) => (handle, stack),
        _ => {
            log::warn!(
                "Characteristic {} has not been added! Cannot send {:?}",
                characteristic.uuid,
                kind
            );
            return Err(PushSkipped::NotRegistered);
        }
    };

    let Some(descriptor) = characteristic.client_configuration() else {
        log::warn!(
            "Cannot send {:?} on handle {} without a client configuration descriptor",
            kind,
            handle
        );
        return Err(PushSkipped::NoClientConfiguration);
    };

    if descriptor.value().first() != Some(&kind.enable_code()) {
        match kind {
            PushKind::Notify => {
                log::warn!("Attempted to notify handle {} but notifications not enabled", handle)
            }
            PushKind::Indicate => {
                log::warn!("Attempted to indicate handle {} but indications not enabled", handle)
            }
        }
        return Err(PushSkipped::NotEnabled);
    }

    // indications are flow-controlled below the ATT server
    if kind == PushKind::Notify && !stack.att_server_can_send_packet() {
        log::warn!("Attempted to notify handle {} but att server busy", handle);
        return Err(PushSkipped::ServerBusy);
    }

    let result = match kind {
        PushKind::Notify => stack.send_notify(handle, characteristic.value()),
        PushKind::Indicate => stack.send_indicate(handle, characteristic.value()),
    };
    result.map_err(|err| {
        log::error!("Radio stack rejected {:?} on handle {}: {}", kind, handle, err);
        PushSkipped::StackRejected(err.to_string())
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Tracked {
    characteristic_handle: u16,
    index: CharacteristicIndex,
}

/// Registered characteristics owning a client configuration descriptor,
/// keyed by the descriptor handle.
#[derive(Debug, Default)]
pub struct SubscriptionTracker {
    tracked: BTreeMap<u16, Tracked>,
}

impl SubscriptionTracker {
    pub fn track(
        &mut self,
        descriptor_handle: u16,
        characteristic_handle: u16,
        index: CharacteristicIndex,
    ) {
        self.tracked.insert(
            descriptor_handle,
            Tracked {
                characteristic_handle,
                index,
            },
        );
    }

    /// Characteristic handle owning the client configuration at `descriptor_handle`.
    pub fn owner_of(&self, descriptor_handle: u16) -> Option<u16> {
        self.tracked
            .get(&descriptor_handle)
            .map(|tracked| tracked.characteristic_handle)
    }

    /// Forces every tracked descriptor back to `{0, 0}`.
    pub fn reset_all(&self, services: &mut [Service]) {
        for (descriptor_handle, tracked) in self.tracked.iter() {
            let descriptor = tracked
                .index
                .resolve_mut(services)
                .and_then(|characteristic| characteristic.client_configuration_mut());
            match descriptor {
                Some(descriptor) => {
                    descriptor.set_value(&[CLIENT_CONFIGURATION_NONE, 0]);
                }
                None => log::error!(
                    "Tracked client configuration {} no longer resolves",
                    descriptor_handle
                ),
            }
        }
    }
}
