use super::att::AttError;
use crate::{
    manager::subscription::SubscriptionState,
    radio::{CharacteristicRecord, ServiceRecord},
    uuid::BleUuid,
};

/// Notifications the manager hands to the application over its event channel.
#[derive(Debug, Clone, PartialEq)]
pub enum PeripheralEvent {
    ConnectionUpdate {
        connection: u16,
        connected: bool,
    },
    /// A remote write was applied to a local characteristic.
    WriteRequest {
        handle: u16,
        characteristic: BleUuid,
        value: Vec<u8>,
        response: AttError,
    },
    /// A remote client rewrote a client configuration descriptor.
    SubscriptionUpdate {
        handle: u16,
        characteristic: BleUuid,
        state: SubscriptionState,
    },
    ServiceDiscovered {
        service: BleUuid,
        record: ServiceRecord,
    },
    CharacteristicDiscovered {
        service: BleUuid,
        characteristic: BleUuid,
        record: CharacteristicRecord,
    },
    DiscoveryComplete {
        discovered: Vec<BleUuid>,
    },
    CharacteristicRead {
        value_handle: u16,
        value: Vec<u8>,
    },
}
