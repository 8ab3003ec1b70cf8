pub mod loopback;

use crate::{config::AdvertisingParameters, error::Error, gatt::properties::Properties, uuid::BleUuid};

/// Status reported alongside connection and discovery callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleStatus {
    Ok,
    /// End of a repeated callback sequence (discovery, reads).
    Done,
    ConnectionTimeout,
    ConnectionError,
    OtherError,
}

/// Primary service found on the remote peer during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub start_group_handle: u16,
    pub end_group_handle: u16,
    pub uuid: BleUuid,
}

impl ServiceRecord {
    pub fn contains(&self, handle: u16) -> bool {
        (self.start_group_handle..=self.end_group_handle).contains(&handle)
    }
}

/// Characteristic found on the remote peer during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CharacteristicRecord {
    pub start_handle: u16,
    pub value_handle: u16,
    pub end_handle: u16,
    pub properties: Properties,
    pub uuid: BleUuid,
}

/// `(handle, buffer)`: with no buffer only the value size is wanted.
/// Returns the full length of the attribute value.
pub type DataReadCallback = Box<dyn Fn(u16, Option<&mut [u8]>) -> u16 + Send + Sync>;
/// `(handle, bytes)`: returns the ATT error code for the write.
pub type DataWriteCallback = Box<dyn Fn(u16, &[u8]) -> u8 + Send + Sync>;
/// `(status, connection handle)`
pub type ConnectedCallback = Box<dyn Fn(BleStatus, u16) + Send + Sync>;
/// `(connection handle)`
pub type DisconnectedCallback = Box<dyn Fn(u16) + Send + Sync>;
/// `(status, connection handle, record)`: the record is present with `BleStatus::Ok`.
pub type ServiceDiscoveredCallback =
    Box<dyn Fn(BleStatus, u16, Option<&ServiceRecord>) + Send + Sync>;
pub type CharacteristicDiscoveredCallback =
    Box<dyn Fn(BleStatus, u16, Option<&CharacteristicRecord>) + Send + Sync>;
/// `(status, connection handle, value handle, value)`
pub type GattCharacteristicReadCallback = Box<dyn Fn(BleStatus, u16, u16, &[u8]) + Send + Sync>;

/// Boundary to the vendor BLE stack.
///
/// The stack owns connection management, ATT framing and the advertising
/// state machine; this crate only pushes attributes into it and reacts to
/// its callbacks. Callbacks are assumed to be serialized and never invoked
/// re-entrantly from inside another stack call.
pub trait RadioStack: Send + Sync {
    fn init(&self) -> Result<(), Error>;

    fn deinit(&self);

    fn add_service(&self, uuid: &BleUuid) -> Result<(), Error>;

    /// Returns the value handle. When `properties` carries Notify or Indicate
    /// the stack reserves `handle + 1` for the client configuration descriptor.
    fn add_characteristic(
        &self,
        uuid: &BleUuid,
        properties: Properties,
        value: &[u8],
    ) -> Result<u16, Error>;

    fn add_descriptor(
        &self,
        uuid: &BleUuid,
        properties: Properties,
        value: &[u8],
    ) -> Result<u16, Error>;

    fn send_notify(&self, handle: u16, value: &[u8]) -> Result<(), Error>;

    fn send_indicate(&self, handle: u16, value: &[u8]) -> Result<(), Error>;

    fn att_server_can_send_packet(&self) -> bool;

    fn set_advertising_params(&self, params: &AdvertisingParameters) -> Result<(), Error>;

    fn set_advertisement_data(&self, data: &[u8]) -> Result<(), Error>;

    fn set_scan_response_data(&self, data: &[u8]) -> Result<(), Error>;

    fn start_advertising(&self) -> Result<(), Error>;

    fn stop_advertising(&self) -> Result<(), Error>;

    fn discover_primary_services(&self, connection: u16) -> Result<(), Error>;

    fn discover_characteristics(&self, connection: u16, service: &ServiceRecord)
        -> Result<(), Error>;

    fn read_value(&self, connection: u16, value_handle: u16) -> Result<(), Error>;

    fn write_value_without_response(
        &self,
        connection: u16,
        value_handle: u16,
        value: &[u8],
    ) -> Result<(), Error>;

    fn on_data_read(&self, callback: DataReadCallback);

    fn on_data_write(&self, callback: DataWriteCallback);

    fn on_connected(&self, callback: ConnectedCallback);

    fn on_disconnected(&self, callback: DisconnectedCallback);

    fn on_service_discovered(&self, callback: ServiceDiscoveredCallback);

    fn on_characteristic_discovered(&self, callback: CharacteristicDiscoveredCallback);

    fn on_gatt_characteristic_read(&self, callback: GattCharacteristicReadCallback);
}
