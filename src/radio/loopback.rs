//! In-memory radio stack.
//!
//! Hands out handles the way btstack's attribute database lays them out,
//! records every outbound request, and lets the caller play the remote
//! side by firing the registered callbacks directly.

use super::{
    BleStatus, CharacteristicDiscoveredCallback, CharacteristicRecord, ConnectedCallback,
    DataReadCallback, DataWriteCallback, DisconnectedCallback, GattCharacteristicReadCallback,
    RadioStack, ServiceDiscoveredCallback, ServiceRecord,
};
use crate::{
    config::AdvertisingParameters,
    error::{Error, ErrorType},
    gatt::properties::Properties,
    uuid::BleUuid,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum StackCall {
    Init,
    Deinit,
    AddService(BleUuid),
    AddCharacteristic {
        uuid: BleUuid,
        properties: Properties,
        value: Vec<u8>,
        handle: u16,
    },
    AddDescriptor {
        uuid: BleUuid,
        properties: Properties,
        value: Vec<u8>,
        handle: u16,
    },
    Notify {
        handle: u16,
        value: Vec<u8>,
    },
    Indicate {
        handle: u16,
        value: Vec<u8>,
    },
    SetAdvertisingParams(AdvertisingParameters),
    SetAdvertisementData(Vec<u8>),
    SetScanResponseData(Vec<u8>),
    StartAdvertising,
    StopAdvertising,
    DiscoverPrimaryServices {
        connection: u16,
    },
    DiscoverCharacteristics {
        connection: u16,
        service: ServiceRecord,
    },
    ReadValue {
        connection: u16,
        value_handle: u16,
    },
    WriteWithoutResponse {
        connection: u16,
        value_handle: u16,
        value: Vec<u8>,
    },
}

#[derive(Default)]
struct Callbacks {
    data_read: Option<Arc<dyn Fn(u16, Option<&mut [u8]>) -> u16 + Send + Sync>>,
    data_write: Option<Arc<dyn Fn(u16, &[u8]) -> u8 + Send + Sync>>,
    connected: Option<Arc<dyn Fn(BleStatus, u16) + Send + Sync>>,
    disconnected: Option<Arc<dyn Fn(u16) + Send + Sync>>,
    service_discovered: Option<Arc<dyn Fn(BleStatus, u16, Option<&ServiceRecord>) + Send + Sync>>,
    characteristic_discovered:
        Option<Arc<dyn Fn(BleStatus, u16, Option<&CharacteristicRecord>) + Send + Sync>>,
    gatt_read: Option<Arc<dyn Fn(BleStatus, u16, u16, &[u8]) + Send + Sync>>,
}

pub struct LoopbackStack {
    next_handle: Mutex<u16>,
    calls: Mutex<Vec<StackCall>>,
    can_send_packet: AtomicBool,
    reject_pushes: AtomicBool,
    reject_descriptors: AtomicBool,
    pinned_descriptor_handle: Mutex<Option<u16>>,
    callbacks: Mutex<Callbacks>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for LoopbackStack {
    fn default() -> Self {
        LoopbackStack::new()
    }
}

impl LoopbackStack {
    pub fn new() -> Self {
        LoopbackStack::with_first_handle(1)
    }

    /// The first service declaration lands on `handle`.
    pub fn with_first_handle(handle: u16) -> Self {
        LoopbackStack {
            next_handle: Mutex::new(handle),
            calls: Mutex::new(Vec::new()),
            can_send_packet: AtomicBool::new(true),
            reject_pushes: AtomicBool::new(false),
            reject_descriptors: AtomicBool::new(false),
            pinned_descriptor_handle: Mutex::new(None),
            callbacks: Mutex::new(Callbacks::default()),
        }
    }

    pub fn calls(&self) -> Vec<StackCall> {
        lock(&self.calls).clone()
    }

    /// Notifications and indications sent so far.
    pub fn pushes(&self) -> Vec<StackCall> {
        lock(&self.calls)
            .iter()
            .filter(|call| matches!(call, StackCall::Notify { .. } | StackCall::Indicate { .. }))
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn set_can_send_packet(&self, can_send: bool) {
        self.can_send_packet.store(can_send, Ordering::SeqCst);
    }

    /// Makes `send_notify`/`send_indicate` fail, as a saturated stack would.
    pub fn set_reject_pushes(&self, reject: bool) {
        self.reject_pushes.store(reject, Ordering::SeqCst);
    }

    /// Makes `add_descriptor` fail, as an exhausted attribute database would.
    pub fn set_reject_descriptors(&self, reject: bool) {
        self.reject_descriptors.store(reject, Ordering::SeqCst);
    }

    /// Hands out `handle` for every descriptor instead of allocating one,
    /// the way a misbehaving stack would.
    pub fn pin_descriptor_handle(&self, handle: Option<u16>) {
        *lock(&self.pinned_descriptor_handle) = handle;
    }

    fn record(&self, call: StackCall) {
        lock(&self.calls).push(call);
    }

    fn allocate(&self, count: u16) -> Result<u16, Error> {
        let mut next = lock(&self.next_handle);
        let handle = *next;
        *next = handle.checked_add(count).ok_or_else(|| {
            Error::from_string("Attribute handles exhausted".to_string(), ErrorType::RadioStack)
        })?;
        Ok(handle)
    }

    fn push(&self, call: StackCall) -> Result<(), Error> {
        if self.reject_pushes.load(Ordering::SeqCst) {
            return Err(Error::from_string(
                "Outbound queue full".to_string(),
                ErrorType::RadioStack,
            ));
        }
        self.record(call);
        Ok(())
    }

    /// `None` when no read callback is registered.
    pub fn simulate_read(&self, handle: u16, buffer: Option<&mut [u8]>) -> Option<u16> {
        let callback = lock(&self.callbacks).data_read.clone()?;
        Some(callback(handle, buffer))
    }

    pub fn simulate_write(&self, handle: u16, value: &[u8]) -> Option<u8> {
        let callback = lock(&self.callbacks).data_write.clone()?;
        Some(callback(handle, value))
    }

    pub fn simulate_connected(&self, status: BleStatus, connection: u16) {
        let callback = lock(&self.callbacks).connected.clone();
        if let Some(callback) = callback {
            callback(status, connection);
        }
    }

    pub fn simulate_disconnected(&self, connection: u16) {
        let callback = lock(&self.callbacks).disconnected.clone();
        if let Some(callback) = callback {
            callback(connection);
        }
    }

    pub fn simulate_service_discovered(
        &self,
        status: BleStatus,
        connection: u16,
        record: Option<&ServiceRecord>,
    ) {
        let callback = lock(&self.callbacks).service_discovered.clone();
        if let Some(callback) = callback {
            callback(status, connection, record);
        }
    }

    pub fn simulate_characteristic_discovered(
        &self,
        status: BleStatus,
        connection: u16,
        record: Option<&CharacteristicRecord>,
    ) {
        let callback = lock(&self.callbacks).characteristic_discovered.clone();
        if let Some(callback) = callback {
            callback(status, connection, record);
        }
    }

    pub fn simulate_gatt_read(&self, status: BleStatus, connection: u16, value_handle: u16, value: &[u8]) {
        let callback = lock(&self.callbacks).gatt_read.clone();
        if let Some(callback) = callback {
            callback(status, connection, value_handle, value);
        }
    }
}

impl RadioStack for LoopbackStack {
    fn init(&self) -> Result<(), Error> {
        self.record(StackCall::Init);
        Ok(())
    }

    fn deinit(&self) {
        self.record(StackCall::Deinit);
        *lock(&self.callbacks) = Callbacks::default();
    }

    fn add_service(&self, uuid: &BleUuid) -> Result<(), Error> {
        self.allocate(1)?;
        self.record(StackCall::AddService(*uuid));
        Ok(())
    }

    fn add_characteristic(
        &self,
        uuid: &BleUuid,
        properties: Properties,
        value: &[u8],
    ) -> Result<u16, Error> {
        // declaration, value, then the client configuration slot if any
        let count = if properties.needs_client_configuration() { 3 } else { 2 };
        let handle = self.allocate(count)? + 1;
        self.record(StackCall::AddCharacteristic {
            uuid: *uuid,
            properties,
            value: value.to_vec(),
            handle,
        });
        Ok(handle)
    }

    fn add_descriptor(
        &self,
        uuid: &BleUuid,
        properties: Properties,
        value: &[u8],
    ) -> Result<u16, Error> {
        if self.reject_descriptors.load(Ordering::SeqCst) {
            return Err(Error::from_string(
                "Attribute database full".to_string(),
                ErrorType::RadioStack,
            ));
        }
        let pinned = *lock(&self.pinned_descriptor_handle);
        let handle = match pinned {
            Some(handle) => handle,
            None => self.allocate(1)?,
        };
        self.record(StackCall::AddDescriptor {
            uuid: *uuid,
            properties,
            value: value.to_vec(),
            handle,
        });
        Ok(handle)
    }

    fn send_notify(&self, handle: u16, value: &[u8]) -> Result<(), Error> {
        self.push(StackCall::Notify {
            handle,
            value: value.to_vec(),
        })
    }

    fn send_indicate(&self, handle: u16, value: &[u8]) -> Result<(), Error> {
        self.push(StackCall::Indicate {
            handle,
            value: value.to_vec(),
        })
    }

    fn att_server_can_send_packet(&self) -> bool {
        self.can_send_packet.load(Ordering::SeqCst)
    }

    fn set_advertising_params(&self, params: &AdvertisingParameters) -> Result<(), Error> {
        self.record(StackCall::SetAdvertisingParams(params.clone()));
        Ok(())
    }

    fn set_advertisement_data(&self, data: &[u8]) -> Result<(), Error> {
        self.record(StackCall::SetAdvertisementData(data.to_vec()));
        Ok(())
    }

    fn set_scan_response_data(&self, data: &[u8]) -> Result<(), Error> {
        self.record(StackCall::SetScanResponseData(data.to_vec()));
        Ok(())
    }

    fn start_advertising(&self) -> Result<(), Error> {
        self.record(StackCall::StartAdvertising);
        Ok(())
    }

    fn stop_advertising(&self) -> Result<(), Error> {
        self.record(StackCall::StopAdvertising);
        Ok(())
    }

    fn discover_primary_services(&self, connection: u16) -> Result<(), Error> {
        self.record(StackCall::DiscoverPrimaryServices { connection });
        Ok(())
    }

    fn discover_characteristics(
        &self,
        connection: u16,
        service: &ServiceRecord,
    ) -> Result<(), Error> {
        self.record(StackCall::DiscoverCharacteristics {
            connection,
            service: service.clone(),
        });
        Ok(())
    }

    fn read_value(&self, connection: u16, value_handle: u16) -> Result<(), Error> {
        self.record(StackCall::ReadValue {
            connection,
            value_handle,
        });
        Ok(())
    }

    fn write_value_without_response(
        &self,
        connection: u16,
        value_handle: u16,
        value: &[u8],
    ) -> Result<(), Error> {
        self.record(StackCall::WriteWithoutResponse {
            connection,
            value_handle,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn on_data_read(&self, callback: DataReadCallback) {
        lock(&self.callbacks).data_read = Some(Arc::from(callback));
    }

    fn on_data_write(&self, callback: DataWriteCallback) {
        lock(&self.callbacks).data_write = Some(Arc::from(callback));
    }

    fn on_connected(&self, callback: ConnectedCallback) {
        lock(&self.callbacks).connected = Some(Arc::from(callback));
    }

    fn on_disconnected(&self, callback: DisconnectedCallback) {
        lock(&self.callbacks).disconnected = Some(Arc::from(callback));
    }

    fn on_service_discovered(&self, callback: ServiceDiscoveredCallback) {
        lock(&self.callbacks).service_discovered = Some(Arc::from(callback));
    }

    fn on_characteristic_discovered(&self, callback: CharacteristicDiscoveredCallback) {
        lock(&self.callbacks).characteristic_discovered = Some(Arc::from(callback));
    }

    fn on_gatt_characteristic_read(&self, callback: GattCharacteristicReadCallback) {
        lock(&self.callbacks).gatt_read = Some(Arc::from(callback));
    }
}
