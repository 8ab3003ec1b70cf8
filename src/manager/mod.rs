pub mod attribute_table;
pub mod discovery;
pub mod subscription;

use self::{
    attribute_table::{Attribute, AttributeTable},
    discovery::DiscoveryCoordinator,
    subscription::{PushSkipped, SubscriptionState, SubscriptionTracker},
};
use crate::{
    config::{AdvertisingParameters, ManagerConfig},
    error::{Error, ErrorType},
    gatt::{
        att::AttError,
        characteristic::{Characteristic, CharacteristicKind},
        client::{ClientRequestError, ClientServiceRef, GattClientService},
        peripheral_event::PeripheralEvent,
        service::Service,
    },
    radio::{BleStatus, CharacteristicRecord, RadioStack, ServiceRecord},
    uuid::BleUuid,
};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::{mpsc::Sender, oneshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Advertising,
    Connected,
}

pub(crate) struct ManagerState {
    stack: Arc<dyn RadioStack>,
    config: ManagerConfig,
    services: Vec<Service>,
    table: AttributeTable,
    subscriptions: SubscriptionTracker,
    discovery: DiscoveryCoordinator,
    link_state: LinkState,
    connection: Option<u16>,
    service_changed: Option<u16>,
    registration_open: bool,
    outbox: Vec<PeripheralEvent>,
}

/// Owns the local attribute table and routes every radio stack callback
/// to the entity it concerns.
///
/// Only one `Manager` may be attached to a radio stack at a time: creating
/// it replaces whatever callbacks were registered on the stack before, and
/// dropping it de-initialises the stack.
pub struct Manager {
    state: Arc<Mutex<ManagerState>>,
    stack: Arc<dyn RadioStack>,
}

fn lock_state(state: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Runs `f` against the live manager state from inside a stack callback,
/// then delivers whatever events it queued once the lock is released.
fn with_state<R>(
    state: &Weak<Mutex<ManagerState>>,
    fallback: R,
    f: impl FnOnce(&mut ManagerState) -> R,
) -> R {
    let Some(state) = state.upgrade() else {
        log::warn!("Radio stack callback fired after the manager was released");
        return fallback;
    };
    let (result, sender, events) = {
        let mut guard = lock_state(&state);
        let result = f(&mut *guard);
        let events = std::mem::take(&mut guard.outbox);
        (result, guard.config.events.clone(), events)
    };
    if let Some(sender) = sender {
        send_events(&sender, events);
    }
    result
}

fn send_events(sender: &Sender<PeripheralEvent>, events: Vec<PeripheralEvent>) {
    for event in events {
        if let Err(err) = send_event(sender, event) {
            log::error!("Error sending peripheral event: {}", err);
        }
    }
}

fn send_event(sender: &Sender<PeripheralEvent>, event: PeripheralEvent) -> Result<(), Error> {
    futures::executor::block_on(async { sender.send(event).await })?;
    Ok(())
}

impl Manager {
    pub fn new(stack: Arc<dyn RadioStack>, config: ManagerConfig) -> Result<Self, Error> {
        stack.init()?;

        let discovery = DiscoveryCoordinator::new(config.scope_characteristic_matching);
        let state = Arc::new(Mutex::new(ManagerState {
            stack: stack.clone(),
            config,
            services: Vec::new(),
            table: AttributeTable::default(),
            subscriptions: SubscriptionTracker::default(),
            discovery,
            link_state: LinkState::Idle,
            connection: None,
            service_changed: None,
            registration_open: true,
            outbox: Vec::new(),
        }));
        register_callbacks(stack.as_ref(), &state);
        log::debug!("Manager attached to radio stack");

        Ok(Manager { state, stack })
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        lock_state(&self.state)
    }

    /// Pushes `service` into the radio stack and takes ownership of it.
    /// Returns the value handles of its characteristics in declaration order.
    pub fn add_service(&self, mut service: Service) -> Result<Vec<u16>, Error> {
        let mut state = self.state();
        state.ensure_registration_open()?;

        let service_index = state.services.len();
        let stack = state.stack.clone();
        let registered = state
            .table
            .register(service_index, &mut service, &stack)
            .map_err(|err| {
                log::error!("Could not add service {}: {}", service.uuid, err);
                err
            })?;
        for entry in registered.iter() {
            if let Some(descriptor_handle) = entry.client_configuration {
                state
                    .subscriptions
                    .track(descriptor_handle, entry.handle, entry.index);
            }
        }
        log::info!(
            "Added service {} with {} characteristics",
            service.uuid,
            registered.len()
        );
        state.services.push(service);
        Ok(registered.into_iter().map(|entry| entry.handle).collect())
    }

    /// Registers a service expected on the remote peer. Discovery runs
    /// automatically on every successful connection.
    pub fn add_gatt_client_service(&self, service: GattClientService) -> Result<ClientServiceRef, Error> {
        let mut state = self.state();
        state.ensure_registration_open()?;
        log::debug!("Added GATT client target service {}", service.uuid);
        let index = state.discovery.add_target(service);
        Ok(ClientServiceRef {
            manager: Arc::downgrade(&self.state),
            service: index,
        })
    }

    /// Marks the Indicate characteristic at `handle` as the service-changed
    /// characteristic, indicated on every new connection.
    pub fn set_service_changed(&self, handle: u16) -> Result<(), Error> {
        let mut state = self.state();
        match state.characteristic(handle) {
            Some(characteristic) if characteristic.kind() == CharacteristicKind::Indicate => {
                state.service_changed = Some(handle);
                Ok(())
            }
            _ => Err(Error::from_string(
                format!("Handle {} is not a registered indicate characteristic", handle),
                ErrorType::Registration,
            )),
        }
    }

    pub fn set_advertising_parameters(&self, params: &AdvertisingParameters) -> Result<(), Error> {
        self.stack.set_advertising_params(params)
    }

    pub fn set_advertisement_data(&self, data: &[u8]) -> Result<(), Error> {
        self.stack.set_advertisement_data(data)
    }

    pub fn set_scan_response_data(&self, data: &[u8]) -> Result<(), Error> {
        self.stack.set_scan_response_data(data)
    }

    /// Closes registration; services cannot be added afterwards.
    pub fn start_advertising(&self) -> Result<(), Error> {
        let mut state = self.state();
        state.stack.start_advertising()?;
        state.registration_open = false;
        if state.link_state == LinkState::Idle {
            state.link_state = LinkState::Advertising;
        }
        log::info!("Advertising started");
        Ok(())
    }

    pub fn stop_advertising(&self) -> Result<(), Error> {
        let mut state = self.state();
        state.stack.stop_advertising()?;
        if state.link_state == LinkState::Advertising {
            state.link_state = LinkState::Idle;
        }
        log::info!("Advertising stopped");
        Ok(())
    }

    pub fn link_state(&self) -> LinkState {
        self.state().link_state
    }

    pub fn is_connected(&self) -> bool {
        self.state().link_state == LinkState::Connected
    }

    pub fn connection_handle(&self) -> Option<u16> {
        self.state().connection
    }

    pub fn attribute(&self, handle: u16) -> Option<Attribute> {
        self.state().table.by_handle(handle)
    }

    /// Value handle of the first registered characteristic of type `uuid`.
    pub fn characteristic_handle(&self, uuid: &BleUuid) -> Option<u16> {
        self.state()
            .services
            .iter()
            .flat_map(|service| service.characteristics.iter())
            .find(|characteristic| characteristic.uuid == *uuid)
            .and_then(|characteristic| characteristic.handle())
    }

    /// Current value of the characteristic or descriptor at `handle`.
    pub fn value(&self, handle: u16) -> Option<Vec<u8>> {
        self.state().attribute_value(handle).map(|value| value.to_vec())
    }

    /// Local update of the characteristic or descriptor at `handle`, taking
    /// the same path as a remote write: Indicate and Notify characteristics
    /// push the new value to a subscribed client. No event is emitted.
    pub fn set_value(&self, handle: u16, value: &[u8]) -> AttError {
        let mut state = self.state();
        let state = &mut *state;
        match state.table.by_handle(handle) {
            Some(Attribute::Characteristic(index)) => index
                .resolve_mut(&mut state.services)
                .map_or(AttError::UnlikelyError, |characteristic| {
                    characteristic.set_value(value)
                }),
            Some(Attribute::Descriptor(index)) => index
                .resolve_mut(&mut state.services)
                .map_or(AttError::UnlikelyError, |descriptor| descriptor.set_value(value)),
            None => {
                log::warn!("No attribute registered at handle {}", handle);
                AttError::InvalidHandle
            }
        }
    }

    pub fn send_notify(&self, handle: u16) -> Result<(), PushSkipped> {
        match self.state().characteristic(handle) {
            Some(characteristic) => characteristic.send_notify(),
            None => Err(PushSkipped::NotRegistered),
        }
    }

    pub fn send_indicate(&self, handle: u16) -> Result<(), PushSkipped> {
        match self.state().characteristic(handle) {
            Some(characteristic) => characteristic.send_indicate(),
            None => Err(PushSkipped::NotRegistered),
        }
    }

    /// `None` when `handle` is not a characteristic with a client configuration.
    pub fn subscription(&self, handle: u16) -> Option<SubscriptionState> {
        let state = self.state();
        let characteristic = state.characteristic(handle)?;
        characteristic.client_configuration()?;
        Some(characteristic.subscription())
    }

    pub fn client_services(&self) -> Vec<ClientServiceRef> {
        let count = self.state().discovery.targets().len();
        (0..count)
            .map(|service| ClientServiceRef {
                manager: Arc::downgrade(&self.state),
                service,
            })
            .collect()
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.stack.deinit();
    }
}

/// Hands one closure per hook to the stack. Each closure holds only a weak
/// reference, so the stack never keeps the manager alive.
fn register_callbacks(stack: &dyn RadioStack, state: &Arc<Mutex<ManagerState>>) {
    let weak = Arc::downgrade(state);
    stack.on_data_read(Box::new(move |handle: u16, buffer: Option<&mut [u8]>| {
        with_state(&weak, 0, |state| state.on_read(handle, buffer))
    }));

    let weak = Arc::downgrade(state);
    stack.on_data_write(Box::new(move |handle: u16, value: &[u8]| {
        with_state(&weak, AttError::UnlikelyError, |state| state.on_write(handle, value)).code()
    }));

    let weak = Arc::downgrade(state);
    stack.on_connected(Box::new(move |status, connection| {
        with_state(&weak, (), |state| state.on_connected(status, connection))
    }));

    let weak = Arc::downgrade(state);
    stack.on_disconnected(Box::new(move |connection| {
        with_state(&weak, (), |state| state.on_disconnected(connection))
    }));

    let weak = Arc::downgrade(state);
    stack.on_service_discovered(Box::new(
        move |status: BleStatus, connection: u16, record: Option<&ServiceRecord>| {
            with_state(&weak, (), |state| {
                state.on_service_discovered(status, connection, record)
            })
        },
    ));

    let weak = Arc::downgrade(state);
    stack.on_characteristic_discovered(Box::new(
        move |status: BleStatus, connection: u16, record: Option<&CharacteristicRecord>| {
            with_state(&weak, (), |state| {
                state.on_characteristic_discovered(status, connection, record)
            })
        },
    ));

    let weak = Arc::downgrade(state);
    stack.on_gatt_characteristic_read(Box::new(
        move |status: BleStatus, connection: u16, value_handle: u16, value: &[u8]| {
            with_state(&weak, (), |state| {
                state.on_gatt_read(status, connection, value_handle, value)
            })
        },
    ));
}

impl ManagerState {
    fn ensure_registration_open(&self) -> Result<(), Error> {
        if self.registration_open {
            return Ok(());
        }
        Err(Error::from_string(
            "Services cannot be added once advertising has started".to_string(),
            ErrorType::Registration,
        ))
    }

    fn characteristic(&self, handle: u16) -> Option<&Characteristic> {
        match self.table.by_handle(handle)? {
            Attribute::Characteristic(index) => index.resolve(&self.services),
            Attribute::Descriptor(_) => None,
        }
    }

    fn attribute_value(&self, handle: u16) -> Option<&[u8]> {
        match self.table.by_handle(handle)? {
            Attribute::Characteristic(index) => {
                index.resolve(&self.services).map(|characteristic| characteristic.value())
            }
            Attribute::Descriptor(index) => {
                index.resolve(&self.services).map(|descriptor| descriptor.value())
            }
        }
    }

    pub(crate) fn client_service(&self, index: usize) -> Option<&GattClientService> {
        self.discovery.target(index)
    }

    fn client_value_handle(
        &self,
        service: usize,
        characteristic: usize,
    ) -> Result<(u16, u16), ClientRequestError> {
        let record = self
            .discovery
            .target(service)
            .and_then(|service| service.characteristics().get(characteristic))
            .ok_or(ClientRequestError::ServiceReleased)?
            .record()
            .ok_or(ClientRequestError::NotDiscovered)?;
        let connection = self.connection.ok_or(ClientRequestError::NotConnected)?;
        Ok((connection, record.value_handle))
    }

    pub(crate) fn client_read(
        &mut self,
        service: usize,
        characteristic: usize,
    ) -> Result<oneshot::Receiver<Vec<u8>>, ClientRequestError> {
        let (connection, value_handle) = self
            .client_value_handle(service, characteristic)
            .map_err(|err| {
                log::warn!("GATT client read not sent: {}", err);
                err
            })?;
        self.stack
            .read_value(connection, value_handle)
            .map_err(ClientRequestError::Stack)?;
        Ok(self.discovery.queue_read(value_handle))
    }

    pub(crate) fn client_write_no_response(
        &self,
        service: usize,
        characteristic: usize,
        value: &[u8],
    ) -> Result<(), ClientRequestError> {
        let (connection, value_handle) = self
            .client_value_handle(service, characteristic)
            .map_err(|err| {
                log::warn!("GATT client write not sent: {}", err);
                err
            })?;
        self.stack
            .write_value_without_response(connection, value_handle, value)
            .map_err(ClientRequestError::Stack)
    }

    /// Without a buffer only the value length is reported. Otherwise up to
    /// `buffer.len()` bytes are copied; the full value length is returned
    /// either way.
    fn on_read(&mut self, handle: u16, buffer: Option<&mut [u8]>) -> u16 {
        let Some(value) = self.attribute_value(handle) else {
            log::warn!(
                "Could not find matching characteristic or descriptor for read! Handle: {}",
                handle
            );
            return 0;
        };
        if let Some(buffer) = buffer {
            let len = value.len().min(buffer.len());
            buffer[..len].copy_from_slice(&value[..len]);
        }
        log::debug!("Read attribute, handle: {}, size: {}", handle, value.len());
        u16::try_from(value.len()).unwrap_or(u16::MAX)
    }

    fn on_write(&mut self, handle: u16, value: &[u8]) -> AttError {
        let value = value.to_vec();
        match self.table.by_handle(handle) {
            Some(Attribute::Characteristic(index)) => {
                let Some(characteristic) = index.resolve_mut(&mut self.services) else {
                    log::error!("Handle {} points at a missing characteristic", handle);
                    return AttError::UnlikelyError;
                };
                let response = characteristic.set_value(&value);
                log::debug!("Wrote characteristic, handle: {}, code: {:?}", handle, response);
                if response.is_ok() {
                    self.outbox.push(PeripheralEvent::WriteRequest {
                        handle,
                        characteristic: characteristic.uuid,
                        value,
                        response,
                    });
                }
                response
            }
            Some(Attribute::Descriptor(index)) => {
                let Some(descriptor) = index.resolve_mut(&mut self.services) else {
                    log::error!("Handle {} points at a missing descriptor", handle);
                    return AttError::UnlikelyError;
                };
                let response = descriptor.set_value(&value);
                log::debug!("Wrote descriptor, handle: {}, code: {:?}", handle, response);
                if response.is_ok() {
                    if let Some(owner) = self.subscriptions.owner_of(handle) {
                        if let Some(characteristic) = index.characteristic.resolve(&self.services) {
                            let state = SubscriptionState::from_bytes(&value);
                            log::info!(
                                "Client configuration of handle {} is now {:?}",
                                owner,
                                state
                            );
                            self.outbox.push(PeripheralEvent::SubscriptionUpdate {
                                handle: owner,
                                characteristic: characteristic.uuid,
                                state,
                            });
                        }
                    }
                }
                response
            }
            None => {
                log::warn!("Could not find matching attribute for write! Handle: {}", handle);
                AttError::UnlikelyError
            }
        }
    }

    fn on_connected(&mut self, status: BleStatus, connection: u16) {
        match status {
            BleStatus::Ok => {
                log::info!("Successfully connected to device! Handle: {}", connection);
                self.link_state = LinkState::Connected;
                self.connection = Some(connection);

                if let Some(handle) = self.service_changed {
                    if let Some(characteristic) = self.characteristic(handle) {
                        let _ = characteristic.send_indicate();
                    }
                }

                if self.discovery.has_targets() {
                    if let Err(err) = self.stack.discover_primary_services(connection) {
                        log::error!("Could not start service discovery: {}", err);
                    }
                }

                self.outbox.push(PeripheralEvent::ConnectionUpdate {
                    connection,
                    connected: true,
                });
            }
            BleStatus::Done => log::info!("Connection done. Handle: {}", connection),
            BleStatus::ConnectionTimeout => {
                log::warn!("Connection timed out. Handle: {}", connection)
            }
            BleStatus::ConnectionError => log::warn!("Connection error. Handle: {}", connection),
            BleStatus::OtherError => {
                log::warn!("Connection other error. Handle: {}", connection)
            }
        }
    }

    fn on_disconnected(&mut self, connection: u16) {
        log::info!("Device disconnected. Handle: {}", connection);
        self.link_state = LinkState::Idle;
        self.connection = None;
        self.subscriptions.reset_all(&mut self.services);
        self.discovery
            .disconnect(self.config.reset_discovery_on_disconnect);
        self.outbox.push(PeripheralEvent::ConnectionUpdate {
            connection,
            connected: false,
        });
    }

    fn on_service_discovered(
        &mut self,
        status: BleStatus,
        connection: u16,
        record: Option<&ServiceRecord>,
    ) {
        self.discovery.on_service_discovered(
            status,
            connection,
            record,
            self.stack.as_ref(),
            &mut self.outbox,
        );
    }

    fn on_characteristic_discovered(
        &mut self,
        status: BleStatus,
        connection: u16,
        record: Option<&CharacteristicRecord>,
    ) {
        self.discovery
            .on_characteristic_discovered(status, connection, record, &mut self.outbox);
    }

    fn on_gatt_read(&mut self, status: BleStatus, connection: u16, value_handle: u16, value: &[u8]) {
        if self.connection != Some(connection) {
            log::warn!(
                "Ignoring read result for handle {} from stale connection {}",
                value_handle,
                connection
            );
            return;
        }
        self.discovery
            .on_read_result(status, value_handle, value, &mut self.outbox);
    }
}
