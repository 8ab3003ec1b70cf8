//! Placeholders for services and characteristics expected on the remote
//! peer, filled in by discovery once connected.

use crate::{
    error::Error,
    manager::ManagerState,
    radio::{CharacteristicRecord, ServiceRecord},
    uuid::BleUuid,
};
use std::{
    fmt,
    sync::{Mutex, Weak},
};
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct GattClientCharacteristic {
    pub uuid: BleUuid,
    discovered: bool,
    record: Option<CharacteristicRecord>,
}

impl GattClientCharacteristic {
    pub fn new(uuid: BleUuid) -> Self {
        GattClientCharacteristic {
            uuid,
            discovered: false,
            record: None,
        }
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub fn record(&self) -> Option<&CharacteristicRecord> {
        self.record.as_ref()
    }

    pub fn discover(&mut self, record: CharacteristicRecord) {
        self.record = Some(record);
        self.discovered = true;
    }

    pub fn reset(&mut self) {
        self.record = None;
        self.discovered = false;
    }
}

#[derive(Debug, Clone)]
pub struct GattClientService {
    pub uuid: BleUuid,
    characteristics: Vec<GattClientCharacteristic>,
    discovered: bool,
    record: Option<ServiceRecord>,
}

impl GattClientService {
    pub fn new(uuid: BleUuid) -> Self {
        GattClientService {
            uuid,
            characteristics: Vec::new(),
            discovered: false,
            record: None,
        }
    }

    pub fn with_characteristic(mut self, uuid: BleUuid) -> Self {
        self.add_characteristic(GattClientCharacteristic::new(uuid));
        self
    }

    pub fn add_characteristic(&mut self, characteristic: GattClientCharacteristic) {
        self.characteristics.push(characteristic);
    }

    pub fn characteristics(&self) -> &[GattClientCharacteristic] {
        &self.characteristics
    }

    pub(crate) fn characteristics_mut(&mut self) -> &mut [GattClientCharacteristic] {
        &mut self.characteristics
    }

    pub fn is_discovered(&self) -> bool {
        self.discovered
    }

    pub fn record(&self) -> Option<&ServiceRecord> {
        self.record.as_ref()
    }

    pub fn discover(&mut self, record: ServiceRecord) {
        self.record = Some(record);
        self.discovered = true;
    }

    /// Forgets the service and every characteristic under it.
    pub fn reset(&mut self) {
        self.record = None;
        self.discovered = false;
        for characteristic in self.characteristics.iter_mut() {
            characteristic.reset();
        }
    }
}

/// Failure of a GATT client request before it reaches the radio stack.
#[derive(Debug, Clone)]
pub enum ClientRequestError {
    ManagerReleased,
    ServiceReleased,
    NotDiscovered,
    NotConnected,
    Stack(Error),
}

impl ClientRequestError {
    /// Distinct negative code per failure stage.
    pub fn sentinel(&self) -> i32 {
        match self {
            ClientRequestError::ManagerReleased => -1,
            ClientRequestError::ServiceReleased => -2,
            ClientRequestError::NotDiscovered => -3,
            ClientRequestError::NotConnected => -4,
            ClientRequestError::Stack(_) => -5,
        }
    }
}

impl fmt::Display for ClientRequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ClientRequestError::ManagerReleased => write!(f, "manager has been released"),
            ClientRequestError::ServiceReleased => write!(f, "client service is gone"),
            ClientRequestError::NotDiscovered => write!(f, "characteristic not discovered"),
            ClientRequestError::NotConnected => write!(f, "no active connection"),
            ClientRequestError::Stack(err) => write!(f, "radio stack error: {}", err),
        }
    }
}

impl std::error::Error for ClientRequestError {}

/// Non-owning reference to a registered [`GattClientService`].
#[derive(Clone)]
pub struct ClientServiceRef {
    pub(crate) manager: Weak<Mutex<ManagerState>>,
    pub(crate) service: usize,
}

impl ClientServiceRef {
    pub fn is_discovered(&self) -> bool {
        self.inspect(|service| service.is_discovered())
            .unwrap_or(false)
    }

    pub fn record(&self) -> Option<ServiceRecord> {
        self.inspect(|service| service.record().cloned()).flatten()
    }

    pub fn characteristic(&self, uuid: &BleUuid) -> Option<ClientCharacteristicRef> {
        let position = self
            .inspect(|service| {
                service
                    .characteristics()
                    .iter()
                    .position(|characteristic| characteristic.uuid == *uuid)
            })
            .flatten()?;
        Some(ClientCharacteristicRef {
            manager: self.manager.clone(),
            service: self.service,
            characteristic: position,
        })
    }

    fn inspect<R>(&self, f: impl FnOnce(&GattClientService) -> R) -> Option<R> {
        let manager = self.manager.upgrade()?;
        let state = manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.client_service(self.service).map(f)
    }
}

impl fmt::Debug for ClientServiceRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientServiceRef")
            .field("service", &self.service)
            .finish()
    }
}

/// Non-owning reference to a characteristic of a registered client service.
#[derive(Clone)]
pub struct ClientCharacteristicRef {
    pub(crate) manager: Weak<Mutex<ManagerState>>,
    pub(crate) service: usize,
    pub(crate) characteristic: usize,
}

impl ClientCharacteristicRef {
    pub fn is_discovered(&self) -> bool {
        self.inspect(|characteristic| characteristic.is_discovered())
            .unwrap_or(false)
    }

    pub fn record(&self) -> Option<CharacteristicRecord> {
        self.inspect(|characteristic| characteristic.record().cloned())
            .flatten()
    }

    /// Requests the remote value. The receiver resolves once the stack
    /// reports the read result, or errors if the link drops first.
    pub fn try_read(&self) -> Result<oneshot::Receiver<Vec<u8>>, ClientRequestError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or(ClientRequestError::ManagerReleased)?;
        let mut state = manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.client_read(self.service, self.characteristic)
    }

    pub fn try_write_no_response(&self, value: &[u8]) -> Result<(), ClientRequestError> {
        let manager = self
            .manager
            .upgrade()
            .ok_or(ClientRequestError::ManagerReleased)?;
        let state = manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.client_write_no_response(self.service, self.characteristic, value)
    }

    fn inspect<R>(&self, f: impl FnOnce(&GattClientCharacteristic) -> R) -> Option<R> {
        let manager = self.manager.upgrade()?;
        let state = manager.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state
            .client_service(self.service)
            .and_then(|service| service.characteristics().get(self.characteristic))
            .map(f)
    }
}

impl fmt::Debug for ClientCharacteristicRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ClientCharacteristicRef")
            .field("service", &self.service)
            .field("characteristic", &self.characteristic)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::properties::Properties;

    #[test]
    fn reset_clears_service_and_characteristics() {
        let mut service = GattClientService::new(BleUuid::from_u16(0x180F))
            .with_characteristic(BleUuid::from_u16(0x2A19));
        service.discover(ServiceRecord {
            start_group_handle: 1,
            end_group_handle: 5,
            uuid: BleUuid::from_u16(0x180F),
        });
        service.characteristics_mut()[0].discover(CharacteristicRecord {
            start_handle: 2,
            value_handle: 3,
            end_handle: 5,
            properties: Properties::READ,
            uuid: BleUuid::from_u16(0x2A19),
        });
        assert!(service.is_discovered());
        assert!(service.characteristics()[0].is_discovered());

        service.reset();
        assert!(!service.is_discovered());
        assert!(service.record().is_none());
        assert!(!service.characteristics()[0].is_discovered());
        assert!(service.characteristics()[0].record().is_none());
    }

    #[test]
    fn sentinels_are_distinct_and_negative() {
        let sentinels = [
            ClientRequestError::ManagerReleased.sentinel(),
            ClientRequestError::ServiceReleased.sentinel(),
            ClientRequestError::NotDiscovered.sentinel(),
            ClientRequestError::NotConnected.sentinel(),
        ];
        for (i, a) in sentinels.iter().enumerate() {
            assert!(*a < 0);
            assert!(sentinels[i + 1..].iter().all(|b| a != b));
        }
    }

    #[test]
    fn released_manager_is_reported() {
        let characteristic = ClientCharacteristicRef {
            manager: Weak::new(),
            service: 0,
            characteristic: 0,
        };
        assert!(!characteristic.is_discovered());
        assert_eq!(
            characteristic.try_read().unwrap_err().sentinel(),
            ClientRequestError::ManagerReleased.sentinel()
        );
        assert_eq!(
            characteristic.try_write_no_response(&[1]).unwrap_err().sentinel(),
            -1
        );
    }
}
