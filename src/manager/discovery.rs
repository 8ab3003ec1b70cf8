use crate::{
    gatt::{client::GattClientService, peripheral_event::PeripheralEvent},
    radio::{BleStatus, CharacteristicRecord, RadioStack, ServiceRecord},
    uuid::BleUuid,
};
use std::collections::{HashMap, VecDeque};
use tokio::sync::oneshot;

/// Drives service discovery, then one characteristic discovery per matched
/// service, against the declared target services.
#[derive(Debug)]
pub struct DiscoveryCoordinator {
    targets: Vec<GattClientService>,
    scope_matching: bool,
    pending_reads: HashMap<u16, VecDeque<oneshot::Sender<Vec<u8>>>>,
}

impl DiscoveryCoordinator {
    pub fn new(scope_matching: bool) -> Self {
        DiscoveryCoordinator {
            targets: Vec::new(),
            scope_matching,
            pending_reads: HashMap::new(),
        }
    }

    pub fn add_target(&mut self, service: GattClientService) -> usize {
        self.targets.push(service);
        self.targets.len() - 1
    }

    pub fn has_targets(&self) -> bool {
        !self.targets.is_empty()
    }

    pub fn targets(&self) -> &[GattClientService] {
        &self.targets
    }

    pub fn target(&self, index: usize) -> Option<&GattClientService> {
        self.targets.get(index)
    }

    /// Phase one. Every reported record is matched against every target;
    /// on `Done`, one characteristic discovery is issued per matched target.
    pub fn on_service_discovered(
        &mut self,
        status: BleStatus,
        connection: u16,
        record: Option<&ServiceRecord>,
        stack: &dyn RadioStack,
        events: &mut Vec<PeripheralEvent>,
    ) {
        log::debug!(
            "Discover service callback called, status: {:?}, connection: {}",
            status,
            connection
        );
        match (status, record) {
            (BleStatus::Ok, Some(record)) => {
                log::debug!(
                    "Service discovered: [start group: {}, end group: {}] [uuid: {}]",
                    record.start_group_handle,
                    record.end_group_handle,
                    record.uuid
                );
                for target in self.targets.iter_mut() {
                    if target.uuid == record.uuid {
                        target.discover(record.clone());
                        events.push(PeripheralEvent::ServiceDiscovered {
                            service: target.uuid,
                            record: record.clone(),
                        });
                    }
                }
            }
            (BleStatus::Ok, None) => {
                log::warn!("Service discovery reported OK without a service record")
            }
            (BleStatus::Done, _) => {
                log::info!("Discover services completed");
                for target in self.targets.iter() {
                    let Some(record) = target.record() else {
                        continue;
                    };
                    if let Err(err) = stack.discover_characteristics(connection, record) {
                        log::error!(
                            "Could not start characteristic discovery for {}: {}",
                            target.uuid,
                            err
                        );
                    }
                }
            }
            (status, _) => log::warn!("Service discovery failed with status {:?}", status),
        }
    }

    /// Phase two. Matching is restricted to the target whose discovered
    /// handle range contains the characteristic when scoping is enabled,
    /// otherwise every characteristic of every target is compared.
    pub fn on_characteristic_discovered(
        &mut self,
        status: BleStatus,
        connection: u16,
        record: Option<&CharacteristicRecord>,
        events: &mut Vec<PeripheralEvent>,
    ) {
        log::debug!(
            "Discover characteristic callback called, status: {:?}, connection: {}",
            status,
            connection
        );
        match (status, record) {
            (BleStatus::Ok, Some(record)) => {
                log::debug!(
                    "Characteristic discovered: [value handle: {}] [uuid: {}]",
                    record.value_handle,
                    record.uuid
                );
                let scope_matching = self.scope_matching;
                for target in self.targets.iter_mut() {
                    if scope_matching
                        && !target
                            .record()
                            .map_or(false, |service| service.contains(record.value_handle))
                    {
                        continue;
                    }
                    let service_uuid = target.uuid;
                    for characteristic in target.characteristics_mut() {
                        if characteristic.uuid == record.uuid {
                            characteristic.discover(record.clone());
                            events.push(PeripheralEvent::CharacteristicDiscovered {
                                service: service_uuid,
                                characteristic: characteristic.uuid,
                                record: record.clone(),
                            });
                        }
                    }
                }
            }
            (BleStatus::Ok, None) => {
                log::warn!("Characteristic discovery reported OK without a record")
            }
            (BleStatus::Done, _) => {
                let discovered = self.discovered_characteristics();
                log::info!(
                    "Discover characteristics completed, discovered: [{}]",
                    discovered
                        .iter()
                        .map(|uuid| uuid.to_string())
                        .collect::<Vec<String>>()
                        .join(", ")
                );
                events.push(PeripheralEvent::DiscoveryComplete { discovered });
            }
            (status, _) => log::warn!("Characteristic discovery failed with status {:?}", status),
        }
    }

    pub fn discovered_characteristics(&self) -> Vec<BleUuid> {
        self.targets
            .iter()
            .flat_map(|target| target.characteristics())
            .filter(|characteristic| characteristic.is_discovered())
            .map(|characteristic| characteristic.uuid)
            .collect()
    }

    pub fn queue_read(&mut self, value_handle: u16) -> oneshot::Receiver<Vec<u8>> {
        let (responder, receiver) = oneshot::channel();
        self.pending_reads
            .entry(value_handle)
            .or_default()
            .push_back(responder);
        receiver
    }

    pub fn pending_reads(&self, value_handle: u16) -> usize {
        self.pending_reads
            .get(&value_handle)
            .map_or(0, |queue| queue.len())
    }

    /// Hands a read result to the oldest pending read on `value_handle`.
    pub fn on_read_result(
        &mut self,
        status: BleStatus,
        value_handle: u16,
        value: &[u8],
        events: &mut Vec<PeripheralEvent>,
    ) {
        match status {
            BleStatus::Ok => {
                log::debug!("Read result for handle {}: {:?}", value_handle, value);
                if let Some(responder) = self.next_pending(value_handle) {
                    if responder.send(value.to_vec()).is_err() {
                        log::debug!("Reader of handle {} went away", value_handle);
                    }
                }
                events.push(PeripheralEvent::CharacteristicRead {
                    value_handle,
                    value: value.to_vec(),
                });
            }
            BleStatus::Done => log::debug!("Read of handle {} completed", value_handle),
            status => {
                log::warn!("Read of handle {} failed with status {:?}", value_handle, status);
                // dropping the responder fails the waiting receiver
                drop(self.next_pending(value_handle));
            }
        }
    }

    fn next_pending(&mut self, value_handle: u16) -> Option<oneshot::Sender<Vec<u8>>> {
        let queue = self.pending_reads.get_mut(&value_handle)?;
        let responder = queue.pop_front();
        if queue.is_empty() {
            self.pending_reads.remove(&value_handle);
        }
        responder
    }

    /// Called when the link drops.
    pub fn disconnect(&mut self, reset_targets: bool) {
        self.pending_reads.clear();
        if reset_targets {
            for target in self.targets.iter_mut() {
                target.reset();
            }
        }
    }
}
