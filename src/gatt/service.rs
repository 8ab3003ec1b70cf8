use super::characteristic::Characteristic;
use crate::uuid::BleUuid;

#[derive(Debug, Clone)]
pub struct Service {
    pub uuid: BleUuid,
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn new(uuid: BleUuid) -> Self {
        Service {
            uuid,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: Characteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }

    pub fn add_characteristic(&mut self, characteristic: Characteristic) {
        self.characteristics.push(characteristic);
    }

    pub fn characteristic(&self, uuid: &BleUuid) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|characteristic| characteristic.uuid == *uuid)
    }
}
