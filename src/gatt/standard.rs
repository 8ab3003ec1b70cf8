//! The two services every peripheral exposes: Generic Access and
//! Generic Attribute.

use super::{characteristic::Characteristic, properties::Properties, service::Service};
use crate::{config::ConnectionParameters, uuid::BleUuid};

pub const GAP_SERVICE: BleUuid = BleUuid::from_u16(0x1800);
pub const GATT_SERVICE: BleUuid = BleUuid::from_u16(0x1801);
pub const DEVICE_NAME: BleUuid = BleUuid::from_u16(0x2A00);
pub const APPEARANCE: BleUuid = BleUuid::from_u16(0x2A01);
pub const PERIPHERAL_PREFERRED_CONNECTION_PARAMETERS: BleUuid = BleUuid::from_u16(0x2A04);
pub const SERVICE_CHANGED: BleUuid = BleUuid::from_u16(0x2A05);

pub const APPEARANCE_UNKNOWN: u16 = 0x0000;

/// Affected handle range covering the whole database.
const SERVICE_CHANGED_ALL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

pub fn gap_service(name: &str, appearance: u16, connection: &ConnectionParameters) -> Service {
    Service::new(GAP_SERVICE)
        .with_characteristic(Characteristic::new_static(
            DEVICE_NAME,
            name.as_bytes().to_vec(),
            Properties::empty(),
        ))
        .with_characteristic(Characteristic::new_static(
            APPEARANCE,
            appearance.to_le_bytes().to_vec(),
            Properties::empty(),
        ))
        .with_characteristic(Characteristic::new_static(
            PERIPHERAL_PREFERRED_CONNECTION_PARAMETERS,
            connection.to_bytes(),
            Properties::empty(),
        ))
}

/// Hand the service-changed handle to `Manager::set_service_changed` after
/// registration to have it indicated on every connection.
pub fn gatt_service() -> Service {
    Service::new(GATT_SERVICE).with_characteristic(Characteristic::new_indicate(
        SERVICE_CHANGED,
        SERVICE_CHANGED_ALL.to_vec(),
        Properties::empty(),
    ))
}
