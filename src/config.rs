//! Tunables for the manager, advertising and the preferred connection
//! parameters published through the GAP service.

use crate::gatt::peripheral_event::PeripheralEvent;
use tokio::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AdvertisingType {
    ConnectableUndirected = 0x00,
    ConnectableDirected = 0x01,
    ScannableUndirected = 0x02,
    NonConnectableUndirected = 0x03,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressType {
    Public = 0x00,
    Random = 0x01,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FilterPolicy {
    Any = 0x00,
    FilterScanRequests = 0x01,
    FilterConnectionRequests = 0x02,
    FilterBoth = 0x03,
}

pub const CHANNEL_MAP_37: u8 = 0x01;
pub const CHANNEL_MAP_38: u8 = 0x02;
pub const CHANNEL_MAP_39: u8 = 0x04;
pub const CHANNEL_MAP_ALL: u8 = CHANNEL_MAP_37 | CHANNEL_MAP_38 | CHANNEL_MAP_39;

/// Advertising intervals are in 0.625 ms units, range `0x0020..=0x4000`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisingParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub advertising_type: AdvertisingType,
    pub direct_address_type: AddressType,
    pub direct_address: [u8; 6],
    pub channel_map: u8,
    pub filter_policy: FilterPolicy,
}

impl Default for AdvertisingParameters {
    fn default() -> Self {
        AdvertisingParameters {
            // 30 ms
            interval_min: 0x0030,
            interval_max: 0x0030,
            advertising_type: AdvertisingType::ConnectableUndirected,
            direct_address_type: AddressType::Public,
            direct_address: [0; 6],
            channel_map: CHANNEL_MAP_ALL,
            filter_policy: FilterPolicy::Any,
        }
    }
}

/// Peripheral preferred connection parameters.
///
/// Intervals are in 1.25 ms units (`0x0006..=0x0C80`), latency in connection
/// events (`0..=0x03E8`) and the supervision timeout in 10 ms units
/// (`0x000A..=0x0C80`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub interval_min: u16,
    pub interval_max: u16,
    pub slave_latency: u16,
    pub supervision_timeout: u16,
}

impl Default for ConnectionParameters {
    fn default() -> Self {
        ConnectionParameters {
            // 50 ms
            interval_min: 0x0028,
            // 500 ms
            interval_max: 0x0190,
            slave_latency: 0x0000,
            // 10 s
            supervision_timeout: 0x03E8,
        }
    }
}

impl ConnectionParameters {
    /// Little-endian layout of the PPCP characteristic value.
    pub fn to_bytes(&self) -> Vec<u8> {
        [
            self.interval_min,
            self.interval_max,
            self.slave_latency,
            self.supervision_timeout,
        ]
        .iter()
        .flat_map(|field| field.to_le_bytes())
        .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Receives connection, write, subscription and discovery events.
    pub events: Option<Sender<PeripheralEvent>>,
    /// Forget discovered services and characteristics when the link drops.
    pub reset_discovery_on_disconnect: bool,
    /// Only match a discovered characteristic against the target service
    /// whose handle range contains it.
    pub scope_characteristic_matching: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        ManagerConfig {
            events: None,
            reset_discovery_on_disconnect: true,
            scope_characteristic_matching: true,
        }
    }
}
