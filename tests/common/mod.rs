#![allow(dead_code)]

use ble_gatt_dispatch::{
    config::ManagerConfig, gatt::peripheral_event::PeripheralEvent, radio::loopback::LoopbackStack,
    Manager,
};
use std::sync::Arc;
use tokio::sync::mpsc;

pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

pub fn manager(first_handle: u16) -> (Arc<LoopbackStack>, Manager) {
    manager_with_config(first_handle, ManagerConfig::default())
}

pub fn manager_with_config(first_handle: u16, config: ManagerConfig) -> (Arc<LoopbackStack>, Manager) {
    init_logging();
    let stack = Arc::new(LoopbackStack::with_first_handle(first_handle));
    let manager = Manager::new(stack.clone(), config).expect("manager should attach");
    (stack, manager)
}

pub fn manager_with_events(
    first_handle: u16,
) -> (Arc<LoopbackStack>, Manager, mpsc::Receiver<PeripheralEvent>) {
    let (sender, receiver) = mpsc::channel(64);
    let config = ManagerConfig {
        events: Some(sender),
        ..Default::default()
    };
    let (stack, manager) = manager_with_config(first_handle, config);
    (stack, manager, receiver)
}

pub fn drain(receiver: &mut mpsc::Receiver<PeripheralEvent>) -> Vec<PeripheralEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}
