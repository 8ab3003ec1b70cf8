use std::{
    io::{self, BufRead},
    sync::Arc,
};
use tokio::{runtime::Builder, sync::mpsc};

use ble_gatt_dispatch::{
    config::{ConnectionParameters, ManagerConfig},
    gatt::{
        characteristic::Characteristic,
        descriptor::Descriptor,
        peripheral_event::PeripheralEvent,
        properties::Properties,
        service::Service,
        standard,
    },
    radio::{loopback::LoopbackStack, BleStatus},
    uuid::BleUuid,
    Manager,
};

fn main() {
    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    runtime.block_on(start_app());
}

async fn start_app() {
    std::env::set_var("RUST_LOG", "info");
    if let Err(err) = pretty_env_logger::try_init() {
        eprintln!("WARNING: failed to initialize logging framework: {}", err);
    }

    let led_uuid = BleUuid::parse("8d8ba32b-96be-4590-910b-c756c5222c9f").unwrap();
    let counter_uuid = BleUuid::from_u16(0x2A3D);

    // Define Service With Characteristics
    let service = Service::new(BleUuid::from_u16(0x1234))
        .with_characteristic(Characteristic::new_mutable(led_uuid, vec![0], Properties::empty()))
        .with_characteristic(
            Characteristic::new_notify(counter_uuid, vec![0], Properties::empty()).with_descriptor(
                Descriptor::new_static(BleUuid::from_u16(0x2901), b"Counter".to_vec()),
            ),
        );

    let (sender_tx, mut receiver_rx) = mpsc::channel::<PeripheralEvent>(256);

    let stack = Arc::new(LoopbackStack::new());
    let manager = Manager::new(
        stack.clone(),
        ManagerConfig {
            events: Some(sender_tx),
            ..Default::default()
        },
    )
    .unwrap();

    // Handle Updates
    tokio::spawn(async move {
        while let Some(event) = receiver_rx.recv().await {
            handle_updates(event);
        }
    });

    let gap = standard::gap_service(
        "RustBLE",
        standard::APPEARANCE_UNKNOWN,
        &ConnectionParameters::default(),
    );
    for service in [gap, standard::gatt_service(), service] {
        if let Err(err) = manager.add_service(service) {
            log::error!("Error adding service: {}", err);
            return;
        }
    }
    log::info!("Services Added");

    if let Some(handle) = manager.characteristic_handle(&standard::SERVICE_CHANGED) {
        manager.set_service_changed(handle).unwrap();
    }

    if let Err(err) = manager.start_advertising() {
        log::error!("Error starting advertising: {}", err);
        return;
    }
    log::info!("Advertising Started");

    // Play the remote client: connect, subscribe to the counter and toggle the LED
    let counter = manager.characteristic_handle(&counter_uuid).unwrap();
    let led = manager.characteristic_handle(&led_uuid).unwrap();
    stack.simulate_connected(BleStatus::Ok, 0x40);
    stack.simulate_write(counter + 1, &[1, 0]);
    stack.simulate_write(led, &[1]);

    // Write in console to send a counter update to the subscribed client
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(input) => {
                println!("Writing: {input} to {counter_uuid}");
                manager.set_value(counter, input.as_bytes());
                log::info!("Pushed so far: {}", stack.pushes().len());
            }
            Err(err) => {
                log::error!("Error reading from console: {}", err);
                break;
            }
        }
    }
}

/// Listen to all updates
pub fn handle_updates(update: PeripheralEvent) {
    match update {
        PeripheralEvent::ConnectionUpdate {
            connection,
            connected,
        } => {
            log::info!("ConnectionUpdate: {connection:#06x} Connected: {connected}")
        }
        PeripheralEvent::WriteRequest {
            handle,
            characteristic,
            value,
            response,
        } => {
            log::info!("WriteRequest: {characteristic} ({handle}) Value: {value:?} {response:?}")
        }
        PeripheralEvent::SubscriptionUpdate {
            handle,
            characteristic,
            state,
        } => {
            log::info!("SubscriptionUpdate: {characteristic} ({handle}) {state:?}")
        }
        other => log::info!("{other:?}"),
    }
}
