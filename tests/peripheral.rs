//! Attribute server behaviour driven through the loopback radio stack.

mod common;

use ble_gatt_dispatch::{
    config::{AdvertisingParameters, ConnectionParameters},
    error::ErrorType,
    gatt::{
        att::AttError,
        characteristic::Characteristic,
        descriptor::Descriptor,
        peripheral_event::PeripheralEvent,
        properties::Properties,
        service::Service,
        standard,
    },
    manager::{subscription::PushSkipped, subscription::SubscriptionState, LinkState},
    radio::{loopback::StackCall, BleStatus},
    uuid::BleUuid,
};

const SERVICE: BleUuid = BleUuid::from_u128(0x9a7e8b1d_ea49_40d6_b575_406ad07f8816);
const LED: BleUuid = BleUuid::from_u128(0xb8f1b6a4_5b65_4c1f_9a7f_3f0e6f2c1a01);
const LEVEL: BleUuid = BleUuid::from_u128(0xb8f1b6a4_5b65_4c1f_9a7f_3f0e6f2c1a02);
const STATUS: BleUuid = BleUuid::from_u128(0xb8f1b6a4_5b65_4c1f_9a7f_3f0e6f2c1a03);

#[test]
fn mutable_characteristic_write_then_read() {
    let (stack, manager) = common::manager(3);
    let handles = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LED,
            vec![0],
            Properties::empty(),
        )))
        .unwrap();
    assert_eq!(handles, vec![5]);

    assert_eq!(stack.simulate_write(5, &[1]), Some(AttError::Ok.code()));
    assert_eq!(manager.value(5), Some(vec![1]));

    let mut buffer = [0u8; 1];
    assert_eq!(stack.simulate_read(5, Some(&mut buffer)), Some(1));
    assert_eq!(buffer, [1]);
}

#[test]
fn read_reports_full_length_when_buffer_is_short() {
    let (stack, manager) = common::manager(1);
    let handles = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_static(
            LED,
            b"Boost Robot".to_vec(),
            Properties::empty(),
        )))
        .unwrap();

    assert_eq!(stack.simulate_read(handles[0], None), Some(11));

    let mut buffer = [0u8; 5];
    assert_eq!(stack.simulate_read(handles[0], Some(&mut buffer)), Some(11));
    assert_eq!(&buffer, b"Boost");
}

#[test]
fn indication_requires_client_configuration() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_indicate(
            STATUS,
            vec![7],
            Properties::empty(),
        )))
        .unwrap()[0];

    assert_eq!(manager.send_indicate(handle), Err(PushSkipped::NotEnabled));
    assert!(stack.pushes().is_empty());

    // byte 0 carries the indication enable code
    assert_eq!(stack.simulate_write(handle + 1, &[2, 0]), Some(AttError::Ok.code()));
    assert_eq!(manager.subscription(handle), Some(SubscriptionState::IndicateEnabled));

    assert_eq!(manager.send_indicate(handle), Ok(()));
    assert_eq!(
        stack.pushes(),
        vec![StackCall::Indicate {
            handle,
            value: vec![7],
        }]
    );
}

#[test]
fn notify_enable_code_does_not_enable_indications() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_indicate(
            STATUS,
            vec![7],
            Properties::empty(),
        )))
        .unwrap()[0];

    stack.simulate_write(handle + 1, &[1, 0]);
    assert_eq!(manager.send_indicate(handle), Err(PushSkipped::NotEnabled));
    assert!(stack.pushes().is_empty());
}

#[test]
fn notify_write_pushes_new_value_to_subscriber() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_notify(
            LEVEL,
            vec![0],
            Properties::WRITE,
        )))
        .unwrap()[0];
    stack.simulate_write(handle + 1, &[1, 0]);

    assert_eq!(manager.set_value(handle, &[42]), AttError::Ok);
    assert_eq!(
        stack.pushes(),
        vec![StackCall::Notify {
            handle,
            value: vec![42],
        }]
    );
}

#[test]
fn busy_server_skips_notification_but_keeps_value() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_notify(
            LEVEL,
            vec![0],
            Properties::empty(),
        )))
        .unwrap()[0];
    stack.simulate_write(handle + 1, &[1, 0]);
    stack.set_can_send_packet(false);

    assert_eq!(manager.set_value(handle, &[9]), AttError::Ok);
    assert_eq!(manager.value(handle), Some(vec![9]));
    assert_eq!(manager.send_notify(handle), Err(PushSkipped::ServerBusy));
    assert!(stack.pushes().is_empty());
}

#[test]
fn rejected_push_is_reported() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_notify(
            LEVEL,
            vec![0],
            Properties::empty(),
        )))
        .unwrap()[0];
    stack.simulate_write(handle + 1, &[1, 0]);
    stack.set_reject_pushes(true);

    assert!(matches!(
        manager.send_notify(handle),
        Err(PushSkipped::StackRejected(_))
    ));
}

#[test]
fn pushes_without_client_configuration_are_skipped() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LED,
            vec![0],
            Properties::empty(),
        )))
        .unwrap()[0];

    assert_eq!(manager.send_notify(handle), Err(PushSkipped::NoClientConfiguration));
    assert_eq!(manager.send_indicate(99), Err(PushSkipped::NotRegistered));
    assert_eq!(manager.subscription(handle), None);
    assert!(stack.pushes().is_empty());
}

#[test]
fn unknown_handles_are_answered_without_touching_state() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LED,
            vec![3],
            Properties::empty(),
        )))
        .unwrap()[0];

    let mut buffer = [0xAAu8; 4];
    assert_eq!(stack.simulate_read(99, Some(&mut buffer)), Some(0));
    assert_eq!(buffer, [0xAA; 4]);

    assert_eq!(
        stack.simulate_write(99, &[1, 2]),
        Some(AttError::UnlikelyError.code())
    );
    assert_eq!(manager.value(handle), Some(vec![3]));
    assert_eq!(manager.set_value(99, &[1]), AttError::InvalidHandle);
}

#[test]
fn writes_to_read_only_attributes_are_rejected() {
    let (stack, manager) = common::manager(1);
    let handle = manager
        .add_service(
            Service::new(SERVICE).with_characteristic(
                Characteristic::new_static(LED, vec![1], Properties::empty()).with_descriptor(
                    Descriptor::new_static(BleUuid::from_u16(0x2901), b"Led".to_vec()),
                ),
            ),
        )
        .unwrap()[0];

    assert_eq!(stack.simulate_write(handle, &[2]), Some(AttError::UnlikelyError.code()));
    assert_eq!(manager.value(handle), Some(vec![1]));

    // static characteristic: value handle, then the explicit descriptor
    assert_eq!(
        stack.simulate_write(handle + 1, b"x"),
        Some(AttError::WriteNotPermitted.code())
    );
    assert_eq!(manager.value(handle + 1), Some(b"Led".to_vec()));
}

#[test]
fn disconnect_resets_every_subscription() {
    let (stack, manager) = common::manager(1);
    let handles = manager
        .add_service(
            Service::new(SERVICE)
                .with_characteristic(Characteristic::new_notify(LEVEL, vec![0], Properties::empty()))
                .with_characteristic(Characteristic::new_indicate(STATUS, vec![0], Properties::empty())),
        )
        .unwrap();

    stack.simulate_connected(BleStatus::Ok, 0x40);
    stack.simulate_write(handles[0] + 1, &[1, 0]);
    stack.simulate_write(handles[1] + 1, &[2, 0]);
    assert_eq!(manager.subscription(handles[0]), Some(SubscriptionState::NotifyEnabled));
    assert_eq!(manager.subscription(handles[1]), Some(SubscriptionState::IndicateEnabled));

    stack.simulate_disconnected(0x40);
    for handle in handles {
        assert_eq!(manager.value(handle + 1), Some(vec![0, 0]));
        assert_eq!(manager.subscription(handle), Some(SubscriptionState::Disabled));
    }
    assert!(!manager.is_connected());
}

#[test]
fn connection_state_follows_stack_callbacks() {
    let (stack, manager) = common::manager(1);
    manager.set_advertising_parameters(&AdvertisingParameters::default()).unwrap();
    manager.set_advertisement_data(&[0x02, 0x01, 0x06]).unwrap();
    manager.start_advertising().unwrap();
    assert_eq!(manager.link_state(), LinkState::Advertising);

    stack.simulate_connected(BleStatus::ConnectionTimeout, 0x40);
    assert_eq!(manager.link_state(), LinkState::Advertising);
    assert_eq!(manager.connection_handle(), None);

    stack.simulate_connected(BleStatus::Ok, 0x40);
    assert!(manager.is_connected());
    assert_eq!(manager.connection_handle(), Some(0x40));

    stack.simulate_disconnected(0x40);
    assert_eq!(manager.link_state(), LinkState::Idle);
    assert_eq!(manager.connection_handle(), None);
}

#[test]
fn registration_closes_once_advertising_starts() {
    let (stack, manager) = common::manager(1);
    manager.start_advertising().unwrap();
    assert!(stack.calls().contains(&StackCall::StartAdvertising));

    let err = manager.add_service(Service::new(SERVICE)).unwrap_err();
    assert_eq!(err.error_type(), &ErrorType::Registration);

    manager.stop_advertising().unwrap();
    assert_eq!(manager.link_state(), LinkState::Idle);
    assert!(manager.add_service(Service::new(SERVICE)).is_err());
}

#[test]
fn stock_services_register_in_order() {
    let (stack, manager) = common::manager(1);
    let gap = manager
        .add_service(standard::gap_service(
            "Boost",
            standard::APPEARANCE_UNKNOWN,
            &ConnectionParameters::default(),
        ))
        .unwrap();
    let gatt = manager.add_service(standard::gatt_service()).unwrap();

    // 0x1800 at 1, three static characteristics, then 0x1801 at 8
    assert_eq!(gap, vec![3, 5, 7]);
    assert_eq!(gatt, vec![10]);
    assert_eq!(manager.characteristic_handle(&standard::DEVICE_NAME), Some(3));
    assert_eq!(manager.characteristic_handle(&standard::SERVICE_CHANGED), Some(10));
    assert_eq!(manager.value(3), Some(b"Boost".to_vec()));
    assert_eq!(manager.value(5), Some(vec![0, 0]));
    assert_eq!(
        stack.calls()[1..3].to_vec(),
        vec![
            StackCall::AddService(standard::GAP_SERVICE),
            StackCall::AddCharacteristic {
                uuid: standard::DEVICE_NAME,
                properties: Properties::READ,
                value: b"Boost".to_vec(),
                handle: 3,
            },
        ]
    );
}

#[test]
fn service_changed_is_indicated_on_connect_when_enabled() {
    let (stack, manager) = common::manager(1);
    let handle = manager.add_service(standard::gatt_service()).unwrap()[0];
    manager.set_service_changed(handle).unwrap();

    stack.simulate_connected(BleStatus::Ok, 1);
    assert!(stack.pushes().is_empty());

    stack.simulate_write(handle + 1, &[2, 0]);
    stack.simulate_connected(BleStatus::Ok, 1);
    assert_eq!(
        stack.pushes(),
        vec![StackCall::Indicate {
            handle,
            value: vec![0x00, 0x00, 0xFF, 0xFF],
        }]
    );
}

#[test]
fn service_changed_must_be_an_indicate_characteristic() {
    let (_stack, manager) = common::manager(1);
    let handle = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LED,
            vec![0],
            Properties::empty(),
        )))
        .unwrap()[0];
    assert!(manager.set_service_changed(handle).is_err());
    assert!(manager.set_service_changed(99).is_err());
}

#[test]
fn remote_writes_are_reported_as_events() {
    let (stack, manager, mut events) = common::manager_with_events(1);
    let handles = manager
        .add_service(
            Service::new(SERVICE)
                .with_characteristic(Characteristic::new_mutable(LED, vec![0], Properties::empty()))
                .with_characteristic(Characteristic::new_notify(LEVEL, vec![0], Properties::empty())),
        )
        .unwrap();

    stack.simulate_connected(BleStatus::Ok, 7);
    stack.simulate_write(handles[0], &[1]);
    stack.simulate_write(handles[1] + 1, &[1, 0]);
    stack.simulate_write(99, &[1]);
    stack.simulate_disconnected(7);

    assert_eq!(
        common::drain(&mut events),
        vec![
            PeripheralEvent::ConnectionUpdate {
                connection: 7,
                connected: true,
            },
            PeripheralEvent::WriteRequest {
                handle: handles[0],
                characteristic: LED,
                value: vec![1],
                response: AttError::Ok,
            },
            PeripheralEvent::SubscriptionUpdate {
                handle: handles[1],
                characteristic: LEVEL,
                state: SubscriptionState::NotifyEnabled,
            },
            PeripheralEvent::ConnectionUpdate {
                connection: 7,
                connected: false,
            },
        ]
    );
}

#[test]
fn dropping_the_manager_releases_the_stack() {
    let (stack, manager) = common::manager(1);
    manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LED,
            vec![0],
            Properties::empty(),
        )))
        .unwrap();
    drop(manager);

    assert_eq!(stack.calls().last(), Some(&StackCall::Deinit));
    assert_eq!(stack.simulate_read(3, None), None);
    assert_eq!(stack.simulate_write(3, &[1]), None);
}

#[test]
fn failed_service_leaves_no_handles_behind() {
    let (stack, manager) = common::manager(1);
    stack.set_reject_descriptors(true);
    let err = manager
        .add_service(
            Service::new(SERVICE).with_characteristic(
                Characteristic::new_mutable(LED, vec![1], Properties::empty()).with_descriptor(
                    Descriptor::new_static(BleUuid::from_u16(0x2901), b"Led".to_vec()),
                ),
            ),
        )
        .unwrap_err();
    assert_eq!(err.error_type(), &ErrorType::RadioStack);
    assert_eq!(manager.attribute(3), None);

    stack.set_reject_descriptors(false);
    let handles = manager
        .add_service(Service::new(SERVICE).with_characteristic(Characteristic::new_mutable(
            LEVEL,
            vec![9],
            Properties::empty(),
        )))
        .unwrap();
    assert_eq!(handles, vec![6]);

    assert_eq!(manager.value(3), None);
    assert_eq!(stack.simulate_read(3, None), Some(0));
    assert_eq!(stack.simulate_write(3, &[0x55]), Some(AttError::UnlikelyError.code()));
    assert_eq!(manager.set_value(3, &[0x55]), AttError::InvalidHandle);
    assert_eq!(manager.value(6), Some(vec![9]));
    assert_eq!(manager.characteristic_handle(&LED), None);
}
