//! 看门狗：按时喂食不触发，停止喂食后只触发一次

use robocan_sdk::can::MockBus;
use robocan_sdk::prelude::*;
use robocan_sdk::protocol::talon::TalonMode;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn control_mode(bus: &MockBus, id: u32) -> TalonMode {
    let (frame, _) = bus.periodic(id).unwrap();
    robocan_sdk::protocol::talon::Control1::from_payload(&frame.data)
        .mode()
        .unwrap()
}

#[test]
fn test_fed_motor_never_stops() {
    let bus = Arc::new(MockBus::new());
    let clock = Arc::new(ManualClock::new());
    let registry = SafetyRegistry::new();
    let ctx = DeviceContext::new(bus.clone(), registry.clone()).with_clock(clock.clone());
    let talon = TalonSrx::new(&ctx, 4).unwrap();

    talon.set(0.3).unwrap();
    let half = talon.safety().expiration() / 2;
    for _ in 0..50 {
        clock.advance(half);
        talon.feed();
        assert_eq!(registry.check_motors(), 0);
    }
    assert_eq!(control_mode(&bus, 0x0204_0004), TalonMode::DutyCycle);
}

#[test]
fn test_starved_motor_stops_once_until_fed() {
    let bus = Arc::new(MockBus::new());
    let clock = Arc::new(ManualClock::new());
    let registry = SafetyRegistry::new();
    let ctx = DeviceContext::new(bus.clone(), registry.clone()).with_clock(clock.clone());
    let talon = TalonSrx::new(&ctx, 6).unwrap();
    talon.set(0.3).unwrap();

    let expiration = talon.safety().expiration();
    clock.advance(expiration - Duration::from_millis(1));
    assert_eq!(registry.check_motors(), 0);

    clock.advance(Duration::from_millis(2));
    assert_eq!(registry.check_motors(), 1);
    assert_eq!(control_mode(&bus, 0x0204_0006), TalonMode::NoDrive);
    for _ in 0..5 {
        clock.advance(expiration);
        assert_eq!(registry.check_motors(), 0);
    }

    talon.set(0.3).unwrap();
    assert_eq!(control_mode(&bus, 0x0204_0006), TalonMode::DutyCycle);
    clock.advance(expiration + Duration::from_millis(1));
    assert_eq!(registry.check_motors(), 1);
}

#[test]
fn test_sweeper_thread_stops_motors() {
    let bus = Arc::new(MockBus::new());
    let registry = SafetyRegistry::new();
    let mut config = RobocanConfig::default();
    config.safety.expiration_ms = 20;
    let ctx = DeviceContext::new(bus.clone(), registry.clone()).with_config(config.clone());
    let jaguar = Jaguar::new(&ctx, 12).unwrap();
    jaguar.set(0.5).unwrap();
    assert!(jaguar.is_control_enabled());

    let sweeper = SafetySweeper::spawn(registry, config.safety.sweep_period()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(2);
    while jaguar.is_control_enabled() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    drop(sweeper);
    assert!(!jaguar.is_control_enabled());
}
