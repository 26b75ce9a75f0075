//! 门面层性质：任意设备号与输入下，周期帧的 ID 与需求值和协议层换算一致

use proptest::prelude::*;
use robocan_sdk::can::MockBus;
use robocan_sdk::prelude::*;
use robocan_sdk::protocol::talon::{self, Control1, TalonMode};
use std::sync::Arc;

proptest! {
    #[test]
    fn duty_cycle_demand_on_bus(device in 0u8..64, value in -2.0f64..2.0, inverted in any::<bool>()) {
        let bus = Arc::new(MockBus::new());
        let ctx = DeviceContext::new(bus.clone(), SafetyRegistry::new())
            .with_clock(Arc::new(ManualClock::new()));
        let talon = TalonSrx::new(&ctx, device).unwrap();
        talon.set_inverted(inverted);
        talon.set(value).unwrap();

        let id = talon::CONTROL_1 | u32::from(device);
        let (frame, period) = bus.periodic(id).unwrap();
        prop_assert_eq!(period, 10);

        let control = Control1::from_payload(&frame.data);
        let expected = talon::duty_cycle_to_demand(if inverted { -value } else { value });
        prop_assert_eq!(control.demand, expected);
        prop_assert!(control.demand.abs() <= 1023);
        prop_assert_eq!(control.mode().unwrap(), TalonMode::DutyCycle);
        prop_assert_eq!(talon.get(), value);
    }

    #[test]
    fn pdp_rejects_out_of_range_channels(channel in 16u8..=255) {
        let bus = Arc::new(MockBus::new());
        let ctx = DeviceContext::new(bus, SafetyRegistry::new());
        let pdp = Pdp::new(&ctx, 0).unwrap();
        prop_assert!(pdp.current(channel).is_err());
    }
}
