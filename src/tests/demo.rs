use crate::can::{BusError, CanError, ConfigError, Controller};
use crate::config::{BitRateConfig, CanBaudRate, Configuration, SysClk};
use crate::demo::{bring_up, BringUp, BringUpError, Demo, DemoError, DemoSettings, ReceiveMode};
use crate::example::{ExampleClock, ExampleSPIDevice};
use crate::frame::CanFrame;
use crate::mocks::{BusFault, MockController, MockLine, TestCanError, TestClock};
use crate::status::{InterruptCode, InterruptFlags, OperationMode, Status};
use crate::tests::can::Mocks;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use embedded_can::{ExtendedId, Frame, StandardId};
use embedded_hal_bus::spi::DeviceError;
use mockall::predicate::eq;
use mockall::Sequence;
use std::sync::Mutex;

const PAYLOAD: [u8; 8] = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];

fn settings(receive_mode: ReceiveMode) -> DemoSettings {
    DemoSettings {
        receive_mode,
        ..Default::default()
    }
}

fn standard_frame(length: usize) -> CanFrame {
    CanFrame::new(StandardId::new(0x123).unwrap(), &PAYLOAD[..length]).unwrap()
}

fn extended_frame(length: usize) -> CanFrame {
    CanFrame::new(ExtendedId::new(0x12345678).unwrap(), &PAYLOAD[..length]).unwrap()
}

fn bring_up_state(canstat: u8) -> BringUp {
    BringUp {
        canstat,
        interrupt_mask: InterruptFlags::from(0b1010_0011),
    }
}

fn bus_error() -> TestCanError {
    CanError::BusError(BusError::TransferError(DeviceError::Spi(BusFault(55))))
}

#[test]
fn test_default_settings() {
    let settings = DemoSettings::default();

    assert_eq!(ReceiveMode::Interrupt, settings.receive_mode);
    assert_eq!(PAYLOAD, settings.payload);
    assert_eq!(0x123, settings.standard_id);
    assert_eq!(0x12345678, settings.extended_id);
    assert_eq!(1000, settings.period_ms);
    assert_eq!(None, settings.cycle_limit);
}

#[test]
fn test_announce_interrupt_mode() {
    let mut demo = Demo::new(MockController::new(), String::new(), settings(ReceiveMode::Interrupt));
    demo.announce(&bring_up_state(0x40)).unwrap();

    assert_eq!(
        "Initialized successfully, interrupt mode.\n\
         CAN status reg: 40\n\
         Interrupt mask is a3\n",
        demo.console()
    );
}

#[test]
fn test_announce_not_in_loopback() {
    let mut demo = Demo::new(MockController::new(), String::new(), settings(ReceiveMode::Polling));
    demo.announce(&bring_up_state(0x80)).unwrap();

    assert_eq!(
        "Initialized successfully, polling mode.\n\
         CAN status reg: 80 (***should be c0 [loopback mode]; ignoring***)\n",
        demo.console()
    );
}

#[test]
fn test_announce_keeps_interrupt_code() {
    let state = bring_up_state(0b0100_1100);
    assert_eq!(OperationMode::Loopback, state.status().mode);
    assert_eq!(InterruptCode::RxBuffer0, state.status().interrupt_code);

    let mut demo = Demo::new(MockController::new(), String::new(), settings(ReceiveMode::Polling));
    demo.announce(&state).unwrap();

    assert_eq!(
        "Initialized successfully, polling mode.\n\
         CAN status reg: 4c\n",
        demo.console()
    );
}

#[test]
fn test_polling_cycle() {
    let mut controller = MockController::new();
    let mut seq = Sequence::new();

    controller
        .expect_transmit()
        .withf(|frame| *frame == standard_frame(8))
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);
    controller
        .expect_check_receive()
        .times(1)
        .return_const(Ok(true))
        .in_sequence(&mut seq);
    controller
        .expect_receive()
        .times(1)
        .return_const(Ok(standard_frame(8)))
        .in_sequence(&mut seq);
    controller
        .expect_transmit()
        .withf(|frame| *frame == extended_frame(8))
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);
    controller
        .expect_check_receive()
        .times(1)
        .return_const(Ok(false))
        .in_sequence(&mut seq);

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Polling));
    demo.cycle().unwrap();

    assert_eq!(
        "---------------------------------\n  \
         1 send normal------------------\n    \
         CAN id: 0x123 (8 bytes): 12 34 56 78 9a bc de f0\n  \
         1 send EFF---------------------\n",
        demo.console()
    );
    assert_eq!(1, demo.cycle_count());
}

#[test]
fn test_polling_cycle_failures() {
    let mut controller = MockController::new();
    let mut seq = Sequence::new();

    controller
        .expect_transmit()
        .times(1)
        .return_const(Err(CanError::TxBusy))
        .in_sequence(&mut seq);
    controller
        .expect_check_receive()
        .times(1)
        .return_const(Ok(true))
        .in_sequence(&mut seq);
    controller
        .expect_receive()
        .times(1)
        .return_const(Err(CanError::NoMessage))
        .in_sequence(&mut seq);
    controller
        .expect_transmit()
        .times(1)
        .return_const(Err(CanError::TransmitFailed))
        .in_sequence(&mut seq);
    controller
        .expect_check_receive()
        .times(1)
        .return_const(Ok(false))
        .in_sequence(&mut seq);

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Polling));
    demo.cycle().unwrap();

    assert_eq!(
        "---------------------------------\n  \
         1 -----------------receive FAIL\n",
        demo.console()
    );
}

#[test]
fn test_polling_cycle_bus_error() {
    let mut controller = MockController::new();
    controller.expect_transmit().times(1).return_const(Ok(()));
    controller
        .expect_check_receive()
        .times(1)
        .return_const(Err(bus_error()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Polling));

    assert_eq!(
        DemoError::Controller(bus_error()),
        demo.cycle().unwrap_err()
    );
}

#[test]
fn test_interrupt_cycle_payload_lengths() {
    let lengths = Arc::new(Mutex::new(Vec::new()));
    let sent = lengths.clone();

    let mut controller = MockController::new();
    controller.expect_transmit().times(20).returning(move |frame| {
        sent.lock().unwrap().push((frame.dlc(), frame.is_extended()));
        Ok(())
    });

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));
    for _ in 0..10 {
        demo.cycle().unwrap();
    }

    let expected: Vec<(usize, bool)> = [1, 2, 3, 4, 5, 6, 7, 8, 0, 1]
        .into_iter()
        .flat_map(|length| [(length, false), (length, true)])
        .collect();
    assert_eq!(expected, *lengths.lock().unwrap());
}

#[test]
fn test_interrupt_cycle_output() {
    let mut controller = MockController::new();
    let mut seq = Sequence::new();

    controller
        .expect_transmit()
        .withf(|frame| *frame == standard_frame(1))
        .times(1)
        .return_const(Err(CanError::TxBusy))
        .in_sequence(&mut seq);
    controller
        .expect_transmit()
        .withf(|frame| *frame == extended_frame(1))
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));
    demo.cycle().unwrap();

    assert_eq!(
        "---------------------------------\n  \
         1 send normal------------------\n  \
         1 -------------------------FAIL\n  \
         1 send EFF---------------------\n",
        demo.console()
    );
}

#[test]
fn test_invalid_identifier() {
    let settings = DemoSettings {
        standard_id: 0x800,
        ..Default::default()
    };

    let mut demo = Demo::new(MockController::new(), String::new(), settings);
    assert_eq!(DemoError::InvalidIdentifier, demo.cycle().unwrap_err());
}

#[test]
fn test_cycle_limit() {
    let mut controller = MockController::new();
    controller.expect_transmit().times(4).return_const(Ok(()));

    let settings = DemoSettings {
        cycle_limit: Some(2),
        ..Default::default()
    };

    let mut demo = Demo::new(controller, String::new(), settings);
    assert!(!demo.is_finished());

    demo.cycle().unwrap();
    assert!(!demo.is_finished());

    demo.cycle().unwrap();
    assert!(demo.is_finished());
}

#[test]
fn test_unlimited_cycles() {
    let mut controller = MockController::new();
    controller.expect_transmit().times(6).return_const(Ok(()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));
    for _ in 0..3 {
        demo.cycle().unwrap();
    }

    assert!(!demo.is_finished());
}

#[test]
fn test_on_interrupt_drains_all_frames() {
    let mut controller = MockController::new();
    let mut seq = Sequence::new();

    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_0011)))
        .in_sequence(&mut seq);
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b0000_0011)))
        .in_sequence(&mut seq);

    for frame in [standard_frame(2), extended_frame(0)] {
        controller
            .expect_check_receive()
            .times(1)
            .return_const(Ok(true))
            .in_sequence(&mut seq);
        controller
            .expect_receive()
            .times(1)
            .return_const(Ok(frame))
            .in_sequence(&mut seq);
    }

    controller
        .expect_check_receive()
        .times(1)
        .return_const(Ok(false))
        .in_sequence(&mut seq);
    controller
        .expect_clear_interrupts()
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(2, demo.on_interrupt().unwrap());
    assert_eq!(
        "    CAN id: 0x123 (2 bytes): 12 34\n    \
         CAN id: 0x12345678 (EFF) (0 bytes):\n",
        demo.console()
    );
}

#[test]
fn test_on_interrupt_receive_failure_stops_drain() {
    let mut controller = MockController::new();
    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_0001)));
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b0000_0001)));
    controller.expect_check_receive().times(1).return_const(Ok(true));
    controller
        .expect_receive()
        .times(1)
        .return_const(Err(CanError::InvalidFrame(15)));
    controller.expect_clear_interrupts().times(1).return_const(Ok(()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(0, demo.on_interrupt().unwrap());
    assert_eq!("  0 -----------------receive FAIL\n", demo.console());
}

#[test]
fn test_on_interrupt_non_read() {
    let mut controller = MockController::new();
    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_1000)));
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b0010_0100)));
    controller.expect_clear_interrupts().times(1).return_const(Ok(()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(0, demo.on_interrupt().unwrap());
    assert_eq!("    >>> Non-read interrupt:  intr 24 stat 08\n", demo.console());
}

#[test]
fn test_on_interrupt_in_polling_mode() {
    let mut controller = MockController::new();
    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_0001)));
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b0000_0001)));
    controller.expect_clear_interrupts().times(1).return_const(Ok(()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Polling));

    assert_eq!(0, demo.on_interrupt().unwrap());
    assert_eq!("Interrupt in polling mode?!  intr 01 stat 01\n", demo.console());
}

#[test]
fn test_arm_and_shutdown() {
    let mut line = MockLine::new();
    let mut seq = Sequence::new();
    line.expect_set_enabled()
        .with(eq(true))
        .times(1)
        .return_const(())
        .in_sequence(&mut seq);
    line.expect_set_enabled()
        .with(eq(false))
        .times(1)
        .return_const(())
        .in_sequence(&mut seq);

    let mut demo = Demo::new(MockController::new(), String::new(), settings(ReceiveMode::Interrupt));
    demo.arm(&mut line);
    demo.shutdown(&mut line).unwrap();

    assert_eq!("Stopped after 0 cycles\n", demo.console());
}

#[test]
fn test_arm_polling_mode_keeps_line_disabled() {
    let mut line = MockLine::new();
    line.expect_set_enabled().with(eq(true)).never();

    let demo = Demo::new(MockController::new(), String::new(), settings(ReceiveMode::Polling));
    demo.arm(&mut line);
}

fn simulated_demo(receive_mode: ReceiveMode) -> Demo<Controller<ExampleSPIDevice, ExampleClock>, String> {
    let clock = ExampleClock::default();
    let mut controller = Controller::new(ExampleSPIDevice::default());

    let status = bring_up(&mut controller, &Configuration::default(), &clock).unwrap();
    assert_eq!(0x40, status.canstat);
    assert_eq!(OperationMode::Loopback, status.status().mode);

    let mut demo = Demo::new(controller, String::new(), settings(receive_mode));
    demo.announce(&status).unwrap();
    demo
}

#[test]
fn test_simulated_polling_loopback() {
    let mut demo = simulated_demo(ReceiveMode::Polling);
    demo.cycle().unwrap();

    assert_eq!(
        "Initialized successfully, polling mode.\n\
         CAN status reg: 40\n\
         ---------------------------------\n  \
         1 send normal------------------\n    \
         CAN id: 0x123 (8 bytes): 12 34 56 78 9a bc de f0\n  \
         1 send EFF---------------------\n    \
         CAN id: 0x12345678 (EFF) (8 bytes): 12 34 56 78 9a bc de f0\n",
        demo.console()
    );
}

#[test]
fn test_simulated_interrupt_drain() {
    let mut demo = simulated_demo(ReceiveMode::Interrupt);
    demo.cycle().unwrap();

    assert_eq!(2, demo.on_interrupt().unwrap());
    assert!(demo.console().contains("Interrupt mask is a3\n"));
    assert!(demo.console().ends_with(
        "  1 send normal------------------\n  \
         1 send EFF---------------------\n    \
         CAN id: 0x123 (1 bytes): 12\n    \
         CAN id: 0x12345678 (EFF) (1 bytes): 12\n"
    ));

    let (controller, _) = demo.release();
    assert!(!controller.release().interrupt_asserted());
}

#[test]
fn test_simulated_receive_overflow() {
    let mut demo = simulated_demo(ReceiveMode::Interrupt);

    // Both receive buffers filled by the first cycle, the second cycle overflows
    demo.cycle().unwrap();
    demo.cycle().unwrap();

    assert!(demo.controller().has_error().unwrap());
    assert_eq!(2, demo.on_interrupt().unwrap());

    demo.controller().clear_rx_overflow().unwrap();
    assert!(!demo.controller().has_error().unwrap());
}

#[test]
fn test_on_interrupt_clears_flags_after_status_error() {
    let mut controller = MockController::new();
    let mut seq = Sequence::new();

    controller
        .expect_read_status()
        .times(1)
        .return_const(Err(bus_error()))
        .in_sequence(&mut seq);
    controller
        .expect_clear_interrupts()
        .times(1)
        .return_const(Ok(()))
        .in_sequence(&mut seq);

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(DemoError::Controller(bus_error()), demo.on_interrupt().unwrap_err());
}

#[test]
fn test_on_interrupt_clears_flags_after_drain_error() {
    let mut controller = MockController::new();
    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_0001)));
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b0000_0001)));
    controller.expect_check_receive().times(1).return_const(Err(bus_error()));
    controller.expect_clear_interrupts().times(1).return_const(Ok(()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(DemoError::Controller(bus_error()), demo.on_interrupt().unwrap_err());
}

#[test]
fn test_on_interrupt_clear_error() {
    let mut controller = MockController::new();
    controller
        .expect_read_status()
        .times(1)
        .return_const(Ok(Status::from(0b0000_0000)));
    controller
        .expect_read_interrupts()
        .times(1)
        .return_const(Ok(InterruptFlags::from(0b1000_0000)));
    controller.expect_clear_interrupts().times(1).return_const(Err(bus_error()));

    let mut demo = Demo::new(controller, String::new(), settings(ReceiveMode::Interrupt));

    assert_eq!(DemoError::Controller(bus_error()), demo.on_interrupt().unwrap_err());
    assert_eq!("    >>> Non-read interrupt:  intr 80 stat 00\n", demo.console());
}

#[test]
fn test_bring_up_configuration_failure() {
    let clock = TestClock::new(vec![]);
    let config = Configuration {
        bit_rate: BitRateConfig {
            sys_clk: SysClk::MHz20,
            can_speed: CanBaudRate::Kbps5,
        },
        ..Default::default()
    };

    let error = bring_up(&mut Mocks::default().into_controller(), &config, &clock).unwrap_err();

    assert_eq!(BringUpError::Configuration(ConfigError::UnsupportedBitRate), error);
    assert_eq!("Error initializing CAN!", error.message());
}

#[test]
fn test_bring_up_loopback_failure() {
    let clock = TestClock::new(vec![
        100,    // Config mode: Timer start
        10_000, // Normal mode: Timer start
        20_000, // Loopback mode: Timer start
        20_100, // Loopback mode: First expiration check
        40_000, // Loopback mode: Second expiration check (expired)
    ]);

    let mut mocks = Mocks::default();
    let mut seq = Sequence::new();

    mocks.mock_write(&[0xC0], &mut seq);
    mocks.mock_register_read(0x0E, 0b1000_0000, &mut seq);
    mocks.mock_configuration_writes([0x83, 0xE5, 0x40], 0x00, 0b1010_0011, &mut seq);
    mocks.mock_write(&[0x05, 0x0F, 0xE0, 0x00], &mut seq);
    mocks.mock_register_read(0x0E, 0b0000_0000, &mut seq);

    // Loopback requested, device stays in normal mode
    mocks.mock_write(&[0x05, 0x0F, 0xE0, 0x40], &mut seq);
    mocks.mock_register_read(0x0E, 0b0000_0000, &mut seq);
    mocks.mock_register_read(0x0E, 0b0000_0000, &mut seq);

    let error = bring_up(&mut mocks.into_controller(), &Configuration::default(), &clock).unwrap_err();

    assert_eq!(BringUpError::Loopback(ConfigError::RequestModeTimeout), error);
    assert_eq!("Error setting CAN loopback!", error.message());
}
