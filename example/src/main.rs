#![no_std]
#![no_main]

pub mod board;
pub mod clock;
pub mod mutex;

use crate::board::{AttachError, BoardDevice, BoardInt, BoardResources, BreakoutPins, JoyItPins};
use crate::clock::SystemClock;
use crate::mutex::Mutex;
use core::convert::Infallible;
use core::fmt::Write;
use embedded_hal::digital::StatefulOutputPin;
use embedded_hal_bus::spi::{DeviceError, ExclusiveDevice};
use hal::clocks::Clock;
use hal::fugit::RateExtU32;
use hal::gpio::FunctionUart;
use hal::pac;
use hal::pac::interrupt;
use hal::uart::{DataBits, StopBits, UartConfig, UartPeripheral};
use log::warn;
use mcp2515::board::{select_board, BoardError, BoardSelection};
use mcp2515::can::Controller;
use mcp2515::config::Configuration;
use mcp2515::demo::{bring_up, BringUp, BringUpError, Demo, DemoSettings, ReceiveMode};
use panic_halt as _;
use rp2040_hal as hal;

#[link_section = ".boot2"]
#[used]
pub static BOOT2: [u8; 256] = rp2040_boot2::BOOT_LOADER_GENERIC_03H;

const XTAL_FREQ_HZ: u32 = 12_000_000u32;

/// Board wiring, either a profile name or detection among all known boards
const BOARD: BoardSelection<'static> = BoardSelection::Auto;

const RECEIVE_MODE: ReceiveMode = ReceiveMode::Interrupt;

/// The demo stops after one minute
const CYCLE_LIMIT: Option<u32> = Some(60);

type Console = UartPeripheral<
    hal::uart::Enabled,
    pac::UART0,
    (
        hal::gpio::Pin<hal::gpio::bank0::Gpio0, FunctionUart, hal::gpio::PullDown>,
        hal::gpio::Pin<hal::gpio::bank0::Gpio1, FunctionUart, hal::gpio::PullDown>,
    ),
>;

type BoardController = Controller<BoardDevice, SystemClock>;

static CLOCK: SystemClock = SystemClock::default();

static DEMO: Mutex<Option<Demo<BoardController, Console>>> = Mutex::new(None);

static INT_LINE: Mutex<Option<BoardInt>> = Mutex::new(None);

#[derive(Debug)]
enum AttemptError {
    Attach(AttachError),
    BringUp(BringUpError<DeviceError<Infallible, Infallible>>),
}

impl AttemptError {
    fn message(&self) -> &'static str {
        match self {
            Self::Attach(_) => "Error initializing CAN!",
            Self::BringUp(error) => error.message(),
        }
    }
}

#[rp2040_hal::entry]
fn main() -> ! {
    let mut pac = pac::Peripherals::take().unwrap();
    let core = pac::CorePeripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // Configure the clocks
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    let timer = hal::Timer::new(pac.TIMER, &mut pac.RESETS, &clocks);
    CLOCK.initialize(timer);

    let mut delay = cortex_m::delay::Delay::new(core.SYST, clocks.system_clock.freq().to_Hz());

    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(pac.IO_BANK0, pac.PADS_BANK0, sio.gpio_bank0, &mut pac.RESETS);

    // On-board LED of the Pico, toggled once per cycle
    let mut led = pins.gpio25.into_push_pull_output();

    // UART0 on GPIO0/GPIO1 as console
    let uart_pins = (
        pins.gpio0.into_function::<FunctionUart>(),
        pins.gpio1.into_function::<FunctionUart>(),
    );
    let mut console: Console = UartPeripheral::new(pac.UART0, uart_pins, &mut pac.RESETS)
        .enable(
            UartConfig::new(115_200.Hz(), DataBits::Eight, None, StopBits::One),
            clocks.peripheral_clock.freq(),
        )
        .unwrap();

    let mut resources = BoardResources {
        spi: Some(pac.SPI0),
        joy_it: Some(JoyItPins {
            interrupt: pins.gpio15,
            chip_select: pins.gpio9,
            clock: pins.gpio18,
            data_out: pins.gpio19,
            data_in: pins.gpio16,
        }),
        breakout: Some(BreakoutPins {
            interrupt: pins.gpio6,
            chip_select: pins.gpio5,
            clock: pins.gpio2,
            data_out: pins.gpio3,
            data_in: pins.gpio4,
        }),
    };

    let config = Configuration::default();
    let peripheral_frequency = clocks.peripheral_clock.freq();

    let selection = select_board(BOARD, |profile| {
        let (mut bus, mut pin_cs, int_line) = resources
            .attach(profile, &mut pac.RESETS, peripheral_frequency)
            .map_err(AttemptError::Attach)?;

        // Bring-up through borrowed bus and CS pin, so SPI0 can be released again on failure
        let result = {
            let device = ExclusiveDevice::new_no_delay(&mut bus, &mut pin_cs).unwrap_or_else(|error| match error {});
            bring_up(&mut Controller::new(device), &config, &CLOCK)
        };

        match result {
            Ok(status) => Ok((bus, pin_cs, status, int_line)),
            Err(error) => {
                resources.detach(bus);
                Err(AttemptError::BringUp(error))
            }
        }
    });

    let (profile, (bus, pin_cs, status, int_line)) = match selection {
        Ok(result) => result,
        Err(error) => {
            warn!("Board selection failed: {error:?}");

            let message = match &error {
                BoardError::BringUpFailed(attempt) | BoardError::NoBoardResponded(Some(attempt)) => attempt.message(),
                _ => "Error initializing CAN!",
            };
            let _ = writeln!(console, "{message}");
            halt();
        }
    };

    // The driver keeps no device state, the configuration done during detection stays in effect
    let device = ExclusiveDevice::new_no_delay(bus, pin_cs).unwrap_or_else(|error| match error {});
    let controller: BoardController = Controller::new(device);

    let _ = writeln!(console, "Board: {}", profile.name);

    let settings = DemoSettings {
        receive_mode: RECEIVE_MODE,
        cycle_limit: CYCLE_LIMIT,
        ..Default::default()
    };

    start(controller, console, settings, &status, int_line);

    loop {
        let finished = DEMO.access(|demo| match demo {
            Some(demo) => {
                if let Err(error) = demo.cycle() {
                    warn!("Demo cycle failed: {error:?}");
                }
                demo.is_finished()
            }
            None => true,
        });

        let _ = led.toggle();

        if finished {
            break;
        }

        delay.delay_ms(settings.period_ms);
    }

    // Shutdown
    pac::NVIC::mask(pac::Interrupt::IO_IRQ_BANK0);
    INT_LINE.access(|line| {
        DEMO.access(|demo| {
            if let (Some(line), Some(demo)) = (line.as_mut(), demo.as_mut()) {
                let _ = demo.shutdown(line);
            }
        })
    });

    halt();
}

/// Moves the demo into the shared state and attaches the interrupt handler
fn start(controller: BoardController, console: Console, settings: DemoSettings, status: &BringUp, mut int_line: BoardInt) {
    let mut demo = Demo::new(controller, console, settings);
    let _ = demo.announce(status);
    demo.arm(&mut int_line);

    DEMO.replace(Some(demo));
    INT_LINE.replace(Some(int_line));

    if settings.receive_mode == ReceiveMode::Interrupt {
        unsafe {
            pac::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
        }
    }
}

fn halt() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

#[interrupt]
fn IO_IRQ_BANK0() {
    INT_LINE.access(|line| {
        let Some(line) = line.as_mut() else {
            return;
        };

        // Ignore spurious interrupts
        if !line.is_pending() {
            return;
        }

        DEMO.access(|demo| {
            if let Some(demo) = demo.as_mut() {
                if let Err(error) = demo.on_interrupt() {
                    warn!("Interrupt handling failed: {error:?}");
                }
            }
        });

        line.clear();
    });
}
