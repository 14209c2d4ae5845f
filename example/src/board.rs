//! Hardware bindings of the known board profiles
//!
//! Every profile uses its own GPIOs, so the HAL pin types differ per board.
//! The enums below hide that difference behind the `embedded-hal` traits,
//! [ExclusiveDevice] combines bus and CS pin into the SPI device of the driver.
use core::convert::Infallible;
use embedded_hal::digital::{self, OutputPin};
use embedded_hal::spi::{self, SpiBus, MODE_0};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use fugit::HertzU32;
use fugit::RateExtU32;
use mcp2515::board::{BoardProfile, JOY_IT_SBC_CAN01, MCP2515_BREAKOUT};
use mcp2515::demo::InterruptLine;
use rp2040_hal::gpio::bank0::{Gpio15, Gpio16, Gpio18, Gpio19, Gpio2, Gpio3, Gpio4, Gpio5, Gpio6, Gpio9};
use rp2040_hal::gpio::{
    FunctionNull, FunctionSioInput, FunctionSioOutput, FunctionSpi, Interrupt, Pin, PullDown, PullUp,
};
use rp2040_hal::pac::{RESETS, SPI0};
use rp2040_hal::spi::Enabled;
use rp2040_hal::Spi;

/// SPI clock of the MCP2515
const SPI_FREQUENCY_MHZ: u32 = 1;

type Unused<I> = Pin<I, FunctionNull, PullDown>;

type SpiPin<I> = Pin<I, FunctionSpi, PullDown>;

type JoyItSpi = Spi<Enabled, SPI0, (SpiPin<Gpio19>, SpiPin<Gpio16>, SpiPin<Gpio18>)>;

type BreakoutSpi = Spi<Enabled, SPI0, (SpiPin<Gpio3>, SpiPin<Gpio4>, SpiPin<Gpio2>)>;

/// SPI device of the selected board, CS is asserted for the duration of each transaction
pub type BoardDevice = ExclusiveDevice<BoardBus, BoardCs, NoDelay>;

/// Unconfigured GPIOs of the Joy-IT SBC-CAN01 wiring
pub struct JoyItPins {
    pub interrupt: Unused<Gpio15>,
    pub chip_select: Unused<Gpio9>,
    pub clock: Unused<Gpio18>,
    pub data_out: Unused<Gpio19>,
    pub data_in: Unused<Gpio16>,
}

/// Unconfigured GPIOs of the breakout board wiring
pub struct BreakoutPins {
    pub interrupt: Unused<Gpio6>,
    pub chip_select: Unused<Gpio5>,
    pub clock: Unused<Gpio2>,
    pub data_out: Unused<Gpio3>,
    pub data_in: Unused<Gpio4>,
}

/// Errors while attaching a board
#[derive(Debug)]
pub enum AttachError {
    /// Board has no hardware binding
    UnknownProfile,
    /// Pins or SPI peripheral already handed out
    InUse,
}

/// SPI peripheral and pins not yet handed to a board
pub struct BoardResources {
    pub spi: Option<SPI0>,
    pub joy_it: Option<JoyItPins>,
    pub breakout: Option<BreakoutPins>,
}

impl BoardResources {
    /// Configures SPI0 and the pins of the given profile
    pub fn attach(
        &mut self,
        profile: &BoardProfile,
        resets: &mut RESETS,
        peripheral_frequency: HertzU32,
    ) -> Result<(BoardBus, BoardCs, BoardInt), AttachError> {
        if *profile == JOY_IT_SBC_CAN01 {
            let (pins, device) = match (self.joy_it.take(), self.spi.take()) {
                (Some(pins), Some(device)) => (pins, device),
                (pins, device) => {
                    self.joy_it = pins;
                    self.spi = device;
                    return Err(AttachError::InUse);
                }
            };

            let spi = Spi::<_, _, _, 8>::new(
                device,
                (
                    pins.data_out.into_function::<FunctionSpi>(),
                    pins.data_in.into_function::<FunctionSpi>(),
                    pins.clock.into_function::<FunctionSpi>(),
                ),
            )
            .init(resets, peripheral_frequency, SPI_FREQUENCY_MHZ.MHz(), MODE_0);

            return Ok((
                BoardBus::JoyIt(spi),
                BoardCs::JoyIt(pins.chip_select.into_push_pull_output()),
                BoardInt::JoyIt(pins.interrupt.into_pull_up_input()),
            ));
        }

        if *profile == MCP2515_BREAKOUT {
            let (pins, device) = match (self.breakout.take(), self.spi.take()) {
                (Some(pins), Some(device)) => (pins, device),
                (pins, device) => {
                    self.breakout = pins;
                    self.spi = device;
                    return Err(AttachError::InUse);
                }
            };

            let spi = Spi::<_, _, _, 8>::new(
                device,
                (
                    pins.data_out.into_function::<FunctionSpi>(),
                    pins.data_in.into_function::<FunctionSpi>(),
                    pins.clock.into_function::<FunctionSpi>(),
                ),
            )
            .init(resets, peripheral_frequency, SPI_FREQUENCY_MHZ.MHz(), MODE_0);

            return Ok((
                BoardBus::Breakout(spi),
                BoardCs::Breakout(pins.chip_select.into_push_pull_output()),
                BoardInt::Breakout(pins.interrupt.into_pull_up_input()),
            ));
        }

        Err(AttachError::UnknownProfile)
    }

    /// Disables SPI0 after a failed bring-up, so the next board can use it
    pub fn detach(&mut self, bus: BoardBus) {
        let device = match bus {
            BoardBus::JoyIt(spi) => {
                let (device, (data_out, data_in, clock)) = spi.disable().free();
                release_spi_pins(data_out, data_in, clock);
                device
            }
            BoardBus::Breakout(spi) => {
                let (device, (data_out, data_in, clock)) = spi.disable().free();
                release_spi_pins(data_out, data_in, clock);
                device
            }
        };

        self.spi = Some(device);
    }
}

/// Returns the pins to the NULL function, so they no longer drive SPI0 signals
fn release_spi_pins<A, B, C>(data_out: SpiPin<A>, data_in: SpiPin<B>, clock: SpiPin<C>)
where
    A: rp2040_hal::gpio::PinId,
    B: rp2040_hal::gpio::PinId,
    C: rp2040_hal::gpio::PinId,
{
    let _ = data_out.into_function::<FunctionNull>();
    let _ = data_in.into_function::<FunctionNull>();
    let _ = clock.into_function::<FunctionNull>();
}

/// SPI0 bound to the pins of one board
pub enum BoardBus {
    JoyIt(JoyItSpi),
    Breakout(BreakoutSpi),
}

impl spi::ErrorType for BoardBus {
    type Error = Infallible;
}

impl SpiBus<u8> for BoardBus {
    fn read(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(spi) => SpiBus::read(spi, words),
            Self::Breakout(spi) => SpiBus::read(spi, words),
        }
    }

    fn write(&mut self, words: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(spi) => SpiBus::write(spi, words),
            Self::Breakout(spi) => SpiBus::write(spi, words),
        }
    }

    fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(spi) => SpiBus::transfer(spi, read, write),
            Self::Breakout(spi) => SpiBus::transfer(spi, read, write),
        }
    }

    fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(spi) => SpiBus::transfer_in_place(spi, words),
            Self::Breakout(spi) => SpiBus::transfer_in_place(spi, words),
        }
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(spi) => SpiBus::flush(spi),
            Self::Breakout(spi) => SpiBus::flush(spi),
        }
    }
}

/// Chip select line of one board
pub enum BoardCs {
    JoyIt(Pin<Gpio9, FunctionSioOutput, PullDown>),
    Breakout(Pin<Gpio5, FunctionSioOutput, PullDown>),
}

impl digital::ErrorType for BoardCs {
    type Error = Infallible;
}

impl OutputPin for BoardCs {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(pin) => OutputPin::set_low(pin),
            Self::Breakout(pin) => OutputPin::set_low(pin),
        }
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        match self {
            Self::JoyIt(pin) => OutputPin::set_high(pin),
            Self::Breakout(pin) => OutputPin::set_high(pin),
        }
    }
}

/// Active-low INT line of one board
pub enum BoardInt {
    JoyIt(Pin<Gpio15, FunctionSioInput, PullUp>),
    Breakout(Pin<Gpio6, FunctionSioInput, PullUp>),
}

impl BoardInt {
    /// True if a falling edge was latched
    pub fn is_pending(&self) -> bool {
        match self {
            Self::JoyIt(pin) => pin.interrupt_status(Interrupt::EdgeLow),
            Self::Breakout(pin) => pin.interrupt_status(Interrupt::EdgeLow),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Self::JoyIt(pin) => pin.clear_interrupt(Interrupt::EdgeLow),
            Self::Breakout(pin) => pin.clear_interrupt(Interrupt::EdgeLow),
        }
    }
}

impl InterruptLine for BoardInt {
    fn set_enabled(&mut self, enabled: bool) {
        match self {
            Self::JoyIt(pin) => pin.set_interrupt_enabled(Interrupt::EdgeLow, enabled),
            Self::Breakout(pin) => pin.set_interrupt_enabled(Interrupt::EdgeLow, enabled),
        }
    }
}
