//!# Loopback demo
//! Sends a standard and an extended frame every cycle while the controller is in loopback mode.
//! Received frames are printed to a [core::fmt::Write] console, either right after sending
//! ([ReceiveMode::Polling]) or from the handler of the controller's INT line ([ReceiveMode::Interrupt]).
//!
//! ```
//!# use mcp2515::can::Controller;
//!# use mcp2515::config::Configuration;
//!# use mcp2515::demo::{bring_up, Demo, DemoSettings, ReceiveMode};
//!# use mcp2515::example::*;
//!#
//! let clock = ExampleClock::default();
//! let mut controller: Controller<_, ExampleClock> = Controller::new(ExampleSPIDevice::default());
//!
//! let status = bring_up(&mut controller, &Configuration::default(), &clock).unwrap();
//!
//! let settings = DemoSettings {
//!     receive_mode: ReceiveMode::Polling,
//!     ..Default::default()
//! };
//!
//! let mut demo = Demo::new(controller, String::new(), settings);
//! demo.announce(&status).unwrap();
//! demo.cycle().unwrap();
//!
//! assert!(demo.console().contains("  1 send normal"));
//! assert!(demo.console().contains("    CAN id: 0x123 (8 bytes): 12 34 56 78 9a bc de f0"));
//! assert!(demo.console().contains("    CAN id: 0x12345678 (EFF) (8 bytes): 12 34 56 78 9a bc de f0"));
//! ```
use crate::can::{CanController, ConfigError, Controller};
use crate::config::Configuration;
use crate::frame::{CanFrame, MAX_PAYLOAD};
use crate::status::{InterruptFlags, OperationMode, OperationStatus};
use core::fmt::{self, Write};
use embedded_can::{ExtendedId, Frame, StandardId};
use embedded_hal::spi::SpiDevice;
use embedded_time::Clock;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const SEPARATOR: &str = "---------------------------------";

/// CANSTAT.OPMOD bits of loopback mode
const LOOPBACK_MODE_BITS: u8 = 0x40;

/// How received frames are picked up
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveMode {
    /// Receive buffers are checked right after each transmission
    Polling,
    /// Receive buffers are drained by [Demo::on_interrupt]
    #[default]
    Interrupt,
}

impl ReceiveMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Polling => "polling",
            Self::Interrupt => "interrupt",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoSettings {
    pub receive_mode: ReceiveMode,

    /// Payload of the polling frames, interrupt mode sends growing prefixes of it
    pub payload: [u8; MAX_PAYLOAD],

    /// 11 bit identifier of the standard frame
    pub standard_id: u16,

    /// 29 bit identifier of the extended frame
    pub extended_id: u32,

    /// Pause between two cycles
    pub period_ms: u32,

    /// Number of cycles after which the demo stops, runs forever if None
    pub cycle_limit: Option<u32>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            receive_mode: ReceiveMode::default(),
            payload: [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0],
            standard_id: 0x123,
            extended_id: 0x1234_5678,
            period_ms: 1000,
            cycle_limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DemoError<E> {
    /// Controller access failed
    Controller(E),
    /// Writing to the console failed
    Console,
    /// Identifier of the settings out of range
    InvalidIdentifier,
}

impl<E> From<fmt::Error> for DemoError<E> {
    fn from(_error: fmt::Error) -> Self {
        DemoError::Console
    }
}

/// Line of the controller's INT output
pub trait InterruptLine {
    /// Enables or disables the falling edge interrupt
    fn set_enabled(&mut self, enabled: bool);
}

/// Device state reported after bring-up
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BringUp {
    /// Raw CANSTAT register
    pub canstat: u8,
    pub interrupt_mask: InterruptFlags,
}

impl BringUp {
    pub fn status(&self) -> OperationStatus {
        OperationStatus::from_register(self.canstat)
    }
}

/// Bring-up step which failed
#[derive(Debug, Clone, PartialEq)]
pub enum BringUpError<E> {
    /// Reset or configuration of the controller
    Configuration(ConfigError<E>),
    /// Switch to loopback mode or reading back the device state
    Loopback(ConfigError<E>),
}

impl<E> BringUpError<E> {
    /// Console message of the failed step
    pub fn message(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Error initializing CAN!",
            Self::Loopback(_) => "Error setting CAN loopback!",
        }
    }
}

/// Configures the controller and switches it to loopback mode
pub fn bring_up<D, CLK>(
    controller: &mut Controller<D, CLK>,
    config: &Configuration,
    clock: &CLK,
) -> Result<BringUp, BringUpError<D::Error>>
where
    D: SpiDevice<u8>,
    CLK: Clock,
{
    controller.configure(config, clock).map_err(BringUpError::Configuration)?;
    controller
        .set_mode(OperationMode::Loopback, clock)
        .map_err(BringUpError::Loopback)?;

    let canstat = controller
        .read_canstat()
        .map_err(|error| BringUpError::Loopback(error.into()))?;
    let interrupt_mask = controller
        .read_interrupt_mask()
        .map_err(|error| BringUpError::Loopback(error.into()))?;
    debug!("Bring-up done: CANSTAT {canstat:02x}, interrupt mask {:02x}", interrupt_mask.bits());

    Ok(BringUp { canstat, interrupt_mask })
}

/// Demo state shared by the main loop and the interrupt handler
pub struct Demo<C: CanController, W: Write> {
    controller: C,
    console: W,
    settings: DemoSettings,

    /// Number of started cycles
    cycles: u32,
}

impl<C: CanController, W: Write> Demo<C, W> {
    pub fn new(controller: C, console: W, settings: DemoSettings) -> Self {
        Self {
            controller,
            console,
            settings,
            cycles: 0,
        }
    }

    pub fn settings(&self) -> &DemoSettings {
        &self.settings
    }

    pub fn controller(&mut self) -> &mut C {
        &mut self.controller
    }

    pub fn console(&self) -> &W {
        &self.console
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycles
    }

    /// True once the cycle limit is reached
    pub fn is_finished(&self) -> bool {
        matches!(self.settings.cycle_limit, Some(limit) if self.cycles >= limit)
    }

    /// Returns controller and console
    pub fn release(self) -> (C, W) {
        (self.controller, self.console)
    }

    /// Prints the bring-up report
    pub fn announce(&mut self, bring_up: &BringUp) -> fmt::Result {
        writeln!(self.console, "Initialized successfully, {} mode.", self.settings.receive_mode.name())?;

        let canstat = bring_up.canstat;
        let mode = bring_up.status().mode;
        if mode == OperationMode::Loopback {
            writeln!(self.console, "CAN status reg: {canstat:02x}")?;
        } else {
            warn!("Controller reports {mode:?} mode instead of loopback");
            writeln!(
                self.console,
                "CAN status reg: {canstat:02x} (***should be {:02x} [loopback mode]; ignoring***)",
                canstat | LOOPBACK_MODE_BITS
            )?;
        }

        if self.settings.receive_mode == ReceiveMode::Interrupt {
            writeln!(self.console, "Interrupt mask is {:02x}", bring_up.interrupt_mask.bits())?;
        }

        Ok(())
    }

    /// Enables the INT line in interrupt mode
    pub fn arm<I: InterruptLine>(&self, line: &mut I) {
        if self.settings.receive_mode == ReceiveMode::Interrupt {
            line.set_enabled(true);
        }
    }

    /// Detaches the interrupt handler
    pub fn shutdown<I: InterruptLine>(&mut self, line: &mut I) -> fmt::Result {
        line.set_enabled(false);
        writeln!(self.console, "Stopped after {} cycles", self.cycles)
    }

    /// Runs one transmit cycle
    pub fn cycle(&mut self) -> Result<(), DemoError<C::Error>> {
        self.cycles += 1;
        writeln!(self.console, "{SEPARATOR}")?;

        match self.settings.receive_mode {
            ReceiveMode::Polling => {
                let (standard, extended) = self.frames(MAX_PAYLOAD)?;
                self.send_and_poll(&standard, "send normal------------------")?;
                self.send_and_poll(&extended, "send EFF---------------------")?;
            }
            ReceiveMode::Interrupt => {
                let (standard, extended) = self.frames(self.cycles as usize % (MAX_PAYLOAD + 1))?;
                self.send(&standard, "send normal------------------")?;
                self.send(&extended, "send EFF---------------------")?;
            }
        }

        Ok(())
    }

    /// Handles a falling edge of the INT line and returns the number of drained frames.
    /// Interrupt flags are cleared even if handling failed, as INT only falls again afterwards.
    pub fn on_interrupt(&mut self) -> Result<usize, DemoError<C::Error>> {
        let result = self.handle_interrupt();
        let cleared = self.controller.clear_interrupts().map_err(DemoError::Controller);

        let drained = result?;
        cleared?;
        Ok(drained)
    }

    /// Prints a received frame
    pub fn print_frame(&mut self, frame: &CanFrame) -> fmt::Result {
        writeln!(self.console, "    CAN id: {frame}")
    }

    fn handle_interrupt(&mut self) -> Result<usize, DemoError<C::Error>> {
        let status = self.controller.read_status().map_err(DemoError::Controller)?;
        let flags = self.controller.read_interrupts().map_err(DemoError::Controller)?;

        if self.settings.receive_mode == ReceiveMode::Polling {
            writeln!(
                self.console,
                "Interrupt in polling mode?!  intr {:02x} stat {:02x}",
                flags.bits(),
                status.bits()
            )?;
            return Ok(0);
        }

        if !flags.rx_pending() {
            writeln!(
                self.console,
                "    >>> Non-read interrupt:  intr {:02x} stat {:02x}",
                flags.bits(),
                status.bits()
            )?;
            return Ok(0);
        }

        let mut drained = 0;
        while self.controller.check_receive().map_err(DemoError::Controller)? {
            if !self.receive_one()? {
                break;
            }
            drained += 1;
        }

        Ok(drained)
    }

    fn send_and_poll(&mut self, frame: &CanFrame, label: &str) -> Result<(), DemoError<C::Error>> {
        match self.controller.transmit(frame) {
            Ok(()) => writeln!(self.console, "{:3} {label}", self.cycles)?,
            Err(error) => debug!("Transmission of {frame} failed: {error:?}"),
        }

        if self.controller.check_receive().map_err(DemoError::Controller)? {
            self.receive_one()?;
        }

        Ok(())
    }

    fn send(&mut self, frame: &CanFrame, label: &str) -> Result<(), DemoError<C::Error>> {
        writeln!(self.console, "{:3} {label}", self.cycles)?;

        if let Err(error) = self.controller.transmit(frame) {
            debug!("Transmission of {frame} failed: {error:?}");
            writeln!(self.console, "{:3} -------------------------FAIL", self.cycles)?;
        }

        Ok(())
    }

    /// Receives and prints one frame, returns false if reception failed
    fn receive_one(&mut self) -> Result<bool, DemoError<C::Error>> {
        match self.controller.receive() {
            Ok(frame) => {
                self.print_frame(&frame)?;
                Ok(true)
            }
            Err(error) => {
                debug!("Reception failed: {error:?}");
                writeln!(self.console, "{:3} -----------------receive FAIL", self.cycles)?;
                Ok(false)
            }
        }
    }

    /// Standard and extended frame carrying the first `length` payload bytes
    fn frames(&self, length: usize) -> Result<(CanFrame, CanFrame), DemoError<C::Error>> {
        let payload = &self.settings.payload[..length];

        let standard_id = StandardId::new(self.settings.standard_id).ok_or(DemoError::InvalidIdentifier)?;
        let extended_id = ExtendedId::new(self.settings.extended_id).ok_or(DemoError::InvalidIdentifier)?;

        let standard = CanFrame::new(standard_id, payload).ok_or(DemoError::InvalidIdentifier)?;
        let extended = CanFrame::new(extended_id, payload).ok_or(DemoError::InvalidIdentifier)?;

        Ok((standard, extended))
    }
}
