//!# CAN Controller device
//!
//!```
//!# use mcp2515::can::{CanController, Controller};
//!# use mcp2515::config::{Configuration, RequestMode};
//!# use mcp2515::example::*;
//!# use mcp2515::frame::CanFrame;
//!# use embedded_can::{Frame, StandardId};
//!#
//! let clock = ExampleClock::default();
//!
//! // Initialize controller object
//! let mut controller: Controller<_, ExampleClock> = Controller::new(ExampleSPIDevice::default());
//!
//! // Default settings (500 kbit/s, 16 MHz oscillator) in loopback mode
//! let config = Configuration {
//!     mode: RequestMode::Loopback,
//!     ..Default::default()
//! };
//!
//! // Configure CAN controller
//! controller.configure(&config, &clock).unwrap();
//!
//! // Loopback mode receives its own frames
//! let frame = CanFrame::new(StandardId::new(0x123).unwrap(), &[0x12, 0x34]).unwrap();
//! controller.transmit(&frame).unwrap();
//!
//! assert!(controller.check_receive().unwrap());
//! assert_eq!(frame, controller.receive().unwrap());
//! ```

use crate::config::{ClockOutput, Configuration};
use crate::filter::{RxFilter, RxMask};
use crate::frame::{encode_id, CanFrame, FrameError, BUFFER_SIZE, ID_REGISTER_SIZE};
use crate::registers::*;
use crate::status::{ErrorCounters, ErrorFlags, InterruptFlags, OperationMode, OperationStatus, Status};
use core::fmt::Debug;
use core::marker::PhantomData;
use embedded_can::{ErrorKind, Id};
use embedded_hal::spi::{Operation as SpiOperation, SpiDevice};
use embedded_time::duration::Milliseconds;
use embedded_time::Clock;
use log::debug;

/// Maximum time for the device to enter a requested operation mode
const MODE_TIMEOUT_MS: u32 = 10;

/// Number of transmit buffers
const TX_BUFFER_COUNT: u8 = 3;

/// Longest register block written with a single WRITE instruction
const MAX_WRITE_LENGTH: usize = TX_BUFFER_BLOCK_SIZE;

#[derive(Debug, Clone, PartialEq)]
pub enum BusError<E> {
    /// SPI transaction failed, includes chip select errors of the device
    TransferError(E),
}

/// Possible errors during configuration and mode changes
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError<E> {
    /// SPI device error
    BusError(BusError<E>),
    /// Internal clock error
    ClockError,
    /// No configuration mode within timeout of 10 ms
    ConfigurationModeTimeout,
    /// Device did not enter given request mode within timeout of 10 ms
    RequestModeTimeout,
    /// No bit timing known for the oscillator/bit rate combination
    UnsupportedBitRate,
    /// Requested mode can not be entered
    InvalidRequestMode,
    /// Filters and masks can only be changed in configuration mode
    NotInConfigurationMode,
}

/// Possible errors during transmission and reception
#[derive(Debug, Clone, PartialEq)]
pub enum CanError<E> {
    /// SPI device error
    BusError(BusError<E>),
    /// All three transmit buffers have a pending request
    TxBusy,
    /// Transmission aborted, lost arbitration or bus error
    TransmitFailed,
    /// Both receive buffers are empty
    NoMessage,
    /// Received message has a data length code above 8
    InvalidFrame(u8),
}

impl<E> From<BusError<E>> for ConfigError<E> {
    fn from(value: BusError<E>) -> Self {
        ConfigError::BusError(value)
    }
}

impl<E> From<BusError<E>> for CanError<E> {
    fn from(value: BusError<E>) -> Self {
        CanError::BusError(value)
    }
}

impl<E> From<embedded_time::clock::Error> for ConfigError<E> {
    fn from(_error: embedded_time::clock::Error) -> Self {
        ConfigError::ClockError
    }
}

impl<E: Debug> embedded_can::Error for CanError<E> {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

/// Main MCP2515 CAN controller device
pub struct Controller<D: SpiDevice<u8>, CLK: Clock> {
    /// Device on SPI bus
    device: D,

    /// System clock
    clock: PhantomData<CLK>,
}

/// Trait for CAN controller
pub trait CanController {
    type Error: Debug;

    /// Transmit CAN frame using the first free transmit buffer
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), Self::Error>;

    /// Receive CAN frame from receive buffer 0 or, if empty, receive buffer 1
    fn receive(&mut self) -> Result<CanFrame, Self::Error>;

    /// Returns true if at least one receive buffer holds a frame
    fn check_receive(&mut self) -> Result<bool, Self::Error>;

    /// Reads the quick status of receive/transmit buffers
    fn read_status(&mut self) -> Result<Status, Self::Error>;

    /// Reads the pending interrupt flags
    fn read_interrupts(&mut self) -> Result<InterruptFlags, Self::Error>;

    /// Clears all pending interrupt flags
    fn clear_interrupts(&mut self) -> Result<(), Self::Error>;
}

impl<D, CLK> CanController for Controller<D, CLK>
where
    D: SpiDevice<u8>,
    CLK: Clock,
{
    type Error = CanError<D::Error>;

    fn transmit(&mut self, frame: &CanFrame) -> Result<(), Self::Error> {
        let index = self.find_free_tx_buffer()?;
        let control_reg = Self::tx_control_register(index);

        // id, DLC and payload registers directly follow the control register
        self.write_registers(control_reg + 1, &frame.to_buffer())?;

        self.transfer(&mut [Instruction::RequestToSend as u8 | (1 << index)])?;

        let control = TxbCtrl::from(self.read_register(control_reg)?);
        if control.failed() {
            debug!("Transmission via TX buffer {index} failed: {control:?}");
            return Err(CanError::TransmitFailed);
        }

        Ok(())
    }

    fn receive(&mut self) -> Result<CanFrame, Self::Error> {
        let status = self.read_status()?;

        let index = if status.rx0if() {
            0
        } else if status.rx1if() {
            1
        } else {
            return Err(CanError::NoMessage);
        };

        // READ RX BUFFER clears the RXnIF flag at the end of the transaction
        let mut buffer = [0u8; 1 + BUFFER_SIZE];
        buffer[0] = Instruction::ReadRxBuffer as u8 | (index << 2);
        self.transfer(&mut buffer)?;

        let mut registers = [0u8; BUFFER_SIZE];
        registers.copy_from_slice(&buffer[1..]);

        CanFrame::from_buffer(&registers).map_err(|error| match error {
            FrameError::InvalidDlc(dlc) => {
                debug!("Dropping frame of RX buffer {index} with invalid DLC {dlc}");
                CanError::InvalidFrame(dlc)
            }
        })
    }

    fn check_receive(&mut self) -> Result<bool, Self::Error> {
        Ok(self.read_status()?.rx_pending())
    }

    fn read_status(&mut self) -> Result<Status, Self::Error> {
        Ok(self.read_quick_status()?)
    }

    fn read_interrupts(&mut self) -> Result<InterruptFlags, Self::Error> {
        Ok(InterruptFlags::from(self.read_register(REGISTER_CANINTF)?))
    }

    fn clear_interrupts(&mut self) -> Result<(), Self::Error> {
        Ok(self.write_register(REGISTER_CANINTF, 0x00)?)
    }
}

impl<D, CLK> embedded_can::blocking::Can for Controller<D, CLK>
where
    D: SpiDevice<u8>,
    CLK: Clock,
{
    type Frame = CanFrame;
    type Error = CanError<D::Error>;

    /// Blocks until a transmit buffer is free
    fn transmit(&mut self, frame: &Self::Frame) -> Result<(), Self::Error> {
        loop {
            match CanController::transmit(self, frame) {
                Err(CanError::TxBusy) => continue,
                result => return result,
            }
        }
    }

    /// Blocks until a frame is received
    fn receive(&mut self) -> Result<Self::Frame, Self::Error> {
        loop {
            match CanController::receive(self) {
                Err(CanError::NoMessage) => continue,
                result => return result,
            }
        }
    }
}

impl<D, CLK> Controller<D, CLK>
where
    D: SpiDevice<u8>,
    CLK: Clock,
{
    pub fn new(device: D) -> Self {
        Self {
            device,
            clock: Default::default(),
        }
    }

    /// Returns the SPI device
    pub fn release(self) -> D {
        self.device
    }

    /// Resets the device and configures it with the given settings
    pub fn configure(&mut self, config: &Configuration, clock: &CLK) -> Result<(), ConfigError<D::Error>> {
        let mut timing = config.bit_rate.calculate_values().ok_or_else(|| {
            debug!("No bit timing for {:?}", config.bit_rate);
            ConfigError::UnsupportedBitRate
        })?;

        if config.clock_output != ClockOutput::Disabled {
            timing = timing.with_clock_output();
        }

        self.reset()?;
        self.wait_for_mode(OperationMode::Configuration, clock, ConfigError::ConfigurationModeTimeout)?;

        self.write_registers(REGISTER_CNF3, &timing.as_registers())?;

        for index in 0..TX_BUFFER_COUNT {
            self.write_registers(Self::tx_control_register(index), &[0u8; TX_BUFFER_BLOCK_SIZE])?;
        }

        // Receive all frames passing the filters, RXB0 rolls over to RXB1
        self.write_register(REGISTER_RXB0CTRL, u8::from(Rxb0Ctrl::new().with_bukt(true)))?;
        self.write_register(REGISTER_RXB1CTRL, u8::from(Rxb1Ctrl::new()))?;

        // Zero masks let every identifier pass
        for filter in RxFilter::ALL {
            self.write_registers(filter.register(), &[0u8; ID_REGISTER_SIZE])?;
        }
        for mask in RxMask::ALL {
            self.write_registers(mask.register(), &[0u8; ID_REGISTER_SIZE])?;
        }

        self.modify_register(REGISTER_CANCTRL, CanCtrl::CLOCK_MASK, config.as_canctrl())?;

        self.write_register(REGISTER_CANINTE, config.interrupts.bits())?;
        self.write_register(REGISTER_CANINTF, 0x00)?;

        self.enable_mode(config.mode.to_operation_mode(), clock, ConfigError::RequestModeTimeout)?;

        Ok(())
    }

    /// Requests the given operation mode and waits max. 10 ms for it to be reached
    pub fn set_mode(&mut self, mode: OperationMode, clock: &CLK) -> Result<(), ConfigError<D::Error>> {
        if mode == OperationMode::Unknown {
            return Err(ConfigError::InvalidRequestMode);
        }

        self.enable_mode(mode, clock, ConfigError::RequestModeTimeout)
    }

    /// Reads and returns the operation status
    pub fn read_operation_status(&mut self) -> Result<OperationStatus, BusError<D::Error>> {
        let data = self.read_canstat()?;

        Ok(OperationStatus::from_register(data))
    }

    /// Reads the raw CANSTAT register
    pub fn read_canstat(&mut self) -> Result<u8, BusError<D::Error>> {
        self.read_register(REGISTER_CANSTAT)
    }

    /// Reads and returns the current CLKOUT configuration
    pub fn read_clock_output(&mut self) -> Result<ClockOutput, BusError<D::Error>> {
        let data = self.read_register(REGISTER_CANCTRL)?;

        Ok(ClockOutput::from_register(data))
    }

    /// Reads the enabled interrupt sources
    pub fn read_interrupt_mask(&mut self) -> Result<InterruptFlags, BusError<D::Error>> {
        Ok(InterruptFlags::from(self.read_register(REGISTER_CANINTE)?))
    }

    /// Sets the enabled interrupt sources
    pub fn set_interrupt_mask(&mut self, mask: InterruptFlags) -> Result<(), BusError<D::Error>> {
        self.write_register(REGISTER_CANINTE, mask.bits())
    }

    /// Reads the error flag register
    pub fn read_error_flags(&mut self) -> Result<ErrorFlags, BusError<D::Error>> {
        Ok(ErrorFlags::from(self.read_register(REGISTER_EFLG)?))
    }

    /// Returns true if an overflow, error-passive or bus-off flag is set
    pub fn has_error(&mut self) -> Result<bool, BusError<D::Error>> {
        Ok(self.read_error_flags()?.is_error())
    }

    /// Reads transmit and receive error counters
    pub fn read_error_counters(&mut self) -> Result<ErrorCounters, BusError<D::Error>> {
        let mut buffer = [Instruction::Read as u8, REGISTER_TEC, 0x0, 0x0];
        self.transfer(&mut buffer)?;

        Ok(ErrorCounters {
            transmit: buffer[2],
            receive: buffer[3],
        })
    }

    /// Clears both receive buffer overflow flags
    pub fn clear_rx_overflow(&mut self) -> Result<(), BusError<D::Error>> {
        self.modify_register(REGISTER_EFLG, ErrorFlags::OVERFLOW_MASK, 0x00)
    }

    /// Clears the message error interrupt flag
    pub fn clear_message_error(&mut self) -> Result<(), BusError<D::Error>> {
        let mask = InterruptFlags::new().with_merr(true).bits();
        self.modify_register(REGISTER_CANINTF, mask, 0x00)
    }

    /// Clears the error interrupt flag
    pub fn clear_error_interrupt(&mut self) -> Result<(), BusError<D::Error>> {
        let mask = InterruptFlags::new().with_error(true).bits();
        self.modify_register(REGISTER_CANINTF, mask, 0x00)
    }

    /// Sets an acceptance filter, device must be in configuration mode
    pub fn set_filter(&mut self, filter: RxFilter, identifier: Id) -> Result<(), ConfigError<D::Error>> {
        self.verify_configuration_mode()?;
        self.write_registers(filter.register(), &encode_id(identifier, true))?;

        Ok(())
    }

    /// Sets an acceptance mask, device must be in configuration mode
    pub fn set_mask(&mut self, mask: RxMask, identifier: Id) -> Result<(), ConfigError<D::Error>> {
        self.verify_configuration_mode()?;
        self.write_registers(mask.register(), &encode_id(identifier, false))?;

        Ok(())
    }

    /// Reset internal register to default and switch to configuration mode
    pub fn reset(&mut self) -> Result<(), BusError<D::Error>> {
        self.transfer(&mut [Instruction::Reset as u8])
    }

    /// Requests the given mode and waits for it to be reached
    fn enable_mode(
        &mut self,
        mode: OperationMode,
        clock: &CLK,
        timeout_error: ConfigError<D::Error>,
    ) -> Result<(), ConfigError<D::Error>> {
        self.modify_register(REGISTER_CANCTRL, CanCtrl::REQOP_MASK, (mode as u8) << 5)?;

        self.wait_for_mode(mode, clock, timeout_error)
    }

    /// Polls CANSTAT for max. 10 ms until the given mode is reported
    fn wait_for_mode(
        &mut self,
        mode: OperationMode,
        clock: &CLK,
        timeout_error: ConfigError<D::Error>,
    ) -> Result<(), ConfigError<D::Error>> {
        let target = clock
            .try_now()?
            .checked_add(Milliseconds::new(MODE_TIMEOUT_MS))
            .ok_or(ConfigError::ClockError)?;

        loop {
            let current_mode = self.read_operation_status()?.mode;

            if current_mode == mode {
                return Ok(());
            }

            if clock.try_now()? > target {
                debug!("Device did not enter {mode:?} mode within timeout. Current mode: {current_mode:?}");
                return Err(timeout_error);
            }
        }
    }

    fn verify_configuration_mode(&mut self) -> Result<(), ConfigError<D::Error>> {
        let mode = self.read_operation_status()?.mode;

        if mode != OperationMode::Configuration {
            debug!("Filter/mask change requires configuration mode. Current mode: {mode:?}");
            return Err(ConfigError::NotInConfigurationMode);
        }

        Ok(())
    }

    /// Returns the index of the first transmit buffer without pending request
    fn find_free_tx_buffer(&mut self) -> Result<u8, CanError<D::Error>> {
        for index in 0..TX_BUFFER_COUNT {
            let control = TxbCtrl::from(self.read_register(Self::tx_control_register(index))?);

            if !control.txreq() {
                return Ok(index);
            }
        }

        Err(CanError::TxBusy)
    }

    /// Executes the READ STATUS instruction
    fn read_quick_status(&mut self) -> Result<Status, BusError<D::Error>> {
        let mut buffer = [Instruction::ReadStatus as u8, 0x0];
        self.transfer(&mut buffer)?;

        Ok(Status::from(buffer[1]))
    }

    /// Writes a single register byte
    fn write_register(&mut self, register: u8, value: u8) -> Result<(), BusError<D::Error>> {
        self.transfer(&mut [Instruction::Write as u8, register, value])
    }

    /// Writes consecutive registers starting at the given address
    fn write_registers(&mut self, register: u8, values: &[u8]) -> Result<(), BusError<D::Error>> {
        debug_assert!(values.len() <= MAX_WRITE_LENGTH);

        let mut buffer = [0u8; 2 + MAX_WRITE_LENGTH];
        buffer[0] = Instruction::Write as u8;
        buffer[1] = register;
        buffer[2..2 + values.len()].copy_from_slice(values);

        self.transfer(&mut buffer[..2 + values.len()])
    }

    /// Changes the bits of the register selected by mask
    fn modify_register(&mut self, register: u8, mask: u8, value: u8) -> Result<(), BusError<D::Error>> {
        self.transfer(&mut [Instruction::BitModify as u8, register, mask, value])
    }

    /// Reads a single register byte
    fn read_register(&mut self, register: u8) -> Result<u8, BusError<D::Error>> {
        let mut buffer = [Instruction::Read as u8, register, 0x0];
        self.transfer(&mut buffer)?;

        Ok(buffer[2])
    }

    /// Executes one instruction as a single SPI transaction, response bytes replace the sent ones
    fn transfer(&mut self, buffer: &mut [u8]) -> Result<(), BusError<D::Error>> {
        let mut operations = [SpiOperation::TransferInPlace(buffer)];
        self.device.transaction(&mut operations).map_err(BusError::TransferError)
    }

    /// Returns the control register address for the given TX buffer
    fn tx_control_register(index: u8) -> u8 {
        REGISTER_TXB0CTRL + BUFFER_STRIDE * index
    }
}
