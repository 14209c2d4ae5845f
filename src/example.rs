//! # Simulated MCP2515 for doc examples and tests
//!
//! [ExampleSPIDevice] models the register file of an MCP2515 behind the SPI instruction set.
//! Mode changes take effect immediately, and transmit requests are looped back
//! into the receive buffers while the device is in loopback mode.
//! In any other mode transmit requests stay pending, as there is no bus to acknowledge them.
use crate::frame::BUFFER_SIZE;
use crate::registers::*;
use crate::status::{ErrorFlags, InterruptFlags, OperationMode, Status};
use core::cell::Cell;
use core::convert::Infallible;
use embedded_hal::spi::{ErrorType, Operation, SpiDevice};
use embedded_time::clock::Error;
use embedded_time::duration::{Duration, Fraction};
use embedded_time::fixed_point::FixedPoint;
use embedded_time::timer::param::{Armed, OneShot};
use embedded_time::{Clock, Instant, Timer};

const REGISTER_COUNT: usize = 0x80;

const TXB_TXREQ: u8 = 1 << 3;

const SIDL_EXIDE: u8 = 1 << 3;

const SIDL_SRR: u8 = 1 << 4;

const DLC_RTR: u8 = 1 << 6;

/// Longest instruction handled, WRITE of a complete TX buffer block
const MAX_TRANSFER: usize = 2 + TX_BUFFER_BLOCK_SIZE;

const NO_WORDS: &[u8] = &[];

#[derive(Debug)]
pub struct ExampleSPIDevice {
    registers: [u8; REGISTER_COUNT],

    /// False simulates a missing device, MISO reads all ones
    responsive: bool,
}

impl Default for ExampleSPIDevice {
    fn default() -> Self {
        let mut device = Self {
            registers: [0u8; REGISTER_COUNT],
            responsive: true,
        };
        device.reset();
        device
    }
}

impl ExampleSPIDevice {
    /// No device attached, MISO reads all ones
    pub fn unresponsive() -> Self {
        Self {
            responsive: false,
            ..Self::default()
        }
    }

    /// Returns the current value of the given register
    pub fn register(&self, address: u8) -> u8 {
        self.registers[address as usize % REGISTER_COUNT]
    }

    /// State of the active-low INT pin, true if an enabled interrupt is pending
    pub fn interrupt_asserted(&self) -> bool {
        self.register(REGISTER_CANINTF) & self.register(REGISTER_CANINTE) != 0
    }

    fn reset(&mut self) {
        self.registers = [0u8; REGISTER_COUNT];

        // Configuration mode, CLKOUT enabled with prescaler 8
        self.registers[REGISTER_CANSTAT as usize] = 0x80;
        self.registers[REGISTER_CANCTRL as usize] = 0x87;
    }

    fn mode(&self) -> OperationMode {
        OperationMode::from_register(self.register(REGISTER_CANSTAT))
    }

    fn execute(&mut self, buffer: &mut [u8]) {
        if !self.responsive {
            buffer.iter_mut().for_each(|byte| *byte = 0xFF);
            return;
        }

        let Some(&instruction) = buffer.first() else {
            return;
        };

        match instruction {
            0xC0 => self.reset(),
            0x03 if buffer.len() > 2 => {
                let start = buffer[1];
                for (offset, byte) in buffer[2..].iter_mut().enumerate() {
                    *byte = self.register(start.wrapping_add(offset as u8));
                }
            }
            0x02 if buffer.len() > 2 => {
                let start = buffer[1];
                for (offset, &byte) in buffer[2..].iter().enumerate() {
                    self.write_register(start.wrapping_add(offset as u8), byte);
                }
            }
            0x05 if buffer.len() > 3 => {
                let (address, mask, data) = (buffer[1], buffer[2], buffer[3]);
                let value = (self.register(address) & !mask) | (data & mask);
                self.write_register(address, value);
            }
            0xA0 => {
                let status = self.quick_status();
                buffer[1..].iter_mut().for_each(|byte| *byte = status);
            }
            0x90 | 0x94 => {
                let index = (instruction >> 2) & 0x01;
                let start = REGISTER_RXB0CTRL + BUFFER_STRIDE * index + 1;
                for (offset, byte) in buffer[1..].iter_mut().enumerate() {
                    *byte = self.register(start + offset as u8);
                }

                let flag = if index == 0 { 0x01 } else { 0x02 };
                self.registers[REGISTER_CANINTF as usize] &= !flag;
            }
            0x81..=0x87 => {
                for index in 0..3 {
                    if instruction & (1 << index) != 0 {
                        self.request_to_send(index);
                    }
                }
            }
            _ => {}
        }
    }

    fn write_register(&mut self, address: u8, value: u8) {
        let address = address % REGISTER_COUNT as u8;

        match address {
            REGISTER_CANSTAT => {}
            REGISTER_CANCTRL => {
                self.registers[address as usize] = value;

                let canstat = self.register(REGISTER_CANSTAT);
                self.registers[REGISTER_CANSTAT as usize] =
                    (canstat & !CanCtrl::REQOP_MASK) | (value & CanCtrl::REQOP_MASK);
            }
            0x30 | 0x40 | 0x50 => {
                let previous = self.register(address);
                self.registers[address as usize] = value;

                if value & TXB_TXREQ != 0 && previous & TXB_TXREQ == 0 {
                    self.request_to_send((address - REGISTER_TXB0CTRL) / BUFFER_STRIDE);
                }
            }
            _ => self.registers[address as usize] = value,
        }
    }

    fn request_to_send(&mut self, index: u8) {
        let control = (REGISTER_TXB0CTRL + BUFFER_STRIDE * index) as usize;
        self.registers[control] |= TXB_TXREQ;

        if self.mode() != OperationMode::Loopback {
            return;
        }

        let mut frame = [0u8; BUFFER_SIZE];
        frame.copy_from_slice(&self.registers[control + 1..control + 1 + BUFFER_SIZE]);

        // Standard remote frames are flagged by SRR on reception
        if frame[1] & SIDL_EXIDE == 0 && frame[4] & DLC_RTR != 0 {
            frame[1] |= SIDL_SRR;
        }

        let flags = InterruptFlags::from(self.register(REGISTER_CANINTF));
        let rollover = Rxb0Ctrl::from(self.register(REGISTER_RXB0CTRL)).bukt();

        let target = if !flags.rx0() {
            Some(0)
        } else if rollover && !flags.rx1() {
            Some(1)
        } else {
            None
        };

        let mut flags = flags;
        match target {
            Some(index) => {
                let start = (REGISTER_RXB0CTRL + BUFFER_STRIDE * index + 1) as usize;
                self.registers[start..start + BUFFER_SIZE].copy_from_slice(&frame);

                flags = if index == 0 {
                    flags.with_rx0(true)
                } else {
                    flags.with_rx1(true)
                };
            }
            None => {
                let errors = ErrorFlags::from(self.register(REGISTER_EFLG));
                let errors = if rollover {
                    errors.with_rx1ovr(true)
                } else {
                    errors.with_rx0ovr(true)
                };
                self.registers[REGISTER_EFLG as usize] = errors.bits();
                flags = flags.with_error(true);
            }
        }

        flags = match index {
            0 => flags.with_tx0(true),
            1 => flags.with_tx1(true),
            _ => flags.with_tx2(true),
        };

        self.registers[REGISTER_CANINTF as usize] = flags.bits();
        self.registers[control] &= !TXB_TXREQ;
    }

    fn quick_status(&self) -> u8 {
        let flags = InterruptFlags::from(self.register(REGISTER_CANINTF));
        let pending = |index: u8| self.register(REGISTER_TXB0CTRL + BUFFER_STRIDE * index) & TXB_TXREQ != 0;

        Status::new()
            .with_rx0if(flags.rx0())
            .with_rx1if(flags.rx1())
            .with_tx0req(pending(0))
            .with_tx0if(flags.tx0())
            .with_tx1req(pending(1))
            .with_tx1if(flags.tx1())
            .with_tx2req(pending(2))
            .with_tx2if(flags.tx2())
            .bits()
    }
}

impl ErrorType for ExampleSPIDevice {
    type Error = Infallible;
}

impl SpiDevice<u8> for ExampleSPIDevice {
    /// All operations form one instruction, as CS stays low for the whole transaction
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<(), Self::Error> {
        let mut frame = [0u8; MAX_TRANSFER];
        let mut length = 0;

        for operation in operations.iter() {
            let (words, size): (&[u8], usize) = match operation {
                Operation::Read(read) => (NO_WORDS, read.len()),
                Operation::Write(write) => (&write[..], write.len()),
                Operation::Transfer(read, write) => (&write[..], read.len().max(write.len())),
                Operation::TransferInPlace(words) => (&words[..], words.len()),
                Operation::DelayNs(_) => (NO_WORDS, 0),
            };

            let end = (length + size).min(MAX_TRANSFER);
            let copied = words.len().min(end - length);
            frame[length..length + copied].copy_from_slice(&words[..copied]);
            length = end;
        }

        self.execute(&mut frame[..length]);

        let response = &frame[..length];
        let mut offset = 0;

        for operation in operations.iter_mut() {
            match operation {
                Operation::Read(words) | Operation::TransferInPlace(words) => {
                    offset = copy_response(response, offset, words);
                }
                Operation::Transfer(read, write) => {
                    let size = read.len().max(write.len());
                    copy_response(response, offset, read);
                    offset += size;
                }
                Operation::Write(write) => offset += write.len(),
                Operation::DelayNs(_) => {}
            }
        }

        Ok(())
    }
}

/// Copies the bytes clocked in at the given offset, returns the offset of the next operation
fn copy_response(response: &[u8], offset: usize, target: &mut [u8]) -> usize {
    let start = offset.min(response.len());
    let end = (offset + target.len()).min(response.len());
    target[..end - start].copy_from_slice(&response[start..end]);

    offset + target.len()
}

/// Clock advancing 1 ms on every read
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ExampleClock {
    ticks: Cell<u64>,
}

impl Clock for ExampleClock {
    type T = u64;
    const SCALING_FACTOR: Fraction = Fraction::new(1, 1_000_000);

    fn try_now(&self) -> Result<Instant<Self>, Error> {
        let now = self.ticks.get();
        self.ticks.set(now + 1_000);

        Ok(Instant::new(now))
    }

    fn new_timer<Dur: Duration + FixedPoint>(&self, duration: Dur) -> Timer<OneShot, Armed, Self, Dur> {
        Timer::new(self, duration)
    }
}
