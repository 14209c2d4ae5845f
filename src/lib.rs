#![cfg_attr(not(test), no_std)]
#![cfg_attr(feature = "strict", deny(warnings))]
#![allow(clippy::identity_op)]

//! # Library for MCP2515 CAN controller
//!
//! Crate currently offer the following features:
//! * CAN 2.0 frames with standard and extended identifiers, including remote frames
//! * Bit timing for 8, 16 and 20 MHz oscillators
//! * Receive via polling or the INT line
//! * Acceptance filters and masks
//! * Loopback demo with board profiles for the Raspberry Pi Pico
//! * no_std support
//!
//!## Example
//! For detailed example with rp-pico check the `example` directory of the repository
//!
//!## CAN Tx/Rx example
//!
//!```
//!use mcp2515::example::{ExampleClock,ExampleSPIDevice};
//!use mcp2515::can::{CanController,Controller};
//!use mcp2515::frame::CanFrame;
//!use mcp2515::config::*;
//!use embedded_can::{Frame,Id,StandardId};
//!
//!let spi_dev = ExampleSPIDevice::default();
//!let clock = ExampleClock::default();
//!
//!let mut controller: Controller<_, ExampleClock> = Controller::new(spi_dev);
//! // configure CAN controller
//!controller
//!    .configure(
//!        &Configuration {
//!            bit_rate: BitRateConfig {
//!                sys_clk: SysClk::MHz8,
//!                can_speed: CanBaudRate::Kbps125,
//!                },
//!            mode: RequestMode::Loopback,
//!            clock_output: ClockOutput::Disabled,
//!            one_shot: false,
//!            ..Default::default()
//!             },
//!        &clock,
//!         ).unwrap();
//!
//! // Create message frame
//!let can_id = Id::Standard(StandardId::new(0x55).unwrap());
//!let payload = [1, 2, 3, 4, 5, 6, 7, 8];
//!let frame = CanFrame::new(can_id, &payload).unwrap();
//!
//!// Transmit CAN message
//!controller.transmit(&frame).unwrap();
//!
//!// Receive CAN message
//!let received = controller.receive().unwrap();
//!assert_eq!(can_id, received.id());
//!assert_eq!(received.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
//!```

#[cfg(test)]
extern crate alloc;

pub mod can;
pub mod config;
pub mod status;

pub mod filter;
pub mod frame;

pub mod board;
pub mod demo;

pub mod example;
#[cfg(test)]
pub(crate) mod mocks;
mod registers;
#[cfg(test)]
mod tests;
