#![allow(unused_braces)]
use modular_bitfield_msb::prelude::*;

pub const REGISTER_RXF0SIDH: u8 = 0x00;
pub const REGISTER_RXF3SIDH: u8 = 0x10;
pub const REGISTER_CANSTAT: u8 = 0x0E;
pub const REGISTER_CANCTRL: u8 = 0x0F;
pub const REGISTER_TEC: u8 = 0x1C;
pub const REGISTER_RXM0SIDH: u8 = 0x20;
pub const REGISTER_CNF3: u8 = 0x28;
pub const REGISTER_CANINTE: u8 = 0x2B;
pub const REGISTER_CANINTF: u8 = 0x2C;
pub const REGISTER_EFLG: u8 = 0x2D;
pub const REGISTER_TXB0CTRL: u8 = 0x30;
pub const REGISTER_RXB0CTRL: u8 = 0x60;
pub const REGISTER_RXB1CTRL: u8 = 0x70;

/// Size of a TX buffer block starting at TXBnCTRL (CTRL, SIDH..DLC, D0..D7)
pub const TX_BUFFER_BLOCK_SIZE: usize = 14;

/// Offset between two TX/RX buffer blocks
pub const BUFFER_STRIDE: u8 = 0x10;

/// SPI instruction set
#[derive(Copy, Clone, Debug, PartialEq)]
#[repr(u8)]
pub enum Instruction {
    Write = 0x02,
    Read = 0x03,
    BitModify = 0x05,
    /// Request to send, lower three bits select TXB0..TXB2
    RequestToSend = 0x80,
    /// Read RX buffer, bit 2 selects RXB0/RXB1, starts at RXBnSIDH
    ReadRxBuffer = 0x90,
    ReadStatus = 0xA0,
    Reset = 0xC0,
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// CAN control register
pub struct CanCtrl {
    /// Request operation mode bits
    pub reqop: B3,
    /// Abort all pending transmissions
    pub abat: bool,
    /// One-shot mode
    pub osm: bool,
    /// CLKOUT pin enable
    pub clken: bool,
    /// CLKOUT pin prescaler
    pub clkpre: B2,
}

impl CanCtrl {
    /// Bits of REQOP field
    pub const REQOP_MASK: u8 = 0b1110_0000;

    /// Bits of OSM, CLKEN and CLKPRE fields
    pub const CLOCK_MASK: u8 = 0b0000_1111;
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// CAN status register
pub struct CanStat {
    /// Operation mode bits
    pub opmod: B3,
    #[skip]
    __: B1,
    /// Interrupt flag code bits
    pub icod: B3,
    #[skip]
    __: B1,
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// Transmit buffer control register
pub struct TxbCtrl {
    #[skip]
    __: B1,
    /// Message aborted flag
    pub abtf: bool,
    /// Message lost arbitration
    pub mloa: bool,
    /// Transmission error detected
    pub txerr: bool,
    /// Message transmit request
    pub txreq: bool,
    #[skip]
    __: B1,
    /// Transmit buffer priority
    pub txp: B2,
}

impl TxbCtrl {
    /// True if the last transmission attempt reported a failure
    pub fn failed(&self) -> bool {
        self.abtf() || self.mloa() || self.txerr()
    }
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// Receive buffer 0 control register
pub struct Rxb0Ctrl {
    #[skip]
    __: B1,
    /// Receive buffer operating mode, 0b00 = receive all valid messages passing the filters
    pub rxm: B2,
    #[skip]
    __: B1,
    /// Received remote transfer request
    pub rxrtr: bool,
    /// Rollover to RXB1 if RXB0 is full
    pub bukt: bool,
    /// Read-only copy of BUKT
    pub bukt1: bool,
    /// Filter hit bit
    pub filhit0: bool,
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// Receive buffer 1 control register
pub struct Rxb1Ctrl {
    #[skip]
    __: B1,
    /// Receive buffer operating mode
    pub rxm: B2,
    #[skip]
    __: B1,
    /// Received remote transfer request
    pub rxrtr: bool,
    /// Filter hit bits
    pub filhit: B3,
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq)]
#[repr(u8)]
/// Configuration register 3
pub struct Cnf3 {
    /// Start-of-frame signal on CLKOUT instead of clock
    pub sof: bool,
    /// Wake-up filter enable
    pub wakfil: bool,
    #[skip]
    __: B3,
    /// Phase segment 2 length
    pub phseg2: B3,
}
