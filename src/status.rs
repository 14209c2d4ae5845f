#![allow(unused_braces)]
use crate::registers::CanStat;
use modular_bitfield_msb::prelude::*;

///  Operation status read from CANSTAT register
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct OperationStatus {
    /// Current operation mode
    pub mode: OperationMode,

    /// Highest priority pending interrupt source
    pub interrupt_code: InterruptCode,
}

impl OperationStatus {
    pub(crate) fn from_register(register: u8) -> Self {
        let canstat = CanStat::from(register);

        Self {
            mode: OperationMode::from_bits(canstat.opmod()),
            interrupt_code: InterruptCode::from_bits(canstat.icod()),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum OperationMode {
    /// Module is in normal mode, takes part in bus traffic
    Normal = 0b000,
    /// Module is in sleep mode
    Sleep = 0b001,
    /// Module is in loopback mode, transmitted frames are received internally
    Loopback = 0b010,
    /// Module is in listen-only mode
    ListenOnly = 0b011,
    /// Module is in configuration mode
    Configuration = 0b100,
    /// Reserved bit pattern, never reported by a healthy device
    Unknown = 0b111,
}

impl OperationMode {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Self::Normal,
            0b001 => Self::Sleep,
            0b010 => Self::Loopback,
            0b011 => Self::ListenOnly,
            0b100 => Self::Configuration,
            _ => Self::Unknown,
        }
    }

    pub(crate) fn from_register(register: u8) -> Self {
        Self::from_bits(register >> 5)
    }

    /// Lower case name used in console output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Sleep => "sleep",
            Self::Loopback => "loopback",
            Self::ListenOnly => "listen-only",
            Self::Configuration => "configuration",
            Self::Unknown => "unknown",
        }
    }
}

/// Interrupt flag code (CANSTAT.ICOD)
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum InterruptCode {
    None = 0b000,
    Error = 0b001,
    WakeUp = 0b010,
    TxBuffer0 = 0b011,
    TxBuffer1 = 0b100,
    TxBuffer2 = 0b101,
    RxBuffer0 = 0b110,
    RxBuffer1 = 0b111,
}

impl InterruptCode {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b111 {
            0b000 => Self::None,
            0b001 => Self::Error,
            0b010 => Self::WakeUp,
            0b011 => Self::TxBuffer0,
            0b100 => Self::TxBuffer1,
            0b101 => Self::TxBuffer2,
            0b110 => Self::RxBuffer0,
            _ => Self::RxBuffer1,
        }
    }
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
/// Result of the READ STATUS instruction
pub struct Status {
    /// CANINTF.TX2IF
    pub tx2if: bool,
    /// TXB2CTRL.TXREQ
    pub tx2req: bool,
    /// CANINTF.TX1IF
    pub tx1if: bool,
    /// TXB1CTRL.TXREQ
    pub tx1req: bool,
    /// CANINTF.TX0IF
    pub tx0if: bool,
    /// TXB0CTRL.TXREQ
    pub tx0req: bool,
    /// CANINTF.RX1IF
    pub rx1if: bool,
    /// CANINTF.RX0IF
    pub rx0if: bool,
}

impl Status {
    /// True if at least one receive buffer holds a message
    pub fn rx_pending(&self) -> bool {
        self.rx0if() || self.rx1if()
    }

    /// Raw register value
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
/// Interrupt enable (CANINTE) or interrupt flag (CANINTF) register
pub struct InterruptFlags {
    /// Message error
    pub merr: bool,
    /// Wake-up
    pub wake: bool,
    /// Error interrupt, multiple sources in EFLG
    pub error: bool,
    /// TX buffer 2 empty
    pub tx2: bool,
    /// TX buffer 1 empty
    pub tx1: bool,
    /// TX buffer 0 empty
    pub tx0: bool,
    /// RX buffer 1 full
    pub rx1: bool,
    /// RX buffer 0 full
    pub rx0: bool,
}

impl InterruptFlags {
    /// True if one of the receive buffer flags is set
    pub fn rx_pending(&self) -> bool {
        self.rx0() || self.rx1()
    }

    /// Raw register value
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }
}

#[bitfield]
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
/// Error flag register (EFLG)
pub struct ErrorFlags {
    /// Receive buffer 1 overflow
    pub rx1ovr: bool,
    /// Receive buffer 0 overflow
    pub rx0ovr: bool,
    /// Bus-off, TEC reached 255
    pub txbo: bool,
    /// Transmit error-passive, TEC >= 128
    pub txep: bool,
    /// Receive error-passive, REC >= 128
    pub rxep: bool,
    /// Transmit error warning, TEC >= 96
    pub txwar: bool,
    /// Receive error warning, REC >= 96
    pub rxwar: bool,
    /// Error warning, TXWAR or RXWAR
    pub ewarn: bool,
}

impl ErrorFlags {
    /// Flags treated as errors (overflows, bus-off and error-passive states)
    pub const ERROR_MASK: u8 = 0b1111_1000;

    /// Bits of the two RX overflow flags
    pub const OVERFLOW_MASK: u8 = 0b1100_0000;

    /// True if any flag of [Self::ERROR_MASK] is set, warnings are ignored
    pub fn is_error(&self) -> bool {
        self.bits() & Self::ERROR_MASK != 0
    }

    /// Raw register value
    pub fn bits(&self) -> u8 {
        self.into_bytes()[0]
    }
}

/// Transmit and receive error counters
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorCounters {
    /// Transmit error counter (TEC)
    pub transmit: u8,
    /// Receive error counter (REC)
    pub receive: u8,
}
