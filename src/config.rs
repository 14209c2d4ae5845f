use crate::registers::{CanCtrl, Cnf3};
use crate::status::{InterruptFlags, OperationMode};
use serde::{Deserialize, Serialize};

/// Entire configuration currently supported
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// CAN bit rate and controller oscillator frequency
    pub bit_rate: BitRateConfig,

    /// Mode entered after configuration
    pub mode: RequestMode,

    /// CLKOUT pin configuration
    pub clock_output: ClockOutput,

    /// Messages are only attempted to be transmitted one time
    pub one_shot: bool,

    /// Interrupt sources driving the INT pin
    #[serde(with = "interrupt_bits")]
    pub interrupts: InterruptFlags,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bit_rate: BitRateConfig::default(),
            mode: RequestMode::Normal,
            clock_output: ClockOutput::default(),
            one_shot: false,
            interrupts: InterruptFlags::new()
                .with_rx0(true)
                .with_rx1(true)
                .with_error(true)
                .with_merr(true),
        }
    }
}

impl Configuration {
    /// Encodes the clock/one-shot part of the CANCTRL register (REQOP bits zero)
    pub(crate) fn as_canctrl(&self) -> u8 {
        let register = CanCtrl::new().with_osm(self.one_shot);

        let register = match self.clock_output {
            ClockOutput::Disabled => register,
            divisor => register.with_clken(true).with_clkpre(divisor as u8),
        };

        u8::from(register)
    }
}

/// Target mode after configuration
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum RequestMode {
    /// Normal operation on the bus
    #[default]
    Normal,
    /// Internal loopback, no bus traffic
    Loopback,
    /// Receive only, no acknowledge or error frames
    ListenOnly,
}

impl RequestMode {
    pub(crate) fn to_operation_mode(self) -> OperationMode {
        match self {
            Self::Normal => OperationMode::Normal,
            Self::Loopback => OperationMode::Loopback,
            Self::ListenOnly => OperationMode::ListenOnly,
        }
    }
}

/// CLKOUT pin prescaler
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum ClockOutput {
    /// CLKOUT pin disabled (high impedance)
    #[default]
    Disabled = 0xFF,
    DivideBy1 = 0b00,
    DivideBy2 = 0b01,
    DivideBy4 = 0b10,
    DivideBy8 = 0b11,
}

impl ClockOutput {
    /// Maps CANCTRL register values to configuration
    pub(crate) fn from_register(register: u8) -> Self {
        let canctrl = CanCtrl::from(register);

        if !canctrl.clken() {
            return Self::Disabled;
        }

        match canctrl.clkpre() {
            0b00 => Self::DivideBy1,
            0b01 => Self::DivideBy2,
            0b10 => Self::DivideBy4,
            _ => Self::DivideBy8,
        }
    }
}

/// Frequency of the oscillator attached to the controller
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum SysClk {
    MHz8,
    #[default]
    MHz16,
    MHz20,
}

/// CAN bus bit rate
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub enum CanBaudRate {
    Kbps5,
    Kbps10,
    Kbps20,
    Kbps31_25,
    Kbps33_3,
    Kbps40,
    Kbps50,
    Kbps80,
    Kbps100,
    Kbps125,
    Kbps200,
    Kbps250,
    #[default]
    Kbps500,
    Kbps1000,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BitRateConfig {
    pub sys_clk: SysClk,
    pub can_speed: CanBaudRate,
}

/// CNF1..CNF3 register values
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitTiming {
    pub cnf1: u8,
    pub cnf2: u8,
    pub cnf3: u8,
}

impl BitTiming {
    /// Register values in address order, starting at CNF3
    pub(crate) fn as_registers(&self) -> [u8; 3] {
        [self.cnf3, self.cnf2, self.cnf1]
    }

    /// Routes the clock instead of the SOF signal to CLKOUT
    pub(crate) fn with_clock_output(self) -> Self {
        let cnf3 = Cnf3::from(self.cnf3).with_sof(false);

        Self {
            cnf3: u8::from(cnf3),
            ..self
        }
    }
}

impl BitRateConfig {
    /// Looks up the bit timing registers, returns None for unsupported combinations
    pub fn calculate_values(&self) -> Option<BitTiming> {
        use CanBaudRate::*;

        let (cnf1, cnf2, cnf3) = match (self.sys_clk, self.can_speed) {
            (SysClk::MHz8, Kbps5) => (0xA7, 0xF6, 0x84),
            (SysClk::MHz8, Kbps10) => (0x93, 0xF6, 0x84),
            (SysClk::MHz8, Kbps20) => (0x89, 0xF6, 0x84),
            (SysClk::MHz8, Kbps31_25) => (0x87, 0xE5, 0x83),
            (SysClk::MHz8, Kbps33_3) => (0x85, 0xF6, 0x84),
            (SysClk::MHz8, Kbps40) => (0x84, 0xF6, 0x84),
            (SysClk::MHz8, Kbps50) => (0x84, 0xE5, 0x83),
            (SysClk::MHz8, Kbps80) => (0x84, 0xD3, 0x81),
            (SysClk::MHz8, Kbps100) => (0x81, 0xF6, 0x84),
            (SysClk::MHz8, Kbps125) => (0x81, 0xE5, 0x83),
            (SysClk::MHz8, Kbps200) => (0x80, 0xF6, 0x84),
            (SysClk::MHz8, Kbps250) => (0x80, 0xE5, 0x83),
            (SysClk::MHz8, Kbps500) => (0x00, 0xD1, 0x81),
            (SysClk::MHz8, Kbps1000) => (0x00, 0xC0, 0x80),
            (SysClk::MHz16, Kbps5) => (0x3F, 0xFF, 0x87),
            (SysClk::MHz16, Kbps10) => (0x67, 0xF6, 0x84),
            (SysClk::MHz16, Kbps20) => (0x53, 0xF6, 0x84),
            (SysClk::MHz16, Kbps33_3) => (0x4E, 0xE5, 0x83),
            (SysClk::MHz16, Kbps40) => (0x49, 0xF6, 0x84),
            (SysClk::MHz16, Kbps50) => (0x47, 0xF6, 0x84),
            (SysClk::MHz16, Kbps80) => (0x44, 0xF6, 0x84),
            (SysClk::MHz16, Kbps100) => (0x44, 0xE5, 0x83),
            (SysClk::MHz16, Kbps125) => (0x43, 0xE5, 0x83),
            (SysClk::MHz16, Kbps200) => (0x41, 0xF6, 0x84),
            (SysClk::MHz16, Kbps250) => (0x41, 0xE5, 0x83),
            (SysClk::MHz16, Kbps500) => (0x40, 0xE5, 0x83),
            (SysClk::MHz16, Kbps1000) => (0x00, 0xCA, 0x81),
            (SysClk::MHz20, Kbps33_3) => (0x0B, 0xFF, 0x87),
            (SysClk::MHz20, Kbps40) => (0x09, 0xFF, 0x87),
            (SysClk::MHz20, Kbps50) => (0x09, 0xFA, 0x87),
            (SysClk::MHz20, Kbps80) => (0x04, 0xFF, 0x87),
            (SysClk::MHz20, Kbps100) => (0x04, 0xFA, 0x87),
            (SysClk::MHz20, Kbps125) => (0x03, 0xFA, 0x87),
            (SysClk::MHz20, Kbps200) => (0x01, 0xFF, 0x87),
            (SysClk::MHz20, Kbps250) => (0x41, 0xFB, 0x86),
            (SysClk::MHz20, Kbps500) => (0x00, 0xFA, 0x87),
            (SysClk::MHz20, Kbps1000) => (0x00, 0xD9, 0x82),
            _ => return None,
        };

        Some(BitTiming { cnf1, cnf2, cnf3 })
    }
}

/// Serializes interrupt enables as the raw CANINTE byte
mod interrupt_bits {
    use crate::status::InterruptFlags;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(flags: &InterruptFlags, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(flags.bits())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<InterruptFlags, D::Error> {
        Ok(InterruptFlags::from(u8::deserialize(deserializer)?))
    }
}
