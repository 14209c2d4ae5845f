//!# CAN Frame
//! [CanFrame] is the frame type transmitted and received by the controller.
//! It implements [embedded_can::Frame], so frames are usually created through that trait:
//!
//! ```
//!# use mcp2515::frame::CanFrame;
//!# use embedded_can::{ExtendedId, Frame, Id, StandardId};
//!#
//! let standard = CanFrame::new(StandardId::new(0x123).unwrap(), &[0x12, 0x34]).unwrap();
//! assert!(!standard.is_extended());
//!
//! let extended = CanFrame::new(ExtendedId::new(0x12345678).unwrap(), &[0xAB; 8]).unwrap();
//! assert!(extended.is_extended());
//!
//! // Console representation
//! assert_eq!("0x123 (2 bytes): 12 34", format!("{}", standard));
//!
//! // CAN 2.0 frames carry at most 8 bytes
//! assert!(CanFrame::new(StandardId::new(0x123).unwrap(), &[0u8; 9]).is_none());
//! ```
use core::fmt;
use embedded_can::{ExtendedId, Frame, Id, StandardId};

pub const MAX_PAYLOAD: usize = 8;

/// Size of the id registers (SIDH, SIDL, EID8, EID0)
pub(crate) const ID_REGISTER_SIZE: usize = 4;

/// Size of the id registers, DLC register and data registers of a TX/RX buffer
pub(crate) const BUFFER_SIZE: usize = ID_REGISTER_SIZE + 1 + MAX_PAYLOAD;

/// SIDL: extended identifier enable
const SIDL_EXIDE: u8 = 1 << 3;

/// SIDL: standard frame remote transmit request (receive only)
const SIDL_SRR: u8 = 1 << 4;

/// DLC: remote transmission request
const DLC_RTR: u8 = 1 << 6;

const DLC_MASK: u8 = 0x0F;

/// CAN 2.0 frame, fields are only set by constructors which keep `dlc` within [MAX_PAYLOAD]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CanFrame {
    identifier: Id,
    rtr: bool,
    dlc: usize,
    data: [u8; MAX_PAYLOAD],
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        if data.len() > MAX_PAYLOAD {
            return None;
        }

        let mut frame = CanFrame {
            identifier: id.into(),
            rtr: false,
            dlc: data.len(),
            data: [0; MAX_PAYLOAD],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(id: impl Into<Id>, dlc: usize) -> Option<Self> {
        if dlc > MAX_PAYLOAD {
            return None;
        }

        Some(CanFrame {
            identifier: id.into(),
            rtr: true,
            dlc,
            data: [0; MAX_PAYLOAD],
        })
    }

    fn is_extended(&self) -> bool {
        matches!(self.identifier, Id::Extended(_))
    }

    fn is_remote_frame(&self) -> bool {
        self.rtr
    }

    fn id(&self) -> Id {
        self.identifier
    }

    fn dlc(&self) -> usize {
        self.dlc
    }

    fn data(&self) -> &[u8] {
        if self.rtr {
            return &[];
        }

        &self.data[..self.dlc]
    }
}

/// Error when decoding a received buffer
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Data length code above 8
    InvalidDlc(u8),
}

impl CanFrame {
    /// Encodes id, DLC and payload as written to TXBnSIDH..TXBnD7
    pub(crate) fn to_buffer(&self) -> [u8; BUFFER_SIZE] {
        let mut buffer = [0u8; BUFFER_SIZE];

        buffer[..ID_REGISTER_SIZE].copy_from_slice(&encode_id(self.identifier, true));

        buffer[ID_REGISTER_SIZE] = self.dlc as u8 & DLC_MASK;
        if self.rtr {
            buffer[ID_REGISTER_SIZE] |= DLC_RTR;
        } else {
            buffer[ID_REGISTER_SIZE + 1..].copy_from_slice(&self.data);
        }

        buffer
    }

    /// Decodes a buffer read from RXBnSIDH..RXBnD7
    pub(crate) fn from_buffer(buffer: &[u8; BUFFER_SIZE]) -> Result<Self, FrameError> {
        let sidl = buffer[1];
        let dlc_register = buffer[ID_REGISTER_SIZE];

        let dlc = dlc_register & DLC_MASK;
        if dlc as usize > MAX_PAYLOAD {
            return Err(FrameError::InvalidDlc(dlc));
        }

        let identifier = decode_id(&[buffer[0], buffer[1], buffer[2], buffer[3]]);

        let rtr = match identifier {
            Id::Standard(_) => sidl & SIDL_SRR != 0,
            Id::Extended(_) => dlc_register & DLC_RTR != 0,
        };

        let mut data = [0u8; MAX_PAYLOAD];
        if !rtr {
            data[..dlc as usize].copy_from_slice(&buffer[ID_REGISTER_SIZE + 1..ID_REGISTER_SIZE + 1 + dlc as usize]);
        }

        Ok(Self {
            identifier,
            rtr,
            dlc: dlc as usize,
            data,
        })
    }
}

/// Encodes the identifier as SIDH, SIDL, EID8, EID0 register values.
/// `mark_extended` sets the EXIDE bit for extended identifiers (not wanted for masks).
pub(crate) fn encode_id(identifier: Id, mark_extended: bool) -> [u8; ID_REGISTER_SIZE] {
    match identifier {
        Id::Standard(sid) => {
            let raw = sid.as_raw();
            [(raw >> 3) as u8, ((raw & 0x07) << 5) as u8, 0, 0]
        }
        Id::Extended(eid) => {
            let raw = eid.as_raw();
            let mut sidl = (((raw >> 18) & 0x07) << 5) as u8 | ((raw >> 16) & 0x03) as u8;
            if mark_extended {
                sidl |= SIDL_EXIDE;
            }

            [(raw >> 21) as u8, sidl, (raw >> 8) as u8, raw as u8]
        }
    }
}

/// Decodes SIDH, SIDL, EID8, EID0 register values
pub(crate) fn decode_id(registers: &[u8; ID_REGISTER_SIZE]) -> Id {
    let [sidh, sidl, eid8, eid0] = *registers;
    let sid = ((sidh as u16) << 3) | ((sidl as u16) >> 5);

    if sidl & SIDL_EXIDE == 0 {
        // 11 bit value always fits
        return Id::Standard(StandardId::new(sid).unwrap_or(StandardId::ZERO));
    }

    let raw = ((sid as u32) << 18) | (((sidl & 0x03) as u32) << 16) | ((eid8 as u32) << 8) | eid0 as u32;

    // 29 bit value always fits
    Id::Extended(ExtendedId::new(raw).unwrap_or(ExtendedId::ZERO))
}

impl fmt::Display for CanFrame {
    /// `0x123 (RTR) (EFF) (8 bytes): 12 34 56 78 9a bc de f0`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.identifier {
            Id::Standard(sid) => write!(f, "{:#x}", sid.as_raw())?,
            Id::Extended(eid) => write!(f, "{:#x}", eid.as_raw())?,
        }

        if self.rtr {
            f.write_str(" (RTR)")?;
        }

        if self.is_extended() {
            f.write_str(" (EFF)")?;
        }

        write!(f, " ({} bytes):", self.dlc)?;

        for byte in self.data() {
            write!(f, " {byte:02x}")?;
        }

        Ok(())
    }
}
