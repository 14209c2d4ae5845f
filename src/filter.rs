//!# CAN Filter
//! The MCP2515 has six acceptance filters and two masks. Filters 0 and 1 together with mask 0
//! belong to receive buffer 0, filters 2 to 5 together with mask 1 belong to receive buffer 1.
//! A mask bit set to 1 means the corresponding identifier bit has to match the filter.
//!
//! Filters and masks can only be written in configuration mode.
//!
//! ```
//!# use mcp2515::filter::{RxFilter, RxMask};
//!#
//! assert_eq!(RxMask::M0, RxFilter::F1.mask());
//! assert_eq!(RxMask::M1, RxFilter::F4.mask());
//! ```
use crate::registers::{REGISTER_RXF0SIDH, REGISTER_RXF3SIDH, REGISTER_RXM0SIDH};

/// Acceptance filter
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RxFilter {
    F0,
    F1,
    F2,
    F3,
    F4,
    F5,
}

impl RxFilter {
    pub const ALL: [Self; 6] = [Self::F0, Self::F1, Self::F2, Self::F3, Self::F4, Self::F5];

    /// Returns the address of the RXFnSIDH register
    pub(crate) fn register(&self) -> u8 {
        let index = *self as u8;

        // RXF3..RXF5 follow after the CANSTAT/CANCTRL gap
        if index < 3 {
            REGISTER_RXF0SIDH + 4 * index
        } else {
            REGISTER_RXF3SIDH + 4 * (index - 3)
        }
    }

    /// Returns the mask applied together with this filter
    pub fn mask(&self) -> RxMask {
        match self {
            Self::F0 | Self::F1 => RxMask::M0,
            _ => RxMask::M1,
        }
    }
}

/// Acceptance mask
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RxMask {
    M0,
    M1,
}

impl RxMask {
    pub const ALL: [Self; 2] = [Self::M0, Self::M1];

    /// Returns the address of the RXMnSIDH register
    pub(crate) fn register(&self) -> u8 {
        REGISTER_RXM0SIDH + 4 * (*self as u8)
    }
}
