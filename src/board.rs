//!# Board profiles
//! Pin assignments of the supported MCP2515 boards wired to a Raspberry Pi Pico.
//! A board is either selected by name or detected by trying every known profile
//! until controller bring-up succeeds.
//!
//! ```
//!# use mcp2515::board::{select_board, BoardError, BoardSelection, MCP2515_BREAKOUT};
//!#
//! // Only the breakout board answers
//! let (profile, chip_select) = select_board(BoardSelection::Auto, |profile| {
//!     if profile.name == MCP2515_BREAKOUT.name {
//!         Ok(profile.chip_select_pin)
//!     } else {
//!         Err(())
//!     }
//! })
//! .unwrap();
//!
//! assert_eq!(MCP2515_BREAKOUT, *profile);
//! assert_eq!(5, chip_select);
//!
//! let result = select_board(BoardSelection::Named("unknown"), |_| Ok::<_, ()>(()));
//! assert_eq!(BoardError::UnknownBoard, result.unwrap_err());
//! ```
use log::debug;

/// Highest GPIO number of the RP2040
pub const MAX_GPIO: u8 = 29;

/// Pin assignment of a CAN board
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BoardProfile {
    /// Display name, also used for selection by name
    pub name: &'static str,
    /// GPIO connected to the active-low INT output
    pub interrupt_pin: u8,
    /// GPIO driving the chip select line
    pub chip_select_pin: u8,
    /// SPI clock (SCK)
    pub clock_pin: u8,
    /// SPI data out of the MCU (MOSI)
    pub data_out_pin: u8,
    /// SPI data into the MCU (MISO)
    pub data_in_pin: u8,
}

/// Joy-IT SBC-CAN01 wired to SPI0
pub const JOY_IT_SBC_CAN01: BoardProfile = BoardProfile {
    name: "joy-it",
    interrupt_pin: 15,
    chip_select_pin: 9,
    clock_pin: 18,
    data_out_pin: 19,
    data_in_pin: 16,
};

/// Generic MCP2515/TJA1050 breakout wired to the low SPI0 pins
pub const MCP2515_BREAKOUT: BoardProfile = BoardProfile {
    name: "breakout",
    interrupt_pin: 6,
    chip_select_pin: 5,
    clock_pin: 2,
    data_out_pin: 3,
    data_in_pin: 4,
};

/// Known boards in detection order
pub static BOARDS: [BoardProfile; 2] = [JOY_IT_SBC_CAN01, MCP2515_BREAKOUT];

/// Possible profile validation errors
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ProfileError {
    /// Pin number is not a GPIO of the target
    InvalidPin(u8),
    /// Pin is assigned to more than one signal
    DuplicatePin(u8),
}

impl BoardProfile {
    /// All pins in order INT, CS, SCK, MOSI, MISO
    pub fn pins(&self) -> [u8; 5] {
        [
            self.interrupt_pin,
            self.chip_select_pin,
            self.clock_pin,
            self.data_out_pin,
            self.data_in_pin,
        ]
    }

    /// Checks that all pins are valid GPIO numbers and pairwise distinct
    pub fn validate(&self) -> Result<(), ProfileError> {
        let pins = self.pins();

        for (index, pin) in pins.iter().enumerate() {
            if *pin > MAX_GPIO {
                return Err(ProfileError::InvalidPin(*pin));
            }

            if pins[index + 1..].contains(pin) {
                return Err(ProfileError::DuplicatePin(*pin));
            }
        }

        Ok(())
    }
}

/// Looks up a known board by name, ignoring case
pub fn find_board(name: &str) -> Option<&'static BoardProfile> {
    find_board_in(&BOARDS, name)
}

/// Looks up a board of the given table by name, ignoring case
pub fn find_board_in<'p>(boards: &'p [BoardProfile], name: &str) -> Option<&'p BoardProfile> {
    boards.iter().find(|profile| profile.name.eq_ignore_ascii_case(name))
}

/// How the board is chosen
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BoardSelection<'a> {
    /// Use the board with the given name
    Named(&'a str),
    /// Try all known boards in order
    Auto,
}

/// Possible errors during board selection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BoardError<E> {
    /// No board with the given name
    UnknownBoard,
    /// Named board has an invalid pin assignment
    InvalidProfile(ProfileError),
    /// Bring-up of the named board failed
    BringUpFailed(E),
    /// Bring-up failed on all candidates, carries the error of the last tried board
    NoBoardResponded(Option<E>),
}

/// Selects one of the known [BOARDS] and returns it together with the result of its successful bring-up
pub fn select_board<T, E, F>(
    selection: BoardSelection<'_>,
    attempt: F,
) -> Result<(&'static BoardProfile, T), BoardError<E>>
where
    E: core::fmt::Debug,
    F: FnMut(&'static BoardProfile) -> Result<T, E>,
{
    select_board_in(&BOARDS, selection, attempt)
}

/// Selects a board of the given table, trying candidates in table order.
/// Every candidate is tried exactly once, boards with invalid pin assignments never.
pub fn select_board_in<'p, T, E, F>(
    boards: &'p [BoardProfile],
    selection: BoardSelection<'_>,
    mut attempt: F,
) -> Result<(&'p BoardProfile, T), BoardError<E>>
where
    E: core::fmt::Debug,
    F: FnMut(&'p BoardProfile) -> Result<T, E>,
{
    match selection {
        BoardSelection::Named(name) => {
            let profile = find_board_in(boards, name).ok_or(BoardError::UnknownBoard)?;
            profile.validate().map_err(BoardError::InvalidProfile)?;

            let result = attempt(profile).map_err(BoardError::BringUpFailed)?;
            Ok((profile, result))
        }
        BoardSelection::Auto => {
            let mut last_error = None;

            for profile in boards.iter() {
                if let Err(error) = profile.validate() {
                    debug!("Skipping board {}: {error:?}", profile.name);
                    continue;
                }

                match attempt(profile) {
                    Ok(result) => return Ok((profile, result)),
                    Err(error) => {
                        debug!("No response from board {}: {error:?}", profile.name);
                        last_error = Some(error);
                    }
                }
            }

            Err(BoardError::NoBoardResponded(last_error))
        }
    }
}
