//! Decoded sensor telegrams.
//!
//! Only radio telegrams (ERP1) of two kinds are understood:
//!
//! ```text
//! switch  (0xf6): [0xf6] [button state] [sender:4] [status]
//! contact (0xd5): [0xd5] [contact state] [sender:4] [status]
//! ```

use std::fmt;

use crate::protocol::{Packet, PacketType};
use crate::types::SensorId;

/// Highest button code produced by a rocker switch.
pub const MAX_BUTTON: u8 = 8;

/// ERP1 telegram subtypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Erp1Type {
    /// 4-button rocker switch with up to 2 actions per event.
    Switch = 0xf6,
    /// Contact, e.g. a magnetic window/door contact.
    Contact = 0xd5,
}

impl Erp1Type {
    /// Parses a subtype from its tag byte.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xf6 => Some(Self::Switch),
            0xd5 => Some(Self::Contact),
            _ => None,
        }
    }
}

/// Maps a rocker switch button state byte to a button code.
///
/// Returns 1-4 for a single button, 5-8 for two-button combinations and 0
/// for no button or an invalid combination.
#[must_use]
pub const fn button_id(button_state: u8) -> u8 {
    match button_state {
        0x30 => 1, // top left
        0x10 => 2, // bottom left
        0x70 => 3, // top right
        0x50 => 4, // bottom right
        0x37 => 5, // both top buttons
        0x15 => 6, // both bottom buttons
        0x35 => 7, // top left and bottom right
        0x17 => 8, // top right and bottom left
        _ => 0,
    }
}

/// A decoded telegram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Telegram {
    /// Rocker switch event.
    Switch {
        /// Switch address.
        sender: SensorId,
        /// Button code 0-8.
        button: u8,
        /// False for a release.
        pressed: bool,
    },
    /// Contact state change.
    Contact {
        /// Contact address.
        sender: SensorId,
        /// True if the contact is closed.
        closed: bool,
    },
}

impl Telegram {
    /// Decodes a telegram from a validated packet.
    ///
    /// Returns `None` for packet types and subtypes that are not understood,
    /// and for radio telegrams too short to carry a sender.
    #[must_use]
    pub fn from_packet(packet: &Packet) -> Option<Self> {
        if packet.packet_type() != PacketType::RadioErp1 {
            return None;
        }
        let data = packet.data();
        let kind = Erp1Type::from_byte(*data.first()?)?;
        let state = *data.get(1)?;
        let sender = SensorId::try_from_bytes(data.get(2..6)?)?;

        Some(match kind {
            Erp1Type::Switch => Self::Switch {
                sender,
                button: button_id(state),
                pressed: state != 0,
            },
            Erp1Type::Contact => Self::Contact {
                sender,
                closed: state & 0x01 != 0,
            },
        })
    }

    /// Returns the sending sensor.
    #[must_use]
    pub const fn sender(&self) -> SensorId {
        match self {
            Self::Switch { sender, .. } | Self::Contact { sender, .. } => *sender,
        }
    }

    /// Returns the button code used for mapping lookups.
    ///
    /// Contacts map open to 0 and closed to 1.
    #[must_use]
    pub const fn button_code(&self) -> u8 {
        match self {
            Self::Switch { button, .. } => *button,
            Self::Contact { closed, .. } => *closed as u8,
        }
    }
}

impl fmt::Display for Telegram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Switch {
                sender,
                pressed: false,
                ..
            } => write!(f, "switch {sender} released"),
            Self::Switch {
                sender,
                button: 0,
                pressed: true,
            } => write!(f, "switch {sender} invalid button combination"),
            Self::Switch { sender, button, .. } => write!(f, "switch {sender} button {button}"),
            Self::Contact {
                sender,
                closed: true,
            } => write!(f, "contact {sender} closed"),
            Self::Contact { sender, .. } => write!(f, "contact {sender} open"),
        }
    }
}
