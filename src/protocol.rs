// Copyright (C) 2026 Brian Johnson
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Link protocol constants and the types shared by every layer

use std::fmt;

/// Frame delimiter - opens and closes every frame
pub const FLAG: u8 = 0x7E;

/// Escape - precedes a stuffed FLAG or ESCAPE inside an INFO body
pub const ESCAPE: u8 = 0x7D;

/// XOR mask applied to a stuffed byte
pub const STUFF_MASK: u8 = 0x20;

/// FLAG as it appears after stuffing
pub const ESCAPED_FLAG: u8 = FLAG ^ STUFF_MASK;

/// ESCAPE as it appears after stuffing
pub const ESCAPED_ESCAPE: u8 = ESCAPE ^ STUFF_MASK;

/// Address carried by every frame the Initiator emits
pub const ADDRESS_COMMAND: u8 = 0x03;

/// Address carried by every frame the Responder emits
pub const ADDRESS_RESPONSE: u8 = 0x01;

pub const CONTROL_SET: u8 = 0x03;
pub const CONTROL_DISC: u8 = 0x0B;
pub const CONTROL_UA: u8 = 0x07;
pub const CONTROL_INFO_0: u8 = 0x00;
pub const CONTROL_INFO_1: u8 = 0x40;
pub const CONTROL_RR_0: u8 = 0x05;
pub const CONTROL_RR_1: u8 = 0x85;
pub const CONTROL_REJ_0: u8 = 0x01;
pub const CONTROL_REJ_1: u8 = 0x81;

// ============================================================================
// Role
// ============================================================================

/// Side of the link. The Initiator opens the connection and sends data,
/// the Responder accepts it and receives data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

impl Role {
    /// Address byte placed in every frame this role emits.
    pub fn address(self) -> u8 {
        match self {
            Role::Initiator => ADDRESS_COMMAND,
            Role::Responder => ADDRESS_RESPONSE,
        }
    }

    pub fn peer(self) -> Role {
        match self {
            Role::Initiator => Role::Responder,
            Role::Responder => Role::Initiator,
        }
    }

    /// Whether this role is allowed to put `frame` on the wire.
    pub fn can_send(self, frame: Frame) -> bool {
        match (self, frame) {
            (_, Frame::Disc | Frame::Ua) => true,
            (Role::Initiator, Frame::Set | Frame::Info(_)) => true,
            (Role::Responder, Frame::Rr(_) | Frame::Rej(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

// ============================================================================
// Parity
// ============================================================================

/// One-bit sequence number of a data frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    Zero,
    One,
}

impl Parity {
    pub fn flip(self) -> Parity {
        match self {
            Parity::Zero => Parity::One,
            Parity::One => Parity::Zero,
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Parity::Zero => 0,
            Parity::One => 1,
        }
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Kind of a frame, with the sequence bit for the kinds that carry one.
/// The payload of an INFO frame travels separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Set,
    Disc,
    Ua,
    Rr(Parity),
    Rej(Parity),
    Info(Parity),
}

impl Frame {
    pub fn control(self) -> u8 {
        match self {
            Frame::Set => CONTROL_SET,
            Frame::Disc => CONTROL_DISC,
            Frame::Ua => CONTROL_UA,
            Frame::Info(Parity::Zero) => CONTROL_INFO_0,
            Frame::Info(Parity::One) => CONTROL_INFO_1,
            Frame::Rr(Parity::Zero) => CONTROL_RR_0,
            Frame::Rr(Parity::One) => CONTROL_RR_1,
            Frame::Rej(Parity::Zero) => CONTROL_REJ_0,
            Frame::Rej(Parity::One) => CONTROL_REJ_1,
        }
    }

    pub fn from_control(control: u8) -> Option<Frame> {
        match control {
            CONTROL_SET => Some(Frame::Set),
            CONTROL_DISC => Some(Frame::Disc),
            CONTROL_UA => Some(Frame::Ua),
            CONTROL_INFO_0 => Some(Frame::Info(Parity::Zero)),
            CONTROL_INFO_1 => Some(Frame::Info(Parity::One)),
            CONTROL_RR_0 => Some(Frame::Rr(Parity::Zero)),
            CONTROL_RR_1 => Some(Frame::Rr(Parity::One)),
            CONTROL_REJ_0 => Some(Frame::Rej(Parity::Zero)),
            CONTROL_REJ_1 => Some(Frame::Rej(Parity::One)),
            _ => None,
        }
    }

    /// Acknowledgments are written once and never acknowledged themselves.
    pub fn is_acknowledgment(self) -> bool {
        matches!(self, Frame::Ua | Frame::Rr(_) | Frame::Rej(_))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frame::Set => write!(f, "SET"),
            Frame::Disc => write!(f, "DISC"),
            Frame::Ua => write!(f, "UA"),
            Frame::Rr(p) => write!(f, "RR({})", p.bit()),
            Frame::Rej(p) => write!(f, "REJ({})", p.bit()),
            Frame::Info(p) => write!(f, "INFO({})", p.bit()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_FRAMES: [Frame; 9] = [
        Frame::Set,
        Frame::Disc,
        Frame::Ua,
        Frame::Rr(Parity::Zero),
        Frame::Rr(Parity::One),
        Frame::Rej(Parity::Zero),
        Frame::Rej(Parity::One),
        Frame::Info(Parity::Zero),
        Frame::Info(Parity::One),
    ];

    #[test]
    fn test_control_bytes_are_distinct() {
        for frame in ALL_FRAMES {
            assert_eq!(Frame::from_control(frame.control()), Some(frame));
        }
        assert_eq!(Frame::from_control(0x42), None);
    }

    #[test]
    fn test_stuffed_forms() {
        assert_eq!(ESCAPED_FLAG, 0x5E);
        assert_eq!(ESCAPED_ESCAPE, 0x5D);
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Initiator.can_send(Frame::Set));
        assert!(Role::Initiator.can_send(Frame::Info(Parity::One)));
        assert!(!Role::Initiator.can_send(Frame::Rr(Parity::Zero)));
        assert!(Role::Responder.can_send(Frame::Rej(Parity::One)));
        assert!(!Role::Responder.can_send(Frame::Set));
        assert!(!Role::Responder.can_send(Frame::Info(Parity::Zero)));
        assert!(Role::Responder.can_send(Frame::Disc));
        assert!(Role::Initiator.can_send(Frame::Ua));
    }

    #[test]
    fn test_parity_flip() {
        assert_eq!(Parity::Zero.flip(), Parity::One);
        assert_eq!(Parity::One.flip().flip(), Parity::One);
    }
}
