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

//! Frame header codec: Address, Control and BCC1

use thiserror::Error;
use crate::framer::checksum;
use crate::protocol::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("header BCC1 mismatch: expected 0x{expected:02X}, got 0x{found:02X}")]
    InvalidChecksum { expected: u8, found: u8 },

    #[error("unrecognized header: address 0x{address:02X}, control 0x{control:02X}")]
    Unrecognized { address: u8, control: u8 },

    #[error("{frame} cannot be sent by the {role}")]
    InvalidFrameKind { frame: Frame, role: Role },
}

/// Builds the header bytes `role` emits for `frame`.
pub fn encode_header(role: Role, frame: Frame) -> Result<[u8; 3], HeaderError> {
    if !role.can_send(frame) {
        return Err(HeaderError::InvalidFrameKind { frame, role });
    }
    let address = role.address();
    let control = frame.control();
    Ok([address, control, checksum(&[address, control])])
}

/// Parses a header received by `role`, i.e. one emitted by its peer.
pub fn decode_header(bytes: &[u8; 3], role: Role) -> Result<Frame, HeaderError> {
    let [address, control, bcc1] = *bytes;
    let expected = checksum(&[address, control]);
    if bcc1 != expected {
        return Err(HeaderError::InvalidChecksum { expected, found: bcc1 });
    }

    let sender = role.peer();
    match Frame::from_control(control) {
        Some(frame) if address == sender.address() && sender.can_send(frame) => Ok(frame),
        _ => Err(HeaderError::Unrecognized { address, control }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_table() {
        use Parity::*;
        let cases = [
            (Role::Initiator, Frame::Set, [0x03, 0x03]),
            (Role::Initiator, Frame::Disc, [0x03, 0x0B]),
            (Role::Responder, Frame::Disc, [0x01, 0x0B]),
            (Role::Responder, Frame::Ua, [0x01, 0x07]),
            (Role::Initiator, Frame::Ua, [0x03, 0x07]),
            (Role::Initiator, Frame::Info(Zero), [0x03, 0x00]),
            (Role::Initiator, Frame::Info(One), [0x03, 0x40]),
            (Role::Responder, Frame::Rr(Zero), [0x01, 0x05]),
            (Role::Responder, Frame::Rr(One), [0x01, 0x85]),
            (Role::Responder, Frame::Rej(Zero), [0x01, 0x01]),
            (Role::Responder, Frame::Rej(One), [0x01, 0x81]),
        ];

        for (role, frame, [address, control]) in cases {
            let header = encode_header(role, frame).expect("valid combination");
            assert_eq!(header[0], address, "address of {} from {}", frame, role);
            assert_eq!(header[1], control, "control of {} from {}", frame, role);
            assert_eq!(header[0] ^ header[1] ^ header[2], 0, "BCC1 of {}", frame);
        }
    }

    #[test]
    fn test_encode_rejects_wrong_role() {
        assert_eq!(
            encode_header(Role::Responder, Frame::Set),
            Err(HeaderError::InvalidFrameKind { frame: Frame::Set, role: Role::Responder })
        );
        assert!(encode_header(Role::Initiator, Frame::Rr(Parity::One)).is_err());
        assert!(encode_header(Role::Responder, Frame::Info(Parity::Zero)).is_err());
    }

    #[test]
    fn test_decode_mirrors_encode() {
        let frames = [
            Frame::Set,
            Frame::Disc,
            Frame::Ua,
            Frame::Info(Parity::Zero),
            Frame::Info(Parity::One),
            Frame::Rr(Parity::Zero),
            Frame::Rr(Parity::One),
            Frame::Rej(Parity::Zero),
            Frame::Rej(Parity::One),
        ];

        for sender in [Role::Initiator, Role::Responder] {
            for frame in frames {
                if let Ok(header) = encode_header(sender, frame) {
                    assert_eq!(decode_header(&header, sender.peer()), Ok(frame));
                }
            }
        }
    }

    #[test]
    fn test_decode_bad_checksum() {
        assert_eq!(
            decode_header(&[0x03, 0x03, 0x01], Role::Responder),
            Err(HeaderError::InvalidChecksum { expected: 0x00, found: 0x01 })
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        // Own frames echoed back are not valid input
        let set = encode_header(Role::Initiator, Frame::Set).unwrap();
        assert_eq!(
            decode_header(&set, Role::Initiator),
            Err(HeaderError::Unrecognized { address: 0x03, control: 0x03 })
        );

        // Unknown control byte
        assert!(matches!(
            decode_header(&[0x03, 0x22, 0x21], Role::Responder),
            Err(HeaderError::Unrecognized { .. })
        ));

        // RR from the command address
        assert!(matches!(
            decode_header(&[0x03, 0x05, 0x06], Role::Initiator),
            Err(HeaderError::Unrecognized { .. })
        ));
    }
}
