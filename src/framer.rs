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

//! Byte stuffing and block check characters

use thiserror::Error;
use crate::protocol::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("escape byte at end of frame body")]
    TrailingEscape,

    #[error("invalid escape sequence 0x7D 0x{0:02X}")]
    InvalidEscape(u8),
}

/// XOR of every byte in `bytes`.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Escapes every FLAG and ESCAPE in `bytes`.
pub fn stuff(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + bytes.len() / 8);
    for &b in bytes {
        match b {
            FLAG | ESCAPE => {
                out.push(ESCAPE);
                out.push(b ^ STUFF_MASK);
            }
            _ => out.push(b),
        }
    }
    out
}

pub fn destuff(bytes: &[u8]) -> Result<Vec<u8>, FramingError> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().copied();
    while let Some(b) = iter.next() {
        if b != ESCAPE {
            out.push(b);
            continue;
        }
        match iter.next() {
            Some(ESCAPED_FLAG) => out.push(FLAG),
            Some(ESCAPED_ESCAPE) => out.push(ESCAPE),
            Some(other) => return Err(FramingError::InvalidEscape(other)),
            None => return Err(FramingError::TrailingEscape),
        }
    }
    Ok(out)
}

/// Assembles the bytes of a complete frame.
///
/// `header` is Address, Control and BCC1. When `payload` is given the frame
/// is an INFO frame: payload and BCC2 are stuffed together and placed
/// between the header and the closing FLAG.
pub fn build_frame(header: [u8; 3], payload: Option<&[u8]>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(5 + payload.map_or(0, |p| p.len() * 2 + 2));
    frame.push(FLAG);
    frame.extend_from_slice(&header);
    if let Some(payload) = payload {
        let mut body = Vec::with_capacity(payload.len() + 1);
        body.extend_from_slice(payload);
        body.push(checksum(payload));
        frame.extend_from_slice(&stuff(&body));
    }
    frame.push(FLAG);
    frame
}

/// Largest stuffed body (payload plus BCC2) a payload of `max_payload`
/// bytes can produce.
pub fn max_stuffed_len(max_payload: usize) -> usize {
    (max_payload + 1) * 2
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_checksum() {
        assert_eq!(checksum(&[]), 0);
        assert_eq!(checksum(&[0x41, 0x42]), 0x03);
        assert_eq!(checksum(&[0x03, 0x03]), 0x00);
        assert_eq!(checksum(&[0x01, 0x85]), 0x84);
    }

    #[test]
    fn test_stuff() {
        assert_eq!(stuff(b"plain"), b"plain".to_vec());
        assert_eq!(stuff(&[FLAG]), vec![0x7D, 0x5E]);
        assert_eq!(stuff(&[ESCAPE]), vec![0x7D, 0x5D]);
        assert_eq!(
            stuff(&[0x01, FLAG, 0x02, ESCAPE, 0x03]),
            vec![0x01, 0x7D, 0x5E, 0x02, 0x7D, 0x5D, 0x03]
        );
    }

    #[test]
    fn test_destuff() {
        assert_eq!(destuff(&[0x7D, 0x5E, 0x7D, 0x5D]), Ok(vec![FLAG, ESCAPE]));
        assert_eq!(destuff(&[0x10, 0x7D]), Err(FramingError::TrailingEscape));
        assert_eq!(destuff(&[0x7D, 0x41]), Err(FramingError::InvalidEscape(0x41)));
    }

    #[test]
    fn test_build_control_frame() {
        let frame = build_frame([0x03, 0x03, 0x00], None);
        assert_eq!(frame, vec![0x7E, 0x03, 0x03, 0x00, 0x7E]);
    }

    #[test]
    fn test_build_info_frame_stuffs_bcc2() {
        // BCC2 of [0x7E] is 0x7E itself and must be escaped too
        let frame = build_frame([0x03, 0x00, 0x03], Some(&[0x7E]));
        assert_eq!(frame, vec![0x7E, 0x03, 0x00, 0x03, 0x7D, 0x5E, 0x7D, 0x5E, 0x7E]);

        let frame = build_frame([0x03, 0x40, 0x43], Some(&[0x41, 0x42]));
        assert_eq!(frame, vec![0x7E, 0x03, 0x40, 0x43, 0x41, 0x42, 0x03, 0x7E]);
    }

    #[test]
    fn test_empty_info_body() {
        let frame = build_frame([0x03, 0x00, 0x03], Some(&[]));
        assert_eq!(frame, vec![0x7E, 0x03, 0x00, 0x03, 0x00, 0x7E]);
    }

    proptest! {
        #[test]
        fn destuff_inverts_stuff(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            prop_assert_eq!(destuff(&stuff(&bytes)).unwrap(), bytes);
        }

        #[test]
        fn stuffed_output_has_no_raw_delimiters(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            let stuffed = stuff(&bytes);
            prop_assert!(!stuffed.contains(&FLAG));
            prop_assert!(stuffed.len() <= max_stuffed_len(bytes.len()));
            let mut iter = stuffed.iter();
            while let Some(&b) = iter.next() {
                if b == ESCAPE {
                    let next = iter.next().copied();
                    prop_assert!(next == Some(ESCAPED_FLAG) || next == Some(ESCAPED_ESCAPE));
                }
            }
        }
    }
}
