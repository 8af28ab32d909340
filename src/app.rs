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

//! File transfer over an open link
//!
//! A transfer is one START control packet announcing the file size, the
//! file contents split into numbered DATA packets, and one END control
//! packet. Each packet travels as the payload of a single INFO frame.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};
use crate::error::LinkError;
use crate::link::{Connection, Open, ReadOutcome};
use crate::protocol::Role;

/// Packet type byte - file contents
pub const PACKET_DATA: u8 = 1;

/// Packet type byte - transfer begins, carries the file size
pub const PACKET_START: u8 = 2;

/// Packet type byte - transfer ends, repeats the file size
pub const PACKET_END: u8 = 3;

/// Bytes in a DATA packet before the file contents
pub const DATA_HEADER_LEN: usize = 4;

/// Largest START or END packet: type, size length and a 64-bit size
pub const MAX_CONTROL_PACKET_LEN: usize = 2 + 8;

/// Link payload limit for one side of a transfer.
///
/// The sender only has to fit its own chunks and the control packets. The
/// receiver cannot know the sender's chunk size, so it accepts the largest
/// DATA packet the format can express.
pub fn payload_limit(role: Role, chunk_size: usize) -> usize {
    match role {
        Role::Initiator => (chunk_size + DATA_HEADER_LEN).max(MAX_CONTROL_PACKET_LEN),
        Role::Responder => u16::MAX as usize + DATA_HEADER_LEN,
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("empty packet")]
    Empty,

    #[error("unknown packet type {0}")]
    UnknownType(u8),

    #[error("truncated {kind} packet ({len} bytes)")]
    Truncated { kind: &'static str, len: usize },

    #[error("file size field of {0} bytes is wider than 64 bits")]
    SizeTooWide(usize),

    #[error("data packet carries {0} bytes, limit is 65535")]
    DataTooLong(usize),
}

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed packet: {0}")]
    Packet(#[from] PacketError),

    #[error("expected {expected} packet, got {found}")]
    UnexpectedPacket { expected: &'static str, found: &'static str },

    #[error("data packet {found} out of sequence, expected {expected}")]
    OutOfSequence { expected: u8, found: u8 },

    #[error("peer disconnected before the transfer finished")]
    PrematureEnd,

    #[error("announced {announced} bytes, received {received}")]
    SizeMismatch { announced: u64, received: u64 },
}

// ============================================================================
// Packets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPacket {
    pub kind: ControlKind,
    pub file_size: u64,
}

impl ControlPacket {
    pub fn start(file_size: u64) -> Self {
        ControlPacket { kind: ControlKind::Start, file_size }
    }

    pub fn end(file_size: u64) -> Self {
        ControlPacket { kind: ControlKind::End, file_size }
    }

    /// `[type, N, size...]` with the size little-endian in N bytes.
    pub fn encode(&self) -> Vec<u8> {
        let kind = match self.kind {
            ControlKind::Start => PACKET_START,
            ControlKind::End => PACKET_END,
        };

        let mut size = Vec::new();
        let mut remaining = self.file_size;
        while remaining > 0 {
            size.push((remaining & 0xFF) as u8);
            remaining >>= 8;
        }

        let mut packet = Vec::with_capacity(2 + size.len());
        packet.push(kind);
        packet.push(size.len() as u8);
        packet.extend_from_slice(&size);
        packet
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub sequence: u8,
    pub data: Vec<u8>,
}

impl DataPacket {
    /// `[1, sequence, len >> 8, len & 0xFF, data...]`
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        let len = u16::try_from(self.data.len()).map_err(|_| PacketError::DataTooLong(self.data.len()))?;

        let mut packet = Vec::with_capacity(DATA_HEADER_LEN + self.data.len());
        packet.push(PACKET_DATA);
        packet.push(self.sequence);
        packet.extend_from_slice(&len.to_be_bytes());
        packet.extend_from_slice(&self.data);
        Ok(packet)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Control(ControlPacket),
    Data(DataPacket),
}

impl Packet {
    pub fn decode(bytes: &[u8]) -> Result<Packet, PacketError> {
        let (&kind, _) = bytes.split_first().ok_or(PacketError::Empty)?;
        match kind {
            PACKET_DATA => decode_data(bytes).map(Packet::Data),
            PACKET_START => decode_control(bytes, ControlKind::Start).map(Packet::Control),
            PACKET_END => decode_control(bytes, ControlKind::End).map(Packet::Control),
            other => Err(PacketError::UnknownType(other)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::Control(ControlPacket { kind: ControlKind::Start, .. }) => "START",
            Packet::Control(ControlPacket { kind: ControlKind::End, .. }) => "END",
            Packet::Data(_) => "DATA",
        }
    }
}

fn decode_control(bytes: &[u8], kind: ControlKind) -> Result<ControlPacket, PacketError> {
    let truncated = PacketError::Truncated { kind: "control", len: bytes.len() };
    let width = *bytes.get(1).ok_or(truncated.clone())? as usize;
    if width > 8 {
        return Err(PacketError::SizeTooWide(width));
    }

    let size = bytes.get(2..2 + width).ok_or(truncated)?;
    let file_size = size
        .iter()
        .rev()
        .fold(0u64, |acc, &b| (acc << 8) | b as u64);
    Ok(ControlPacket { kind, file_size })
}

fn decode_data(bytes: &[u8]) -> Result<DataPacket, PacketError> {
    let truncated = PacketError::Truncated { kind: "data", len: bytes.len() };
    if bytes.len() < DATA_HEADER_LEN {
        return Err(truncated);
    }

    let len = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;
    let data = bytes
        .get(DATA_HEADER_LEN..DATA_HEADER_LEN + len)
        .ok_or(truncated)?;
    Ok(DataPacket { sequence: bytes[1], data: data.to_vec() })
}

// ============================================================================
// Transfers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub file_size: u64,
    pub packets: u32,
}

/// Sends the file at `path` in DATA packets of at most `chunk_size` bytes.
pub fn send_file(
    conn: &mut Connection<Open>,
    path: &Path,
    chunk_size: usize,
) -> Result<TransferSummary, TransferError> {
    let mut file = File::open(path)?;
    let file_size = file.metadata()?.len();

    conn.write(&ControlPacket::start(file_size).encode())?;
    info!(file = %path.display(), size = file_size, "transfer started");

    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut sequence = 0u8;
    let mut packets = 0u32;
    let mut sent = 0u64;
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }

        let packet = DataPacket { sequence, data: buffer[..n].to_vec() };
        conn.write(&packet.encode()?)?;
        sent += n as u64;
        packets += 1;
        sequence = sequence.wrapping_add(1);
        debug!(sequence = packet.sequence, sent, total = file_size, "sent data packet");
    }

    conn.write(&ControlPacket::end(file_size).encode())?;
    info!(size = sent, packets, "transfer finished");

    Ok(TransferSummary { file_size: sent, packets })
}

/// Receives one file into `path`. Returns once the peer has disconnected.
pub fn receive_file(
    conn: &mut Connection<Open>,
    path: &Path,
) -> Result<TransferSummary, TransferError> {
    let announced = match next_packet(conn)? {
        Packet::Control(ControlPacket { kind: ControlKind::Start, file_size }) => file_size,
        other => {
            return Err(TransferError::UnexpectedPacket { expected: "START", found: other.name() });
        }
    };
    info!(file = %path.display(), size = announced, "transfer started");

    let mut file = File::create(path)?;
    let mut expected = 0u8;
    let mut packets = 0u32;
    let mut received = 0u64;
    loop {
        match next_packet(conn)? {
            Packet::Data(packet) => {
                if packet.sequence != expected {
                    return Err(TransferError::OutOfSequence { expected, found: packet.sequence });
                }

                // Anything past the announced size is padding
                let room = announced.saturating_sub(received);
                let keep = packet.data.len().min(usize::try_from(room).unwrap_or(usize::MAX));
                file.write_all(&packet.data[..keep])?;

                received += keep as u64;
                packets += 1;
                expected = expected.wrapping_add(1);
                debug!(sequence = packet.sequence, received, total = announced, "received data packet");
            }
            Packet::Control(ControlPacket { kind: ControlKind::End, file_size }) => {
                if file_size != announced {
                    warn!(start = announced, end = file_size, "END size differs from START");
                }
                break;
            }
            other => {
                return Err(TransferError::UnexpectedPacket { expected: "DATA or END", found: other.name() });
            }
        }
    }
    file.flush()?;

    if received != announced {
        return Err(TransferError::SizeMismatch { announced, received });
    }
    info!(size = received, packets, "transfer finished");

    // Only DISC may follow END
    loop {
        match conn.read()? {
            ReadOutcome::EndOfStream => break,
            ReadOutcome::Duplicate => continue,
            ReadOutcome::Data(bytes) => {
                let found = Packet::decode(&bytes).map(|p| p.name()).unwrap_or("garbage");
                return Err(TransferError::UnexpectedPacket { expected: "disconnect", found });
            }
        }
    }

    Ok(TransferSummary { file_size: received, packets })
}

/// Next new packet from the link, skipping retransmissions.
fn next_packet(conn: &mut Connection<Open>) -> Result<Packet, TransferError> {
    loop {
        match conn.read()? {
            ReadOutcome::Data(bytes) => return Ok(Packet::decode(&bytes)?),
            outcome if outcome.is_duplicate() => debug!("skipping retransmitted packet"),
            _ => return Err(TransferError::PrematureEnd),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
