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

//! Errors surfaced by the link layer to its caller
//!
//! Framing, header and BCC2 errors are recovered inside the receiver and
//! never show up here. Everything in this module is fatal for the
//! connection: nothing past the last acknowledged frame can be trusted.

use std::time::Duration;
use thiserror::Error;
use crate::header::HeaderError;
use crate::protocol::Role;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no acknowledgment after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("peer silent for {0:?}")]
    IdleTimeout(Duration),

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("{operation} is not available to the {role}")]
    WrongRole { operation: &'static str, role: Role },

    #[error(transparent)]
    Header(#[from] HeaderError),
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to configure serial port: {0}")]
    Channel(#[from] serialport::Error),

    #[error("connection handshake failed: {0}")]
    Handshake(#[from] LinkError),
}
