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

use std::marker::PhantomData;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use crate::error::{ConnectError, LinkError};
use crate::protocol::*;
use crate::receiver::FrameReceiver;
use crate::sender::FrameSender;
use crate::serial::{ByteChannel, ChannelConfig};

// ============================================================================
// Parameters
// ============================================================================

#[derive(Debug, Clone)]
pub struct LinkParams {
    /// Transmissions of one frame before giving up
    pub n_tries: u32,
    /// Wait for an acknowledgment before retransmitting
    pub timeout: Duration,
    /// How long the Responder waits for the next frame from its peer
    pub idle_timeout: Duration,
    /// Largest payload `write` accepts
    pub max_payload: usize,
}

impl Default for LinkParams {
    fn default() -> Self {
        LinkParams {
            n_tries: 3,
            timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(30),
            max_payload: 1024,
        }
    }
}

/// Result of a successful `read`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Vec<u8>),
    /// Retransmission of a frame already delivered; acknowledged again
    Duplicate,
    EndOfStream,
}

impl ReadOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ReadOutcome::Duplicate)
    }
}

// ============================================================================
// States
// ============================================================================

pub struct Closed;
pub struct Open;

// ============================================================================
// Connection Structure
// ============================================================================

pub struct Connection<State> {
    state: PhantomData<State>,
    role: Role,
    channel: Box<dyn ByteChannel>,
    sender: FrameSender,
    receiver: FrameReceiver,
    params: LinkParams,
    send_parity: Parity,
    expected_parity: Parity,
    disconnected: bool,
}

impl<S> Connection<S> {
    fn transition<T>(self) -> Connection<T> {
        Connection {
            state: PhantomData,
            role: self.role,
            channel: self.channel,
            sender: self.sender,
            receiver: self.receiver,
            params: self.params,
            send_parity: self.send_parity,
            expected_parity: self.expected_parity,
            disconnected: self.disconnected,
        }
    }
}

// ============================================================================
// Closed
// ============================================================================

impl Connection<Closed> {
    pub fn new(role: Role, channel: Box<dyn ByteChannel>, params: LinkParams) -> Self {
        Connection {
            state: PhantomData,
            role,
            channel,
            sender: FrameSender::new(role, params.n_tries, params.timeout),
            receiver: FrameReceiver::new(role, params.max_payload),
            params,
            send_parity: Parity::Zero,
            expected_parity: Parity::Zero,
            disconnected: false,
        }
    }

    /// Opens `config` as a serial port and establishes the link over it.
    pub fn open_port(
        role: Role,
        config: &ChannelConfig,
        params: LinkParams,
    ) -> Result<Connection<Open>, ConnectError> {
        let port = config.open()?;
        info!(port = %config.port, baud = config.baud_rate, "serial port open");
        Connection::new(role, Box::new(port), params).open()
    }

    /// Initiator: SET, then wait for UA. Responder: wait for SET, then UA.
    pub fn open(mut self) -> Result<Connection<Open>, ConnectError> {
        self.send_parity = Parity::Zero;
        self.expected_parity = Parity::Zero;
        self.disconnected = false;

        match self.role {
            Role::Initiator => {
                self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Set)?;
            }
            Role::Responder => {
                self.await_set()?;
                self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Ua)?;
            }
        }

        info!(role = %self.role, "connection open");
        Ok(self.transition())
    }

    fn await_set(&mut self) -> Result<(), LinkError> {
        let deadline = Instant::now() + self.params.idle_timeout;
        loop {
            match self.receiver.receive(self.channel.as_mut(), deadline)? {
                Some(incoming) if incoming.frame == Frame::Set => return Ok(()),
                Some(incoming) => debug!(frame = %incoming.frame, "waiting for SET, ignoring"),
                None => return Err(LinkError::IdleTimeout(self.params.idle_timeout)),
            }
        }
    }
}

// ============================================================================
// Open
// ============================================================================

impl Connection<Open> {
    /// Sends one payload and blocks until the Responder acknowledges it.
    pub fn write(&mut self, payload: &[u8]) -> Result<(), LinkError> {
        self.require(Role::Initiator, "write")?;
        if payload.len() > self.params.max_payload {
            return Err(LinkError::PayloadTooLarge {
                len: payload.len(),
                max: self.params.max_payload,
            });
        }

        self.sender.send_info(
            self.channel.as_mut(),
            &mut self.receiver,
            &mut self.send_parity,
            payload,
        )
    }

    /// Blocks until the Initiator delivers a frame.
    pub fn read(&mut self) -> Result<ReadOutcome, LinkError> {
        self.require(Role::Responder, "read")?;
        if self.disconnected {
            return Ok(ReadOutcome::EndOfStream);
        }

        let deadline = Instant::now() + self.params.idle_timeout;
        loop {
            let Some(incoming) = self.receiver.receive(self.channel.as_mut(), deadline)? else {
                return Err(LinkError::IdleTimeout(self.params.idle_timeout));
            };

            match incoming.frame {
                Frame::Info(parity) => {
                    // Both fresh data and duplicates are answered with the
                    // parity expected after this frame
                    let ack = Frame::Rr(parity.flip());
                    self.sender.send(self.channel.as_mut(), &mut self.receiver, ack)?;

                    if parity == self.expected_parity {
                        self.expected_parity = parity.flip();
                        return Ok(ReadOutcome::Data(incoming.payload));
                    }
                    debug!(frame = %incoming.frame, "duplicate INFO frame");
                    return Ok(ReadOutcome::Duplicate);
                }
                Frame::Set => {
                    // Our UA was lost and the peer is still opening
                    debug!("repeated SET, answering UA again");
                    self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Ua)?;
                }
                Frame::Disc => {
                    self.disconnected = true;
                    if let Err(e) = self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Disc) {
                        warn!(error = %e, "peer did not confirm disconnect");
                    }
                    info!("peer disconnected");
                    return Ok(ReadOutcome::EndOfStream);
                }
                other => debug!(frame = %other, "ignoring frame"),
            }
        }
    }

    /// Tears the link down and releases the channel.
    ///
    /// The Initiator runs the DISC / DISC / UA exchange. A failure here
    /// does not invalidate data that was already acknowledged.
    pub fn close(mut self) -> Result<(), LinkError> {
        match self.role {
            Role::Initiator => {
                self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Disc)?;
                self.sender.send(self.channel.as_mut(), &mut self.receiver, Frame::Ua)?;
            }
            Role::Responder => {
                if !self.disconnected {
                    warn!("closing before the peer disconnected");
                }
            }
        }

        info!(role = %self.role, "connection closed");
        Ok(())
    }

    fn require(&self, role: Role, operation: &'static str) -> Result<(), LinkError> {
        if self.role == role {
            Ok(())
        } else {
            Err(LinkError::WrongRole { operation, role: self.role })
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
