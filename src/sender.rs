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

use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::error::LinkError;
use crate::framer::build_frame;
use crate::header::encode_header;
use crate::protocol::*;
use crate::receiver::FrameReceiver;
use crate::serial::ByteChannel;

/// What to do with a reply to the frame in flight.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Accept,
    Resend,
    Ignore,
}

/// Stop-and-wait transmitter for a single frame at a time.
pub struct FrameSender {
    role: Role,
    n_tries: u32,
    timeout: Duration,
}

impl FrameSender {
    pub fn new(role: Role, n_tries: u32, timeout: Duration) -> Self {
        FrameSender {
            role,
            n_tries: n_tries.max(1),
            timeout,
        }
    }

    /// Sends a control frame. SET and DISC block until acknowledged;
    /// UA, RR and REJ are written once.
    pub fn send(
        &self,
        channel: &mut dyn ByteChannel,
        receiver: &mut FrameReceiver,
        frame: Frame,
    ) -> Result<(), LinkError> {
        self.transmit(channel, receiver, frame, None)
    }

    /// Sends `payload` as INFO(`parity`) and flips `parity` once the peer
    /// acknowledges it.
    pub fn send_info(
        &self,
        channel: &mut dyn ByteChannel,
        receiver: &mut FrameReceiver,
        parity: &mut Parity,
        payload: &[u8],
    ) -> Result<(), LinkError> {
        self.transmit(channel, receiver, Frame::Info(*parity), Some(payload))?;
        *parity = parity.flip();
        Ok(())
    }

    fn transmit(
        &self,
        channel: &mut dyn ByteChannel,
        receiver: &mut FrameReceiver,
        frame: Frame,
        payload: Option<&[u8]>,
    ) -> Result<(), LinkError> {
        let bytes = build_frame(encode_header(self.role, frame)?, payload);

        if frame.is_acknowledgment() {
            channel.write_all(&bytes)?;
            debug!(frame = %frame, "sent acknowledgment");
            return Ok(());
        }

        let mut transmissions = 0;
        let mut timeouts = 0;
        let mut rejects = 0;

        'retransmit: while timeouts < self.n_tries {
            channel.write_all(&bytes)?;
            transmissions += 1;
            debug!(frame = %frame, attempt = timeouts + 1, "sent frame");

            let mut deadline = Instant::now() + self.timeout;
            loop {
                let Some(reply) = receiver.receive(channel, deadline)? else {
                    timeouts += 1;
                    warn!(frame = %frame, attempt = timeouts, "no response within {:?}", self.timeout);
                    continue 'retransmit;
                };

                match self.judge(frame, reply.frame) {
                    Verdict::Accept => {
                        debug!(frame = %frame, reply = %reply.frame, "acknowledged");
                        return Ok(());
                    }
                    Verdict::Resend => {
                        rejects += 1;
                        if rejects > self.n_tries {
                            warn!(frame = %frame, rejects, "peer keeps rejecting");
                            break 'retransmit;
                        }
                        channel.write_all(&bytes)?;
                        transmissions += 1;
                        debug!(frame = %frame, "resent after REJ");
                        deadline = Instant::now() + self.timeout;
                    }
                    Verdict::Ignore => {
                        debug!(frame = %frame, reply = %reply.frame, "ignoring unexpected reply");
                    }
                }
            }
        }

        Err(LinkError::MaxRetriesExceeded { attempts: transmissions })
    }

    fn judge(&self, sent: Frame, reply: Frame) -> Verdict {
        match (sent, reply) {
            (Frame::Set, Frame::Ua) => Verdict::Accept,
            (Frame::Disc, Frame::Disc) if self.role == Role::Initiator => Verdict::Accept,
            (Frame::Disc, Frame::Ua) if self.role == Role::Responder => Verdict::Accept,
            // RR names the parity the peer expects next
            (Frame::Info(sent), Frame::Rr(next)) if next != sent => Verdict::Accept,
            (Frame::Info(sent), Frame::Rej(rejected)) if rejected == sent => Verdict::Resend,
            _ => Verdict::Ignore,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
