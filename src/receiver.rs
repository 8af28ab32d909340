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

use std::time::Instant;
use tracing::{debug, warn};
use crate::error::LinkError;
use crate::framer::{build_frame, checksum, destuff, max_stuffed_len};
use crate::header::{decode_header, encode_header};
use crate::protocol::*;
use crate::serial::ByteChannel;

// ============================================================================
// Output
// ============================================================================

/// A validated frame. `payload` is empty for everything but INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Incoming {
    pub frame: Frame,
    pub payload: Vec<u8>,
}

// ============================================================================
// States
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxState {
    AwaitFlag,
    BuildingHeader,
    WaitLastFlag(Frame),
    FillingInfo(Parity),
}

#[derive(Debug, PartialEq, Eq)]
enum Step {
    Pending,
    Complete(Incoming),
    /// INFO header was valid but the body was not
    Damaged(Parity),
}

// ============================================================================
// Receiver
// ============================================================================

pub struct FrameReceiver {
    role: Role,
    state: RxState,
    header: [u8; 3],
    header_len: usize,
    body: Vec<u8>,
    max_body: usize,
}

impl FrameReceiver {
    pub fn new(role: Role, max_payload: usize) -> Self {
        let max_body = max_stuffed_len(max_payload);
        FrameReceiver {
            role,
            state: RxState::AwaitFlag,
            header: [0; 3],
            header_len: 0,
            body: Vec::with_capacity(max_body),
            max_body,
        }
    }

    /// Reads from `channel` until a valid frame arrives or `deadline` passes.
    ///
    /// Damaged INFO bodies are answered with REJ here and never reach the
    /// caller. `Ok(None)` means the deadline passed, and the partial frame,
    /// if any, is dropped.
    pub fn receive(
        &mut self,
        channel: &mut dyn ByteChannel,
        deadline: Instant,
    ) -> Result<Option<Incoming>, LinkError> {
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                self.restart();
                return Ok(None);
            }

            let Some(byte) = channel.read_byte(remaining)? else {
                self.restart();
                return Ok(None);
            };

            match self.push(byte) {
                Step::Pending => {}
                Step::Complete(incoming) => {
                    debug!(frame = %incoming.frame, len = incoming.payload.len(), "received frame");
                    return Ok(Some(incoming));
                }
                Step::Damaged(parity) => {
                    let reject = Frame::Rej(parity);
                    channel.write_all(&build_frame(encode_header(self.role, reject)?, None))?;
                    warn!(frame = %reject, "damaged INFO frame, requested retransmission");
                }
            }
        }
    }

    fn restart(&mut self) {
        self.state = RxState::AwaitFlag;
        self.header_len = 0;
        self.body.clear();
    }

    fn push(&mut self, byte: u8) -> Step {
        match self.state {
            RxState::AwaitFlag => {
                if byte == FLAG {
                    self.header_len = 0;
                    self.state = RxState::BuildingHeader;
                }
            }
            RxState::BuildingHeader => {
                // Repeated FLAG: the previous one was a false start
                if byte == FLAG {
                    self.header_len = 0;
                    return Step::Pending;
                }

                self.header[self.header_len] = byte;
                self.header_len += 1;
                if self.header_len == self.header.len() {
                    match decode_header(&self.header, self.role) {
                        Ok(Frame::Info(parity)) => {
                            self.body.clear();
                            self.state = RxState::FillingInfo(parity);
                        }
                        Ok(frame) => self.state = RxState::WaitLastFlag(frame),
                        Err(e) => {
                            debug!(error = %e, "discarding header");
                            self.restart();
                        }
                    }
                }
            }
            RxState::WaitLastFlag(frame) => {
                self.restart();
                if byte == FLAG {
                    return Step::Complete(Incoming { frame, payload: Vec::new() });
                }
                debug!(frame = %frame, byte, "missing closing flag");
            }
            RxState::FillingInfo(parity) => {
                if byte == FLAG {
                    let step = self.finish_info(parity);
                    self.restart();
                    return step;
                }

                if self.body.len() == self.max_body {
                    warn!(limit = self.max_body, "INFO body overrun, resyncing");
                    self.restart();
                } else {
                    self.body.push(byte);
                }
            }
        }
        Step::Pending
    }

    fn finish_info(&self, parity: Parity) -> Step {
        let body = match destuff(&self.body) {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "bad stuffing in INFO body");
                return Step::Damaged(parity);
            }
        };

        let Some((&bcc2, payload)) = body.split_last() else {
            warn!("INFO frame without BCC2");
            return Step::Damaged(parity);
        };

        let expected = checksum(payload);
        if bcc2 != expected {
            warn!(expected, found = bcc2, "BCC2 mismatch");
            return Step::Damaged(parity);
        }

        Step::Complete(Incoming { frame: Frame::Info(parity), payload: payload.to_vec() })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::serial::MockSerialPort;

    fn wire(role: Role, frame: Frame, payload: Option<&[u8]>) -> Vec<u8> {
        build_frame(encode_header(role, frame).unwrap(), payload)
    }

    fn script(bytes: &[u8]) -> Vec<Option<u8>> {
        bytes.iter().copied().map(Some).collect()
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn feed(receiver: &mut FrameReceiver, bytes: &[u8]) -> Vec<Step> {
        bytes
            .iter()
            .map(|&b| receiver.push(b))
            .filter(|step| *step != Step::Pending)
            .collect()
    }

    #[test]
    fn test_receive_control_frame_after_noise() {
        let mut responses = script(&[0x00, 0x41, 0x7D]);
        responses.extend(script(&wire(Role::Initiator, Frame::Set, None)));

        let mut port = MockSerialPort::new(responses, vec![]);
        let mut receiver = FrameReceiver::new(Role::Responder, 64);

        let incoming = receiver.receive(&mut port, deadline()).unwrap();
        assert_eq!(incoming, Some(Incoming { frame: Frame::Set, payload: vec![] }));
    }

    #[test]
    fn test_false_start_resets_header() {
        let mut receiver = FrameReceiver::new(Role::Responder, 64);
        let steps = feed(&mut receiver, &[FLAG, 0x03, FLAG, 0x03, 0x0B, 0x08, FLAG]);
        assert_eq!(steps, vec![Step::Complete(Incoming { frame: Frame::Disc, payload: vec![] })]);
    }

    #[test]
    fn test_bad_bcc1_is_dropped() {
        let mut receiver = FrameReceiver::new(Role::Initiator, 64);
        let mut bytes = vec![FLAG, 0x01, 0x07, 0x07, FLAG];
        bytes.extend(wire(Role::Responder, Frame::Ua, None));

        let steps = feed(&mut receiver, &bytes);
        assert_eq!(steps, vec![Step::Complete(Incoming { frame: Frame::Ua, payload: vec![] })]);
    }

    #[test]
    fn test_missing_closing_flag_is_dropped() {
        let mut receiver = FrameReceiver::new(Role::Initiator, 64);
        let mut bytes = vec![FLAG, 0x01, 0x85, 0x84, 0x00];
        bytes.extend(wire(Role::Responder, Frame::Rr(Parity::Zero), None));

        let steps = feed(&mut receiver, &bytes);
        assert_eq!(
            steps,
            vec![Step::Complete(Incoming { frame: Frame::Rr(Parity::Zero), payload: vec![] })]
        );
    }

    #[test]
    fn test_own_frames_are_ignored() {
        let mut receiver = FrameReceiver::new(Role::Initiator, 64);
        let steps = feed(&mut receiver, &wire(Role::Initiator, Frame::Set, None));
        assert!(steps.is_empty());
    }

    #[test]
    fn test_receive_info_with_stuffed_payload() {
        let payload = [0x7E, 0x01, 0x7D, 0x02];
        let bytes = wire(Role::Initiator, Frame::Info(Parity::One), Some(&payload));

        let mut port = MockSerialPort::new(script(&bytes), vec![]);
        let mut receiver = FrameReceiver::new(Role::Responder, 64);

        let incoming = receiver.receive(&mut port, deadline()).unwrap().unwrap();
        assert_eq!(incoming.frame, Frame::Info(Parity::One));
        assert_eq!(incoming.payload, payload.to_vec());
    }

    #[test]
    fn test_damaged_info_is_rejected() {
        let good = wire(Role::Initiator, Frame::Info(Parity::Zero), Some(&[0x41, 0x42]));
        let mut bad = good.clone();
        bad[4] ^= 0x01;

        let mut responses = script(&bad);
        responses.extend(script(&good));

        let expected_writes = wire(Role::Responder, Frame::Rej(Parity::Zero), None);
        let mut port = MockSerialPort::new(responses, expected_writes);
        let mut receiver = FrameReceiver::new(Role::Responder, 64);

        let incoming = receiver.receive(&mut port, deadline()).unwrap().unwrap();
        assert_eq!(incoming.payload, vec![0x41, 0x42]);
    }

    #[test]
    fn test_bad_stuffing_and_empty_body_are_rejected() {
        let mut receiver = FrameReceiver::new(Role::Responder, 64);

        let steps = feed(&mut receiver, &[FLAG, 0x03, 0x40, 0x43, 0x7D, 0x11, FLAG]);
        assert_eq!(steps, vec![Step::Damaged(Parity::One)]);

        let steps = feed(&mut receiver, &[FLAG, 0x03, 0x00, 0x03, FLAG]);
        assert_eq!(steps, vec![Step::Damaged(Parity::Zero)]);
    }

    #[test]
    fn test_empty_payload_is_valid() {
        let mut receiver = FrameReceiver::new(Role::Responder, 64);
        let steps = feed(&mut receiver, &wire(Role::Initiator, Frame::Info(Parity::Zero), Some(&[])));
        assert_eq!(
            steps,
            vec![Step::Complete(Incoming { frame: Frame::Info(Parity::Zero), payload: vec![] })]
        );
    }

    #[test]
    fn test_overrun_resyncs() {
        let mut receiver = FrameReceiver::new(Role::Responder, 4);
        let mut bytes = wire(Role::Initiator, Frame::Info(Parity::Zero), Some(&[0x55; 16]));
        bytes.extend(wire(Role::Initiator, Frame::Info(Parity::One), Some(&[0x55; 4])));

        let steps = feed(&mut receiver, &bytes);
        assert_eq!(
            steps,
            vec![Step::Complete(Incoming { frame: Frame::Info(Parity::One), payload: vec![0x55; 4] })]
        );
    }

    #[test]
    fn test_timeout_drops_partial_frame() {
        let mut responses = vec![Some(FLAG), Some(0x03), None];
        responses.extend(script(&wire(Role::Initiator, Frame::Set, None)));

        let mut port = MockSerialPort::new(responses, vec![]);
        let mut receiver = FrameReceiver::new(Role::Responder, 64);

        assert_eq!(receiver.receive(&mut port, deadline()).unwrap(), None);
        assert_eq!(receiver.state, RxState::AwaitFlag);

        let incoming = receiver.receive(&mut port, deadline()).unwrap().unwrap();
        assert_eq!(incoming.frame, Frame::Set);
    }

    #[test]
    fn test_expired_deadline_reads_nothing() {
        let mut port = MockSerialPort::new(vec![], vec![]);
        let mut receiver = FrameReceiver::new(Role::Responder, 64);
        assert_eq!(receiver.receive(&mut port, Instant::now()).unwrap(), None);
    }
}
