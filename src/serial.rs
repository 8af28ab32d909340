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

use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use serialport::{SerialPort as SerialPortTrait, DataBits, Parity as LineParity, StopBits};

// ============================================================================
// ByteChannel Trait
// ============================================================================

/// Duplex byte stream the link layer runs over.
pub trait ByteChannel: Send {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()>;

    /// Waits at most `timeout` for one byte. `Ok(None)` means nothing
    /// arrived in time.
    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>>;
}

// ============================================================================
// Serial Line Settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: LineParity,
    pub stop_bits: StopBits,
}

impl ChannelConfig {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        ChannelConfig {
            port: port.into(),
            baud_rate,
            data_bits: DataBits::Eight,
            parity: LineParity::None,
            stop_bits: StopBits::One,
        }
    }

    pub fn open(&self) -> Result<RealSerialPort, serialport::Error> {
        RealSerialPort::open(&self.port, self.baud_rate, self.data_bits, self.parity, self.stop_bits)
    }
}

// ============================================================================
// Real Serial Port Implementation
// ============================================================================

/// Serial port backed by the serialport crate
pub struct RealSerialPort {
    port: Box<dyn SerialPortTrait>,
    timeout: Duration,
}

impl RealSerialPort {
    pub fn open(
        port_name: &str,
        baud_rate: u32,
        data_bits: DataBits,
        parity: LineParity,
        stop_bits: StopBits,
    ) -> Result<Self, serialport::Error> {
        let timeout = Duration::from_millis(100);
        let port = serialport::new(port_name, baud_rate)
            .data_bits(data_bits)
            .parity(parity)
            .stop_bits(stop_bits)
            .timeout(timeout)
            .open()?;

        // Stale bytes from an earlier session would only be resynced away
        port.clear(serialport::ClearBuffer::All)?;

        Ok(RealSerialPort { port, timeout })
    }
}

impl ByteChannel for RealSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.port.write_all(buf)?;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        if timeout != self.timeout {
            self.port.set_timeout(timeout).map_err(std::io::Error::other)?;
            self.timeout = timeout;
        }

        let mut buf = [0u8; 1];
        match self.port.read(&mut buf) {
            Ok(1) => Ok(Some(buf[0])),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// Mock Serial Port for Testing
// ============================================================================

#[cfg(test)]
pub struct MockSerialPort {
    // Bytes to return on reads (None = timeout)
    read_buffer: Vec<Option<u8>>,
    read_pos: usize,
    // Track what was written
    write_log: Vec<u8>,
    // Expected writes for verification
    expected_writes: Vec<u8>,
}

#[cfg(test)]
impl MockSerialPort {
    pub fn new(responses: Vec<Option<u8>>, expected_writes: Vec<u8>) -> Self {
        MockSerialPort {
            read_buffer: responses,
            read_pos: 0,
            write_log: Vec::new(),
            expected_writes,
        }
    }
}

#[cfg(test)]
impl ByteChannel for MockSerialPort {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_log.extend_from_slice(buf);
        Ok(())
    }

    fn read_byte(&mut self, _timeout: Duration) -> std::io::Result<Option<u8>> {
        // Out of responses = timeout
        match self.read_buffer.get(self.read_pos) {
            Some(&response) => {
                self.read_pos += 1;
                Ok(response)
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
impl Drop for MockSerialPort {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }

        assert_eq!(
            self.read_pos,
            self.read_buffer.len(),
            "MockSerialPort dropped with {} unconsumed responses (read {} of {} bytes)",
            self.read_buffer.len() - self.read_pos,
            self.read_pos,
            self.read_buffer.len()
        );

        assert_eq!(
            &self.write_log,
            &self.expected_writes,
            "MockSerialPort write log mismatch!\nExpected {} bytes:\n{:02X?}\nGot {} bytes:\n{:02X?}",
            self.expected_writes.len(),
            self.expected_writes,
            self.write_log.len(),
            self.write_log
        );
    }
}

// ============================================================================
// In-Memory Pipe for Testing
// ============================================================================

/// Rewrites the `n`th write (counting from zero) before it reaches the peer.
#[cfg(test)]
pub type Tamper = Box<dyn FnMut(usize, &mut Vec<u8>) + Send>;

/// One end of a [`pipe`].
#[cfg(test)]
pub struct PipeEnd {
    tx: std::sync::mpsc::Sender<u8>,
    rx: std::sync::mpsc::Receiver<u8>,
    writes: usize,
    tamper: Option<Tamper>,
}

#[cfg(test)]
impl PipeEnd {
    pub fn with_tamper(mut self, tamper: Tamper) -> Self {
        self.tamper = Some(tamper);
        self
    }
}

/// Two connected channel ends, like a null-modem cable.
#[cfg(test)]
pub fn pipe() -> (PipeEnd, PipeEnd) {
    use std::sync::mpsc::channel;

    let (a_tx, b_rx) = channel();
    let (b_tx, a_rx) = channel();
    (
        PipeEnd { tx: a_tx, rx: a_rx, writes: 0, tamper: None },
        PipeEnd { tx: b_tx, rx: b_rx, writes: 0, tamper: None },
    )
}

#[cfg(test)]
impl ByteChannel for PipeEnd {
    fn write_all(&mut self, buf: &[u8]) -> std::io::Result<()> {
        let mut bytes = buf.to_vec();
        if let Some(tamper) = self.tamper.as_mut() {
            tamper(self.writes, &mut bytes);
        }
        self.writes += 1;

        // A hung-up peer behaves like a silent line
        for b in bytes {
            let _ = self.tx.send(b);
        }
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        use std::sync::mpsc::RecvTimeoutError;

        match self.rx.recv_timeout(timeout) {
            Ok(b) => Ok(Some(b)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
