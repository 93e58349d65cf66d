//! Local console on a real serial port.

use super::{ReadOutcome, Transport};
use anyhow::{anyhow, Result};
use log::warn;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;

pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> Result<Self> {
        let port = serialport::new(path, baud)
            .timeout(Duration::from_millis(10))
            .open()
            .map_err(|e| anyhow!("Failed to open serial port {}: {}", path, e))?;
        Ok(SerialTransport {
            port: Some(port),
            name: path.to_string(),
        })
    }
}

impl Transport for SerialTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> ReadOutcome {
        let Some(port) = self.port.as_mut() else {
            return ReadOutcome::Closed;
        };
        let available = match port.bytes_to_read() {
            Ok(0) => return ReadOutcome::Idle,
            Ok(n) => n as usize,
            Err(e) => {
                warn!("serial port {} failed: {}", self.name, e);
                self.port = None;
                return ReadOutcome::Closed;
            }
        };
        let start = buf.len();
        buf.resize(start + available, 0);
        match port.read(&mut buf[start..]) {
            Ok(n) => {
                buf.truncate(start + n);
                if n == 0 {
                    ReadOutcome::Idle
                } else {
                    ReadOutcome::Data(n)
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                buf.truncate(start);
                ReadOutcome::Idle
            }
            Err(e) => {
                buf.truncate(start);
                warn!("serial read from {} failed: {}", self.name, e);
                self.port = None;
                ReadOutcome::Closed
            }
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self
            .port
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn close(&mut self) {
        self.port = None;
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn peer(&self) -> String {
        self.name.clone()
    }
}
