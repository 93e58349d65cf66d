//! Local console on the process's stdin/stdout.

use super::{ReadOutcome, Transport};
use std::io::{self, Write};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::{self, error::TryRecvError};

pub struct StdioTransport {
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    open: bool,
}

impl StdioTransport {
    /// Spawn the stdin reader task. Must be called inside a tokio runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut stdin = tokio::io::stdin();
            let mut chunk = [0u8; 256];
            loop {
                match stdin.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => {
                        if tx.send(chunk[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
        StdioTransport { rx, open: true }
    }
}

impl Transport for StdioTransport {
    fn read_available(&mut self, buf: &mut Vec<u8>) -> ReadOutcome {
        if !self.open {
            return ReadOutcome::Closed;
        }
        let mut total = 0;
        loop {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    total += chunk.len();
                    buf.extend_from_slice(&chunk);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if total == 0 {
                        self.open = false;
                        return ReadOutcome::Closed;
                    }
                    break;
                }
            }
        }
        if total == 0 {
            ReadOutcome::Idle
        } else {
            ReadOutcome::Data(total)
        }
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut out = io::stdout().lock();
        out.write_all(bytes)?;
        out.flush()
    }

    fn close(&mut self) {
        self.open = false;
        self.rx.close();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn peer(&self) -> String {
        "stdio".to_string()
    }
}
