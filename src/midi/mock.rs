// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    fmt,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::Mutex;
use tracing::info;

use crate::{
    codec::ShortMessage,
    error::{Error, Result},
};

/// A message recorded by the mock backend.
#[derive(Clone, Debug)]
pub struct Sent {
    /// Identifies the port session the message was sent through.
    pub session: usize,
    /// The bytes as transmitted.
    pub bytes: Vec<u8>,
    /// When the message was sent.
    pub at: Instant,
}

/// A mock backend. Doesn't send anything anywhere, but remembers what it was asked to send.
#[derive(Clone)]
pub struct Backend {
    outputs: Vec<String>,
    inputs: Vec<String>,
    sent: Arc<Mutex<Vec<Sent>>>,
    fail_after: Arc<Mutex<Option<usize>>>,
    sessions: Arc<AtomicUsize>,
    open_ports: Arc<AtomicUsize>,
}

impl Backend {
    /// Creates a mock backend with a couple of fake devices.
    pub fn new() -> Backend {
        Backend {
            outputs: vec!["Mock Synth".to_string(), "Mock Drum Machine".to_string()],
            inputs: vec!["Mock Keyboard".to_string()],
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_after: Arc::new(Mutex::new(None)),
            sessions: Arc::new(AtomicUsize::new(0)),
            open_ports: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().iter().map(|sent| sent.bytes.clone()).collect()
    }

    /// Everything sent so far along with session and timing information.
    pub fn sent_records(&self) -> Vec<Sent> {
        self.sent.lock().clone()
    }

    /// Forgets everything sent so far.
    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    /// Makes every send fail once `count` more messages have gone through.
    pub fn fail_after(&self, count: usize) {
        *self.fail_after.lock() = Some(count);
    }

    /// Number of ports opened over the backend's lifetime.
    pub fn opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Number of ports currently open.
    pub fn open_ports(&self) -> usize {
        self.open_ports.load(Ordering::SeqCst)
    }

    fn record(&self, session: usize, bytes: &[u8]) -> Result<()> {
        {
            let mut fail_after = self.fail_after.lock();
            match fail_after.as_mut() {
                Some(0) => return Err(Error::Transmission("mock device failure".to_string())),
                Some(remaining) => *remaining -= 1,
                None => {}
            }
        }

        self.sent.lock().push(Sent {
            session,
            bytes: bytes.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }
}

impl Default for Backend {
    fn default() -> Self {
        Backend::new()
    }
}

impl super::Backend for Backend {
    fn list_outputs(&self) -> Result<Vec<String>> {
        Ok(self.outputs.clone())
    }

    fn list_inputs(&self) -> Result<Vec<String>> {
        Ok(self.inputs.clone())
    }

    fn open(&self, index: usize) -> Result<Box<dyn super::Port>> {
        let name = self
            .outputs
            .get(index)
            .ok_or_else(|| Error::DeviceOpen {
                index,
                reason: format!("no such output ({} available)", self.outputs.len()),
            })?
            .clone();

        let session = self.sessions.fetch_add(1, Ordering::SeqCst);
        self.open_ports.fetch_add(1, Ordering::SeqCst);
        info!(index, device = name, session, "Opened mock output.");

        Ok(Box::new(Port {
            name,
            session,
            backend: self.clone(),
        }))
    }
}

/// A port on the mock backend.
struct Port {
    name: String,
    session: usize,
    backend: Backend,
}

impl super::Port for Port {
    fn send_short(&mut self, message: &ShortMessage) -> Result<()> {
        self.backend.record(self.session, message.as_bytes())
    }

    fn send_long(&mut self, data: &[u8]) -> Result<()> {
        self.backend.record(self.session, data)
    }
}

impl Drop for Port {
    fn drop(&mut self) {
        self.backend.open_ports.fetch_sub(1, Ordering::SeqCst);
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use crate::{codec, midi::Backend as _};

    use super::*;

    #[test]
    fn test_records_and_closes() {
        let backend = Backend::new();
        {
            let mut port = backend.open(1).unwrap();
            assert_eq!("Mock Drum Machine (Mock)", port.to_string());
            port.send_short(&codec::encode_program_change(0, 3)).unwrap();
            port.send_long(&[0xF0, 0x01, 0xF7]).unwrap();
            assert_eq!(1, backend.open_ports());
        }
        assert_eq!(0, backend.open_ports());
        assert_eq!(1, backend.opened());
        assert_eq!(vec![vec![0xC0, 3], vec![0xF0, 0x01, 0xF7]], backend.sent());
    }

    #[test]
    fn test_bad_index() {
        let backend = Backend::new();
        assert!(matches!(
            backend.open(7),
            Err(Error::DeviceOpen { index: 7, .. })
        ));
    }

    #[test]
    fn test_fail_after() {
        let backend = Backend::new();
        backend.fail_after(1);
        let mut port = backend.open(0).unwrap();
        let message = codec::encode_cc(0, 1, 1);
        assert!(port.send_short(&message).is_ok());
        assert!(matches!(
            port.send_short(&message),
            Err(Error::Transmission(_))
        ));
        assert_eq!(1, backend.sent().len());
    }
}
