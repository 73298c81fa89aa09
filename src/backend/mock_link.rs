//! In-memory link for testing without a sink mote
//!
//! [`MockLink`] is a [`Connector`] whose stream is fed by a [`MockPeer`]:
//! the peer injects inbound lines, end-of-stream and read faults, and
//! records every byte the transport writes.
//!
//! # Example
//!
//! ```ignore
//! use predvis_rs::backend::mock_link::MockLink;
//!
//! let (connector, peer) = MockLink::new();
//! transport_with(connector).connect(handler)?;
//!
//! peer.push_line("R=3|1.2,1.3");
//! peer.hang_up();
//! assert_eq!(peer.written_lines(), vec!["[", "0", "1.2", "b00", "]"]);
//! ```

use super::codec::{decode_latin1, encode_latin1};
use super::connector::{Connector, LinkIo};
use crate::error::{PredVisError, Result};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Something the peer hands to the reading side
enum Inbound {
    Bytes(Vec<u8>),
    Fault(io::ErrorKind),
}

/// State shared between the peer and the stream halves
#[derive(Default)]
struct Shared {
    written: Mutex<Vec<u8>>,
    write_calls: AtomicUsize,
    fail_writes: AtomicBool,
    open_count: AtomicUsize,
}

/// Connector side of an in-memory link
pub struct MockLink {
    inbound: Mutex<Option<Receiver<Inbound>>>,
    shared: Arc<Shared>,
    refuse: bool,
}

/// Test side of an in-memory link
pub struct MockPeer {
    sender: Mutex<Option<Sender<Inbound>>>,
    shared: Arc<Shared>,
}

impl MockLink {
    /// Create a connected connector/peer pair
    pub fn new() -> (Self, MockPeer) {
        let (tx, rx) = unbounded();
        let shared = Arc::new(Shared::default());
        (
            Self {
                inbound: Mutex::new(Some(rx)),
                shared: shared.clone(),
                refuse: false,
            },
            MockPeer {
                sender: Mutex::new(Some(tx)),
                shared,
            },
        )
    }

    /// A connector that fails to open, like a missing serialdump binary
    pub fn refusing() -> (Self, MockPeer) {
        let (mut link, peer) = Self::new();
        link.refuse = true;
        (link, peer)
    }
}

impl Connector for MockLink {
    fn open(&self) -> Result<LinkIo> {
        if self.refuse {
            return Err(PredVisError::Transport("mock link refused to open".to_string()));
        }

        let receiver = crate::lock(&self.inbound)
            .take()
            .ok_or_else(|| PredVisError::Transport("mock link already opened".to_string()))?;
        self.shared.open_count.fetch_add(1, Ordering::SeqCst);

        Ok(LinkIo {
            reader: Box::new(MockReader {
                receiver,
                pending: Vec::new(),
                offset: 0,
            }),
            writer: Box::new(MockWriter {
                shared: self.shared.clone(),
            }),
            child: None,
        })
    }

    fn describe(&self) -> String {
        "mock link".to_string()
    }
}

impl MockPeer {
    fn push(&self, item: Inbound) {
        if let Some(sender) = crate::lock(&self.sender).as_ref() {
            let _ = sender.send(item);
        }
    }

    /// Deliver raw bytes to the reader
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.push(Inbound::Bytes(bytes.to_vec()));
    }

    /// Deliver one `\n`-terminated line to the reader
    pub fn push_line(&self, line: &str) {
        let mut bytes = encode_latin1(line);
        bytes.push(b'\n');
        self.push(Inbound::Bytes(bytes));
    }

    /// Make the next read fail
    pub fn inject_fault(&self, kind: io::ErrorKind) {
        self.push(Inbound::Fault(kind));
    }

    /// End the stream; the reader sees EOF once queued data is consumed
    pub fn hang_up(&self) {
        crate::lock(&self.sender).take();
    }

    /// Make every subsequent write fail with `BrokenPipe`
    pub fn fail_writes(&self, fail: bool) {
        self.shared.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Everything written so far
    pub fn written_bytes(&self) -> Vec<u8> {
        crate::lock(&self.shared.written).clone()
    }

    /// Written bytes split into lines, without terminators
    pub fn written_lines(&self) -> Vec<String> {
        let bytes = self.written_bytes();
        bytes
            .split(|&b| b == b'\n')
            .filter(|l| !l.is_empty())
            .map(decode_latin1)
            .collect()
    }

    /// Number of write calls that reached the stream
    pub fn write_calls(&self) -> usize {
        self.shared.write_calls.load(Ordering::SeqCst)
    }

    /// How many times the connector was opened
    pub fn open_count(&self) -> usize {
        self.shared.open_count.load(Ordering::SeqCst)
    }
}

struct MockReader {
    receiver: Receiver<Inbound>,
    pending: Vec<u8>,
    offset: usize,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.pending.len() {
            match self.receiver.recv() {
                Ok(Inbound::Bytes(bytes)) => {
                    self.pending = bytes;
                    self.offset = 0;
                }
                Ok(Inbound::Fault(kind)) => {
                    return Err(io::Error::new(kind, "injected mock link fault"));
                }
                Err(_) => return Ok(0),
            }
        }

        let available = &self.pending[self.offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.offset += n;
        Ok(n)
    }
}

struct MockWriter {
    shared: Arc<Shared>,
}

impl Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.shared.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock link closed"));
        }
        self.shared.write_calls.fetch_add(1, Ordering::SeqCst);
        crate::lock(&self.shared.written).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
