//! Backend module for the serial link to the sink mote
//!
//! This module owns everything between the sink's byte stream and the
//! line-oriented protocol layer. Reading happens on one dedicated thread per
//! link; everything else runs on the caller's thread.
//!
//! # Components
//!
//! - [`LineTransport`] - Framed line I/O with the mote buffer ceiling and a reader thread
//! - [`LineHandler`] - Callbacks invoked on the reader thread
//! - [`Connector`] / [`SerialDumpConnector`] - Opens the byte stream (serialdump child process)
//! - `MockLink` - In-memory connector for tests (`mock-link` feature)
//! - [`ChannelHandler`] - Forwards reader callbacks into a crossbeam channel as [`LinkEvent`]s
//!
//! # Example
//!
//! ```ignore
//! use predvis_rs::backend::{ChannelHandler, LineTransport, SerialDumpConnector};
//! use predvis_rs::config::LinkConfig;
//!
//! let config = LinkConfig::default();
//! let transport = LineTransport::from_config(
//!     Box::new(SerialDumpConnector::from_config(&config)),
//!     &config,
//! );
//! let (handler, events) = ChannelHandler::new(config.event_capacity);
//! transport.connect(std::sync::Arc::new(handler))?;
//!
//! for event in events.iter() {
//!     println!("{:?}", event);
//! }
//! ```

pub mod codec;
pub mod connector;
#[cfg(any(test, feature = "mock-link"))]
pub mod mock_link;
pub mod transport;

pub use connector::{Connector, LinkIo, SerialDumpConnector};
#[cfg(any(test, feature = "mock-link"))]
pub use mock_link::{MockLink, MockPeer};
pub use transport::{LineHandler, LineTransport};

use crate::error::PredVisError;
use crossbeam_channel::{bounded, Receiver, Sender};

/// Raw link activity, as seen by the reader thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// One received line
    Line(String),
    /// End of stream
    Closed,
    /// The link failed
    Lost(String),
}

/// A [`LineHandler`] that queues every callback as a [`LinkEvent`].
///
/// The consumer decides whether to handle events synchronously or later.
/// Sending blocks when the queue is full, so lines are never dropped or
/// reordered. Drain the receiver or drop it; a held but idle receiver
/// stalls the reader.
pub struct ChannelHandler {
    sender: Sender<LinkEvent>,
}

impl ChannelHandler {
    pub fn new(capacity: usize) -> (Self, Receiver<LinkEvent>) {
        let (tx, rx) = bounded(capacity);
        (Self { sender: tx }, rx)
    }
}

impl LineHandler for ChannelHandler {
    fn on_line(&self, line: &str) {
        let _ = self.sender.send(LinkEvent::Line(line.to_string()));
    }

    fn on_closed(&self) {
        let _ = self.sender.send(LinkEvent::Closed);
    }

    fn on_lost(&self, error: PredVisError) {
        let _ = self.sender.send(LinkEvent::Lost(error.to_string()));
    }
}
