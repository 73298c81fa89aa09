//! Wire protocol between the host and the sink mote
//!
//! Every message is one `\n`-terminated ISO-8859-1 line of at most
//! [`MOTE_BUFFER_SIZE`](crate::config::MOTE_BUFFER_SIZE) bytes.
//!
//! - [`framing`] - outbound deploy/cancel frames
//! - [`inbound`] - classification of received lines and `R=` parsing

pub mod framing;
pub mod inbound;

pub use framing::{cancel_frame, decode_bytecode_lines, deploy_frame};
pub use inbound::{classify, parse_neighbour_report, InboundMessage, NeighbourReport};
