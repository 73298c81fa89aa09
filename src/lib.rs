//! # PredVis-RS: Wireless Sensor Network Predicate Monitor
//!
//! Host-side core for deploying predicates onto motes of a wireless sensor
//! network and watching what comes back. The host talks to a sink mote over
//! a serial link bridged by `serialdump`; everything on the wire is one
//! ISO-8859-1 line of at most 127 bytes.
//!
//! ## Architecture
//!
//! - **Backend**: Line transport over the serialdump child process, with one reader thread per link
//! - **Protocol**: Outbound deploy/cancel framing and inbound `R=`/`PF` classification
//! - **Topology**: Per-round neighbour graphs built from `R=` reports
//! - **Predicate**: Script to bytecode pipeline and the predicate registry
//! - **Monitor**: Ties the above together and publishes events on a crossbeam channel
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `predvis-rs`:
//!
//! - **Linux**: `~/.config/predvis-rs/config.toml`
//! - **macOS**: `~/Library/Application Support/predvis-rs/config.toml`
//! - **Windows**: `%APPDATA%\predvis-rs\config.toml`
//!
//! ## Example
//!
//! ```ignore
//! use predvis_rs::{
//!     backend::SerialDumpConnector,
//!     config::AppConfig,
//!     monitor::{WsnEvent, WsnMonitor},
//!     predicate::pipeline_from_config,
//! };
//!
//! let config = AppConfig::load_or_default();
//! let monitor = WsnMonitor::from_config(
//!     &config,
//!     Box::new(SerialDumpConnector::from_config(&config.link)),
//!     pipeline_from_config(&config.compiler)?,
//! );
//! monitor.connect()?;
//!
//! for event in monitor.events().iter() {
//!     if let WsnEvent::TopologyUpdated(history) = event {
//!         println!("{} rounds", history.len());
//!     }
//! }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod feedback;
pub mod monitor;
pub mod predicate;
pub mod protocol;
pub mod topology;
pub mod types;

// Re-export commonly used types
pub use backend::{LineHandler, LineTransport};
pub use config::AppConfig;
pub use error::{PredVisError, Result};
pub use feedback::{PredicateFeedback, PredicateStatus};
pub use monitor::{ProtocolDispatcher, WsnEvent, WsnMonitor};
pub use predicate::{PredicateRegistry, ScriptCompiler};
pub use topology::{TopologyHistory, TopologyTracker};
pub use types::{NodeId, NodeIdPair, PredicateId, VariableDetails};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking thread poisoned it
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
