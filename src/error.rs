//! Error handling for PredVis-RS
//!
//! This module defines the error taxonomy shared by the link, protocol,
//! topology and predicate layers, and a Result alias for use throughout
//! the crate.
//!
//! Transport faults never cross the reader thread as errors; they are
//! reported through [`crate::backend::LineHandler`] callbacks instead.
//! Everything else is returned synchronously to the caller.

use crate::types::PredicateId;
use thiserror::Error;

/// Which inbound message a [`ProtocolParseError`] came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// `R=` neighbour report
    NeighbourReport,
    /// `PF` predicate feedback
    PredicateFeedback,
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageKind::NeighbourReport => write!(f, "neighbour report"),
            MessageKind::PredicateFeedback => write!(f, "predicate feedback"),
        }
    }
}

/// A malformed inbound line. Recoverable: the line is dropped and the link continues.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed {kind}: {reason}")]
pub struct ProtocolParseError {
    pub kind: MessageKind,
    pub reason: String,
}

impl ProtocolParseError {
    pub fn new(kind: MessageKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
        }
    }
}

/// Main error type for PredVis-RS operations
#[derive(Error, Debug)]
pub enum PredVisError {
    /// The link could not be started or failed while running
    #[error("Transport error: {0}")]
    Transport(String),

    /// An outbound line exceeds the mote receive buffer
    #[error("Message is too long ({length} bytes, limit {limit})")]
    MessageTooLong { length: usize, limit: usize },

    /// Malformed inbound message
    #[error(transparent)]
    Parse(#[from] ProtocolParseError),

    /// A value that violates a data model constraint
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// The predicate script did not compile
    #[error("Compile error: {0}")]
    Compile(String),

    /// The predicate assembly did not assemble
    #[error("Assemble error: {0}")]
    Assemble(String),

    /// An operation was attempted before its inputs exist
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// No predicate is registered under this id
    #[error("Unknown predicate {0}")]
    UnknownPredicate(PredicateId),

    /// An outbound operation was attempted without an open link
    #[error("Not connected")]
    NotConnected,

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PredVisError>,
    },
}

impl PredVisError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        PredVisError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, with any context layers removed
    pub fn root(&self) -> &PredVisError {
        match self {
            PredVisError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Result type alias for PredVis-RS operations
pub type Result<T> = std::result::Result<T, PredVisError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| PredVisError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PredVisError::Io(e).with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PredVisError::Compile("unexpected token at 3:7".to_string());
        assert_eq!(err.to_string(), "Compile error: unexpected token at 3:7");
    }

    #[test]
    fn test_error_with_context() {
        let err = PredVisError::NotConnected;
        let with_ctx = err.with_context("Failed to deploy predicate 4");
        assert!(with_ctx.to_string().contains("Failed to deploy predicate 4"));
        assert!(matches!(with_ctx.root(), PredVisError::NotConnected));
    }

    #[test]
    fn test_message_too_long() {
        let err = PredVisError::MessageTooLong {
            length: 201,
            limit: 127,
        };
        assert!(err.to_string().contains("201"));
        assert!(err.to_string().contains("127"));
    }

    #[test]
    fn test_parse_error_is_transparent() {
        let err: PredVisError =
            ProtocolParseError::new(MessageKind::NeighbourReport, "missing '|'").into();
        assert_eq!(err.to_string(), "Malformed neighbour report: missing '|'");
    }
}
