//! Core data types for PredVis-RS
//!
//! This module contains the value types shared by the wire protocol, the
//! topology tracker and the predicate pipeline.
//!
//! # Main Types
//!
//! - [`NodeId`] - Hierarchical mote address (`3.12`), the graph vertex key
//! - [`NodeIdPair`] - One reported neighbour link
//! - [`VariableDetails`] - Remote variable reference (slot id + hop distance)
//! - [`PredicateId`] - Registry-assigned predicate identifier

use crate::error::{PredVisError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Separator between hop labels in the canonical form
pub const LABEL_SEPARATOR: char = '.';

/// Identifier handed out by the predicate registry. Never reused within a process.
pub type PredicateId = u32;

/// Hierarchical mote address.
///
/// An ordered, non-empty list of hop labels. The canonical string joins the
/// labels with `.`, and ordering is the lexicographic order of that string.
/// Labels may not be empty and may not contain `.`, so the canonical string
/// identifies the label list exactly.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeId {
    labels: Vec<String>,
    canonical: String,
}

impl NodeId {
    /// Create a node id from its hop labels
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(PredVisError::InvalidFormat(
                "node id needs at least one label".to_string(),
            ));
        }
        if let Some(bad) = labels
            .iter()
            .find(|l| l.is_empty() || l.contains(LABEL_SEPARATOR))
        {
            return Err(PredVisError::InvalidFormat(format!(
                "invalid node label '{}'",
                bad
            )));
        }

        let canonical = labels.join(".");
        Ok(Self { labels, canonical })
    }

    /// Hop labels, outermost first
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Canonical `.`-joined form
    pub fn as_str(&self) -> &str {
        &self.canonical
    }

    /// Number of hop labels
    pub fn depth(&self) -> usize {
        self.labels.len()
    }
}

impl FromStr for NodeId {
    type Err = PredVisError;

    fn from_str(s: &str) -> Result<Self> {
        NodeId::new(s.split(LABEL_SEPARATOR))
    }
}

impl TryFrom<String> for NodeId {
    type Error = PredVisError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<NodeId> for String {
    fn from(id: NodeId) -> Self {
        id.canonical
    }
}

impl PartialEq for NodeId {
    fn eq(&self, other: &Self) -> bool {
        self.labels == other.labels
    }
}

impl Eq for NodeId {}

impl Hash for NodeId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.labels.hash(state);
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.canonical)
    }
}

/// One neighbour link as reported by the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeIdPair {
    pub left: NodeId,
    pub right: NodeId,
}

impl NodeIdPair {
    pub fn new(left: NodeId, right: NodeId) -> Self {
        Self { left, right }
    }
}

impl fmt::Display for NodeIdPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.left, self.right)
    }
}

/// Remote variable reference: slot `id` on the mote `hops` away.
///
/// Both fields are bytes on the wire, so the 0-255 range is enforced by the type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableDetails {
    pub id: u8,
    pub hops: u8,
}

impl VariableDetails {
    pub fn new(id: u8, hops: u8) -> Self {
        Self { id, hops }
    }

    /// Build from wider integers, rejecting anything outside 0-255
    pub fn try_new(id: i64, hops: i64) -> Result<Self> {
        let id = u8::try_from(id).map_err(|_| {
            PredVisError::InvalidFormat(format!("ID must be in the range of 0-255, got {}", id))
        })?;
        let hops = u8::try_from(hops).map_err(|_| {
            PredVisError::InvalidFormat(format!(
                "Hops must be in the range of 0-255, got {}",
                hops
            ))
        })?;
        Ok(Self { id, hops })
    }
}

impl fmt::Display for VariableDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(id={}, hops={})", self.id, self.hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_node_id_canonical_form() {
        let id = NodeId::new(["3", "12"]).unwrap();
        assert_eq!(id.as_str(), "3.12");
        assert_eq!(id.to_string(), "3.12");
        assert_eq!(id.depth(), 2);
        assert_eq!(id.labels(), ["3".to_string(), "12".to_string()]);
    }

    #[test]
    fn test_node_id_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            NodeId::new(empty),
            Err(PredVisError::InvalidFormat(_))
        ));
        assert!(NodeId::new(["1", ""]).is_err());
        assert!("1..2".parse::<NodeId>().is_err());
        assert!("".parse::<NodeId>().is_err());
        assert!(NodeId::new(["1.2"]).is_err());
    }

    #[test]
    fn test_node_id_ordering_is_lexicographic() {
        let a: NodeId = "10.1".parse().unwrap();
        let b: NodeId = "2".parse().unwrap();
        let c: NodeId = "10".parse().unwrap();
        // String order, not numeric order
        assert!(a < b);
        assert!(c < a);
    }

    #[test]
    fn test_node_id_value_semantics() {
        let a: NodeId = "1.2".parse().unwrap();
        let b = NodeId::new(vec!["1".to_string(), "2".to_string()]).unwrap();
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_node_id_serde_as_string() {
        let id: NodeId = "4.5".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"4.5\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<NodeId>("\"\"").is_err());
    }

    #[test]
    fn test_variable_details_range() {
        assert_eq!(
            VariableDetails::try_new(255, 0).unwrap(),
            VariableDetails::new(255, 0)
        );
        assert!(VariableDetails::try_new(256, 0).is_err());
        assert!(VariableDetails::try_new(1, -1).is_err());
        assert_eq!(VariableDetails::new(1, 2).to_string(), "(id=1, hops=2)");
    }
}
