//! Predicate feedback decoding
//!
//! Motes report predicate evaluations as `PF` lines:
//!
//! ```text
//! PF *<from>:<predicate id>:<hops>#<var id>#<length>,...:<k>=<v>,...|<k>=<v>,...:<clock>:<0|1>*
//! ```
//!
//! Each `|`-separated node data block holds the values one reporting node
//! returned, keyed by function id. Values are integers where they parse as
//! such and floating point otherwise.
//!
//! [`FeedbackLog`] keeps every decoded report per predicate and derives the
//! [`PredicateStatus`] shown next to each predicate.

use crate::error::{MessageKind, ProtocolParseError};
use crate::types::{NodeId, PredicateId, VariableDetails};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Prefix identifying a feedback line
pub const FEEDBACK_PREFIX: &str = "PF";

const FEEDBACK_OPEN: &str = "PF *";
const FEEDBACK_CLOSE: char = '*';
const FIELD_COUNT: usize = 6;

/// One value reported by a node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeedbackValue {
    Int(i64),
    Float(f64),
}

impl FeedbackValue {
    /// Integer first, floating point as fallback
    pub fn parse(text: &str) -> Option<Self> {
        if let Ok(v) = text.parse::<i64>() {
            return Some(FeedbackValue::Int(v));
        }
        text.parse::<f64>().ok().map(FeedbackValue::Float)
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            FeedbackValue::Int(v) => v as f64,
            FeedbackValue::Float(v) => v,
        }
    }
}

impl fmt::Display for FeedbackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedbackValue::Int(v) => write!(f, "{}", v),
            FeedbackValue::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Values from one reporting node, keyed by function id
pub type NodeData = BTreeMap<u32, FeedbackValue>;

/// A variable the predicate reads, with the reported data length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableSpec {
    pub details: VariableDetails,
    pub length: u32,
}

/// One decoded `PF` report
#[derive(Debug, Clone, PartialEq)]
pub struct PredicateFeedback {
    pub predicate_id: PredicateId,
    /// Mote that evaluated the predicate
    pub from: NodeId,
    pub clock_time: i64,
    pub result: bool,
    pub variables: Vec<VariableSpec>,
    /// One map per reporting node, in report order
    pub node_data: Vec<NodeData>,
    pub received_at: DateTime<Utc>,
}

impl fmt::Display for PredicateFeedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "For predicate {} on {}:", self.predicate_id, self.from)?;
        writeln!(f, "\tResult {}", self.result)?;
        writeln!(f, "\tTime {}", self.clock_time)?;
        write!(f, "\tGot variable details [")?;
        for (i, spec) in self.variables.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", spec.details, spec.length)?;
        }
        writeln!(f, "]")?;
        write!(f, "\tGot variable data [")?;
        for (i, node) in self.node_data.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{{")?;
            for (j, (key, value)) in node.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}={}", key, value)?;
            }
            write!(f, "}}")?;
        }
        writeln!(f, "]")
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolParseError {
    ProtocolParseError::new(MessageKind::PredicateFeedback, reason)
}

fn parse_int<T: std::str::FromStr>(field: &str, what: &str) -> Result<T, ProtocolParseError> {
    field
        .trim()
        .parse()
        .map_err(|_| malformed(format!("invalid {} '{}'", what, field)))
}

/// Decode one `PF` line
pub fn decode(line: &str) -> Result<PredicateFeedback, ProtocolParseError> {
    let line = line.trim_end();
    let body = line
        .strip_prefix(FEEDBACK_OPEN)
        .ok_or_else(|| malformed("missing 'PF *' header"))?
        .strip_suffix(FEEDBACK_CLOSE)
        .ok_or_else(|| malformed("missing closing '*'"))?;

    let fields: Vec<&str> = body.split(':').collect();
    if fields.len() != FIELD_COUNT {
        return Err(malformed(format!(
            "expected {} ':'-separated fields, got {}",
            FIELD_COUNT,
            fields.len()
        )));
    }

    let from: NodeId = fields[0]
        .parse()
        .map_err(|_| malformed(format!("invalid sender '{}'", fields[0])))?;
    let predicate_id: PredicateId = parse_int(fields[1], "predicate id")?;
    let variables = decode_variable_specs(fields[2])?;
    let node_data = fields[3]
        .split('|')
        .map(decode_node_data)
        .collect::<Result<Vec<_>, _>>()?;
    let clock_time: i64 = parse_int(fields[4], "clock time")?;
    let result = parse_int::<i64>(fields[5], "result")? == 1;

    Ok(PredicateFeedback {
        predicate_id,
        from,
        clock_time,
        result,
        variables,
        node_data,
        received_at: Utc::now(),
    })
}

fn decode_variable_specs(field: &str) -> Result<Vec<VariableSpec>, ProtocolParseError> {
    if field.is_empty() {
        return Ok(Vec::new());
    }

    field
        .split(',')
        .map(|spec| {
            let parts: Vec<&str> = spec.split('#').collect();
            let [hops, id, length] = parts[..] else {
                return Err(malformed(format!("invalid variable spec '{}'", spec)));
            };
            let details = VariableDetails::try_new(
                parse_int(id, "variable id")?,
                parse_int(hops, "variable hops")?,
            )
            .map_err(|e| malformed(e.to_string()))?;
            Ok(VariableSpec {
                details,
                length: parse_int(length, "variable length")?,
            })
        })
        .collect()
}

fn decode_node_data(block: &str) -> Result<NodeData, ProtocolParseError> {
    let mut data = NodeData::new();
    if block.is_empty() {
        return Ok(data);
    }

    for pair in block.split(',') {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| malformed(format!("invalid key/value '{}'", pair)))?;
        let key: u32 = parse_int(key, "function id")?;
        let value = FeedbackValue::parse(value.trim())
            .ok_or_else(|| malformed(format!("invalid value '{}'", value)))?;
        data.insert(key, value);
    }
    Ok(data)
}

// ==================== Status ====================

/// Display state of a predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateStatus {
    /// Not deployed
    Unmonitored,
    /// Deployed, no feedback yet
    Unevaluated,
    /// Latest feedback evaluated true
    Satisfied,
    /// Latest feedback evaluated false
    Unsatisfied,
}

/// Every feedback report received, per predicate, in arrival order
#[derive(Debug, Clone, Default)]
pub struct FeedbackLog {
    entries: HashMap<PredicateId, Vec<PredicateFeedback>>,
}

impl FeedbackLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, feedback: PredicateFeedback) {
        self.entries
            .entry(feedback.predicate_id)
            .or_default()
            .push(feedback);
    }

    pub fn history(&self, id: PredicateId) -> &[PredicateFeedback] {
        self.entries.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn latest(&self, id: PredicateId) -> Option<&PredicateFeedback> {
        self.history(id).last()
    }

    /// Forget a predicate's reports, e.g. when it is removed
    pub fn clear(&mut self, id: PredicateId) {
        self.entries.remove(&id);
    }

    pub fn status(&self, id: PredicateId, monitored: bool) -> PredicateStatus {
        if !monitored {
            return PredicateStatus::Unmonitored;
        }
        match self.latest(id) {
            None => PredicateStatus::Unevaluated,
            Some(f) if f.result => PredicateStatus::Satisfied,
            Some(_) => PredicateStatus::Unsatisfied,
        }
    }
}
