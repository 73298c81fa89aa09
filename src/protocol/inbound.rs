//! Inbound line classification and neighbour report parsing
//!
//! Lines from the sink are routed by prefix:
//!
//! - `R=` - neighbour report for one round: `R=<round>|<a>,<b>~<a>,<b>~...`
//! - `PF` - predicate feedback, decoded by [`crate::feedback::decode`]
//! - anything else is debug output from the motes and is ignored

use crate::error::{MessageKind, ProtocolParseError};
use crate::feedback::{self, PredicateFeedback, FEEDBACK_PREFIX};
use crate::types::{NodeId, NodeIdPair};

/// Prefix identifying a neighbour report
pub const NEIGHBOUR_PREFIX: &str = "R=";

/// Neighbour links observed during one round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighbourReport {
    pub round: u32,
    pub pairs: Vec<NodeIdPair>,
}

/// A classified inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    Neighbours(NeighbourReport),
    Feedback(PredicateFeedback),
    /// Unrecognized prefix
    Ignored,
}

/// Classify and parse one line
pub fn classify(line: &str) -> Result<InboundMessage, ProtocolParseError> {
    if line.starts_with(NEIGHBOUR_PREFIX) {
        parse_neighbour_report(line).map(InboundMessage::Neighbours)
    } else if line.starts_with(FEEDBACK_PREFIX) {
        feedback::decode(line).map(InboundMessage::Feedback)
    } else {
        Ok(InboundMessage::Ignored)
    }
}

fn malformed(reason: impl Into<String>) -> ProtocolParseError {
    ProtocolParseError::new(MessageKind::NeighbourReport, reason)
}

fn parse_node(text: &str) -> Result<NodeId, ProtocolParseError> {
    text.trim()
        .parse()
        .map_err(|_| malformed(format!("invalid node id '{}'", text)))
}

/// Parse an `R=` line
pub fn parse_neighbour_report(line: &str) -> Result<NeighbourReport, ProtocolParseError> {
    let body = line
        .trim_end()
        .strip_prefix(NEIGHBOUR_PREFIX)
        .ok_or_else(|| malformed("missing 'R=' prefix"))?;

    let (round, pairs) = body
        .split_once('|')
        .ok_or_else(|| malformed("missing '|' after round number"))?;
    if pairs.contains('|') {
        return Err(malformed("more than one '|'"));
    }

    let round: u32 = round
        .trim()
        .parse()
        .map_err(|_| malformed(format!("invalid round '{}'", round)))?;

    // The sink terminates some reports with a trailing '~'
    let pairs = pairs.strip_suffix('~').unwrap_or(pairs);
    if pairs.is_empty() {
        return Err(malformed("empty neighbour list"));
    }

    let pairs = pairs
        .split('~')
        .map(|pair| {
            let (left, right) = pair
                .split_once(',')
                .ok_or_else(|| malformed(format!("invalid pair '{}'", pair)))?;
            if right.contains(',') {
                return Err(malformed(format!("invalid pair '{}'", pair)));
            }
            Ok(NodeIdPair::new(parse_node(left)?, parse_node(right)?))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NeighbourReport { round, pairs })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(s: &str) -> NodeId {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_two_pairs() {
        let report = parse_neighbour_report("R=3|1.2,1.3~1.3,4.5").unwrap();
        assert_eq!(report.round, 3);
        assert_eq!(
            report.pairs,
            vec![
                NodeIdPair::new(node("1.2"), node("1.3")),
                NodeIdPair::new(node("1.3"), node("4.5")),
            ]
        );
    }

    #[test]
    fn test_parse_single_pair_and_trailing_separator() {
        let report = parse_neighbour_report("R=0|7,8~").unwrap();
        assert_eq!(report.round, 0);
        assert_eq!(report.pairs.len(), 1);
    }

    #[test]
    fn test_parse_rejects_malformed() {
        let bad = [
            "R=3",
            "R=3 1.2,1.3",
            "R=x|1.2,1.3",
            "R=-1|1.2,1.3",
            "R=3|",
            "R=3|1.2",
            "R=3|1.2,1.3,1.4",
            "R=3|1..2,1.3",
            "R=3|1.2,",
            "R=3|1.2,1.3~~4,5",
            "R=3|1,2|3,4",
        ];
        for line in bad {
            let err = parse_neighbour_report(line).unwrap_err();
            assert_eq!(err.kind, MessageKind::NeighbourReport, "{}", line);
        }
    }

    #[test]
    fn test_classify_routes_by_prefix() {
        assert!(matches!(
            classify("R=1|1,2"),
            Ok(InboundMessage::Neighbours(_))
        ));
        assert!(matches!(
            classify("PF *1:0::0=1:1:1*"),
            Ok(InboundMessage::Feedback(_))
        ));
        assert_eq!(classify("Rime started with address 1.0"), Ok(InboundMessage::Ignored));
        assert_eq!(classify(""), Ok(InboundMessage::Ignored));
        assert!(classify("R=oops").is_err());
        assert!(classify("PF garbage").is_err());
    }
}
