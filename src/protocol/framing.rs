//! Outbound predicate frames
//!
//! A deploy frame is a sequence of lines, each of which must fit the mote's
//! receive buffer:
//!
//! ```text
//! [
//! <id>
//! <target>
//! b<hex pairs>      one or more chunk lines, split to fit the buffer
//! v<hops>.<id>      one per remote variable
//! ]
//! ```
//!
//! A cancel frame is the same envelope without payload.

use crate::error::{PredVisError, Result};
use crate::types::{NodeId, PredicateId, VariableDetails};
use std::fmt::Write;

pub const FRAME_OPEN: &str = "[";
pub const FRAME_CLOSE: &str = "]";
pub const BYTECODE_PREFIX: char = 'b';
pub const VARIABLE_PREFIX: char = 'v';

/// Bytecode bytes that fit in one chunk line: `b`, two hex digits per byte, `\n`
pub fn chunk_capacity(buffer_size: usize) -> usize {
    (buffer_size.saturating_sub(2) / 2).max(1)
}

/// Split bytecode into `b`-prefixed lowercase hex lines
pub fn bytecode_lines(bytecode: &[u8], buffer_size: usize) -> Vec<String> {
    bytecode
        .chunks(chunk_capacity(buffer_size))
        .map(|chunk| {
            let mut line = String::with_capacity(1 + chunk.len() * 2);
            line.push(BYTECODE_PREFIX);
            for byte in chunk {
                let _ = write!(line, "{:02x}", byte);
            }
            line
        })
        .collect()
}

/// The `v<hops>.<id>` line for one variable reference
pub fn variable_line(variable: &VariableDetails) -> String {
    format!("{}{}.{}", VARIABLE_PREFIX, variable.hops, variable.id)
}

/// Lines that deploy a predicate
pub fn deploy_frame(
    id: PredicateId,
    target: &NodeId,
    bytecode: &[u8],
    variables: &[VariableDetails],
    buffer_size: usize,
) -> Vec<String> {
    let mut lines = vec![
        FRAME_OPEN.to_string(),
        id.to_string(),
        target.to_string(),
    ];
    lines.extend(bytecode_lines(bytecode, buffer_size));
    lines.extend(variables.iter().map(variable_line));
    lines.push(FRAME_CLOSE.to_string());
    lines
}

/// Lines that cancel a deployed predicate
pub fn cancel_frame(id: PredicateId, target: &NodeId) -> Vec<String> {
    vec![
        FRAME_OPEN.to_string(),
        id.to_string(),
        target.to_string(),
        FRAME_CLOSE.to_string(),
    ]
}

/// Rebuild bytecode from the `b` lines of a frame, ignoring every other line
pub fn decode_bytecode_lines<'a, I>(lines: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut bytecode = Vec::new();
    for line in lines {
        let Some(hex) = line.strip_prefix(BYTECODE_PREFIX) else {
            continue;
        };
        if hex.len() % 2 != 0 {
            return Err(PredVisError::InvalidFormat(format!(
                "odd number of hex digits in '{}'",
                line
            )));
        }
        for i in (0..hex.len()).step_by(2) {
            let pair = hex.get(i..i + 2).ok_or_else(|| {
                PredVisError::InvalidFormat(format!("non-ASCII bytecode line '{}'", line))
            })?;
            let byte = u8::from_str_radix(pair, 16).map_err(|_| {
                PredVisError::InvalidFormat(format!("invalid hex '{}' in '{}'", pair, line))
            })?;
            bytecode.push(byte);
        }
    }
    Ok(bytecode)
}
