//! Mock construction helpers
//!
//! [`FakeCompiler`] understands a tiny line-based script:
//!
//! ```text
//! target 1.2       required, the mote to deploy to
//! var 1 2          remote variable id 1 at 2 hops, any number
//! 01 ff 80         everything else is passed through as assembly
//! ```
//!
//! [`FakeAssembler`] reads the assembly as whitespace-separated hex bytes.

use predvis_rs::backend::{LineTransport, MockLink, MockPeer};
use predvis_rs::config::MOTE_BUFFER_SIZE;
use predvis_rs::predicate::{Assembler, CompiledScript, PredicatePipeline, ScriptCompiler};
use predvis_rs::{
    NodeId, PredVisError, PredicateRegistry, ProtocolDispatcher, TopologyTracker,
    VariableDetails, WsnMonitor,
};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeCompiler;

impl ScriptCompiler for FakeCompiler {
    fn compile(&self, script: &str) -> predvis_rs::Result<CompiledScript> {
        let mut target: Option<NodeId> = None;
        let mut variables = Vec::new();
        let mut assembly = Vec::new();

        for (number, line) in script.lines().enumerate() {
            let fail = |msg: &str| PredVisError::Compile(format!("line {}: {}", number + 1, msg));
            let words: Vec<&str> = line.split_whitespace().collect();
            match words.as_slice() {
                ["target", node] => {
                    target = Some(node.parse().map_err(|_| fail("bad target"))?);
                }
                ["var", id, hops] => {
                    let id: i64 = id.parse().map_err(|_| fail("bad variable id"))?;
                    let hops: i64 = hops.parse().map_err(|_| fail("bad hop count"))?;
                    variables.push(VariableDetails::try_new(id, hops).map_err(|_| fail("range"))?);
                }
                [] => {}
                _ => assembly.push(line.trim().to_string()),
            }
        }

        let target = target.ok_or_else(|| PredVisError::Compile("missing target".to_string()))?;
        Ok(CompiledScript {
            target,
            variables,
            assembly: assembly.join("\n"),
        })
    }
}

pub struct FakeAssembler;

impl Assembler for FakeAssembler {
    fn assemble(&self, assembly: &str) -> predvis_rs::Result<Vec<u8>> {
        assembly
            .split_whitespace()
            .map(|token| {
                u8::from_str_radix(token, 16)
                    .map_err(|_| PredVisError::Assemble(format!("bad byte '{}'", token)))
            })
            .collect()
    }
}

pub fn fake_pipeline() -> PredicatePipeline {
    PredicatePipeline::new(Box::new(FakeCompiler), Box::new(FakeAssembler))
}

/// Transport over an in-memory link with the mote buffer size
pub fn mock_transport() -> (LineTransport, MockPeer) {
    let (link, peer) = MockLink::new();
    (
        LineTransport::new(Box::new(link), MOTE_BUFFER_SIZE, Duration::from_millis(500)),
        peer,
    )
}

/// Monitor over an in-memory link, not yet connected
pub fn mock_monitor() -> (WsnMonitor, MockPeer) {
    mock_monitor_with_retention(None)
}

pub fn mock_monitor_with_retention(max_rounds: Option<usize>) -> (WsnMonitor, MockPeer) {
    let (transport, peer) = mock_transport();
    let tracker = Arc::new(TopologyTracker::with_retention(max_rounds));
    let dispatcher = ProtocolDispatcher::new(transport, tracker, 256);
    (
        WsnMonitor::new(dispatcher, PredicateRegistry::new(fake_pipeline())),
        peer,
    )
}

/// Split written lines into `[` ... `]` frames
pub fn frames(lines: &[String]) -> Vec<Vec<String>> {
    let mut frames = Vec::new();
    let mut current: Option<Vec<String>> = None;
    for line in lines {
        match line.as_str() {
            "[" => {
                assert!(current.is_none(), "frame opened inside another frame");
                current = Some(Vec::new());
            }
            "]" => {
                let frame = current.take().expect("frame closed without opening");
                frames.push(frame);
            }
            _ => current
                .as_mut()
                .expect("line outside of a frame")
                .push(line.clone()),
        }
    }
    assert!(current.is_none(), "unterminated frame");
    frames
}
