//! Test data builders for wire lines and predicate scripts

use predvis_rs::feedback::FEEDBACK_PREFIX;
use predvis_rs::protocol::inbound::NEIGHBOUR_PREFIX;

/// Builder for `R=` neighbour report lines
pub struct NeighbourReportBuilder {
    round: u32,
    pairs: Vec<(String, String)>,
}

impl NeighbourReportBuilder {
    pub fn new(round: u32) -> Self {
        Self {
            round,
            pairs: Vec::new(),
        }
    }

    pub fn link(mut self, a: &str, b: &str) -> Self {
        self.pairs.push((a.to_string(), b.to_string()));
        self
    }

    pub fn build(self) -> String {
        let pairs: Vec<String> = self
            .pairs
            .iter()
            .map(|(a, b)| format!("{},{}", a, b))
            .collect();
        format!("{}{}|{}", NEIGHBOUR_PREFIX, self.round, pairs.join("~"))
    }
}

/// Builder for `PF` feedback lines
pub struct FeedbackBuilder {
    from: String,
    predicate_id: u32,
    specs: Vec<String>,
    nodes: Vec<String>,
    clock: i64,
    result: bool,
}

impl FeedbackBuilder {
    pub fn new(from: &str, predicate_id: u32) -> Self {
        Self {
            from: from.to_string(),
            predicate_id,
            specs: Vec::new(),
            nodes: Vec::new(),
            clock: 0,
            result: false,
        }
    }

    pub fn variable(mut self, hops: u8, id: u8, length: u32) -> Self {
        self.specs.push(format!("{}#{}#{}", hops, id, length));
        self
    }

    /// One node data block of `key=value` pairs
    pub fn node(mut self, values: &[(u32, &str)]) -> Self {
        let block: Vec<String> = values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        self.nodes.push(block.join(","));
        self
    }

    pub fn clock(mut self, clock: i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn result(mut self, result: bool) -> Self {
        self.result = result;
        self
    }

    pub fn build(self) -> String {
        format!(
            "{} *{}:{}:{}:{}:{}:{}*",
            FEEDBACK_PREFIX,
            self.from,
            self.predicate_id,
            self.specs.join(","),
            self.nodes.join("|"),
            self.clock,
            u8::from(self.result)
        )
    }
}

/// Builder for scripts understood by [`super::mock_helpers::FakeCompiler`]
pub struct ScriptBuilder {
    target: Option<String>,
    variables: Vec<(u8, u8)>,
    bytecode: Vec<u8>,
}

impl ScriptBuilder {
    pub fn new() -> Self {
        Self {
            target: None,
            variables: Vec::new(),
            bytecode: Vec::new(),
        }
    }

    pub fn target(mut self, target: &str) -> Self {
        self.target = Some(target.to_string());
        self
    }

    pub fn variable(mut self, id: u8, hops: u8) -> Self {
        self.variables.push((id, hops));
        self
    }

    pub fn bytecode(mut self, bytecode: &[u8]) -> Self {
        self.bytecode = bytecode.to_vec();
        self
    }

    pub fn build(self) -> String {
        let mut lines = Vec::new();
        if let Some(target) = self.target {
            lines.push(format!("target {}", target));
        }
        for (id, hops) in self.variables {
            lines.push(format!("var {} {}", id, hops));
        }
        if !self.bytecode.is_empty() {
            let bytes: Vec<String> = self.bytecode.iter().map(|b| format!("{:02x}", b)).collect();
            lines.push(bytes.join(" "));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neighbour_report_builder() {
        let line = NeighbourReportBuilder::new(3)
            .link("1.2", "1.3")
            .link("1.3", "4.5")
            .build();
        assert_eq!(line, "R=3|1.2,1.3~1.3,4.5");
    }

    #[test]
    fn test_feedback_builder() {
        let line = FeedbackBuilder::new("1.2", 7)
            .variable(0, 1, 4)
            .node(&[(0, "10"), (1, "20.5")])
            .clock(1500)
            .result(true)
            .build();
        assert_eq!(line, "PF *1.2:7:0#1#4:0=10,1=20.5:1500:1*");
    }
}
