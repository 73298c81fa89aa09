//! Pipeline stages backed by external programs
//!
//! - [`CommandCompiler`] writes the script to the program's stdin and reads
//!   a JSON document from stdout:
//!   `{"target": "1.2", "variables": [{"id": 1, "hops": 2}], "assembly": "..."}`
//! - [`CommandAssembler`] writes assembly to stdin and takes stdout verbatim
//!   as bytecode.
//!
//! A non-zero exit status fails the stage with the program's stderr as the
//! diagnostic.

use super::pipeline::{Assembler, CompiledScript, ScriptCompiler};
use crate::config::CommandSpec;
use crate::error::{PredVisError, Result};
use crate::types::{NodeId, VariableDetails};
use serde::Deserialize;
use std::io::Write;
use std::process::{Command, Output, Stdio};

#[derive(Debug, Deserialize)]
struct CompilerOutput {
    target: String,
    #[serde(default)]
    variables: Vec<VariableEntry>,
    assembly: String,
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    id: i64,
    hops: i64,
}

/// Run `spec` with `input` on stdin and collect its output
fn run(spec: &CommandSpec, input: &[u8]) -> std::io::Result<Output> {
    let mut child = Command::new(&spec.program)
        .args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        let input = input.to_vec();
        // Feed stdin from a separate thread so a chatty child can't fill stdout and stall us
        std::thread::spawn(move || {
            if let Err(e) = stdin.write_all(&input) {
                tracing::debug!("Pipeline stage closed stdin early: {}", e);
            }
        });
    }

    child.wait_with_output()
}

fn describe(spec: &CommandSpec) -> String {
    if spec.args.is_empty() {
        spec.program.display().to_string()
    } else {
        format!("{} {}", spec.program.display(), spec.args.join(" "))
    }
}

fn diagnostic(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr
    }
}

/// Compiler stage that shells out to a program
#[derive(Debug, Clone)]
pub struct CommandCompiler {
    spec: CommandSpec,
}

impl CommandCompiler {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl ScriptCompiler for CommandCompiler {
    fn compile(&self, script: &str) -> Result<CompiledScript> {
        let output = run(&self.spec, script.as_bytes()).map_err(|e| {
            PredVisError::Compile(format!("failed to run '{}': {}", describe(&self.spec), e))
        })?;
        if !output.status.success() {
            return Err(PredVisError::Compile(diagnostic(&output)));
        }

        let parsed: CompilerOutput = serde_json::from_slice(&output.stdout).map_err(|e| {
            PredVisError::Compile(format!("unreadable compiler output: {}", e))
        })?;

        let target: NodeId = parsed
            .target
            .parse()
            .map_err(|e| PredVisError::Compile(format!("invalid target: {}", e)))?;

        let variables = parsed
            .variables
            .into_iter()
            .map(|v| VariableDetails::try_new(v.id, v.hops))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| PredVisError::Compile(format!("invalid variable table: {}", e)))?;

        Ok(CompiledScript {
            target,
            variables,
            assembly: parsed.assembly,
        })
    }
}

/// Assembler stage that shells out to a program
#[derive(Debug, Clone)]
pub struct CommandAssembler {
    spec: CommandSpec,
}

impl CommandAssembler {
    pub fn new(spec: CommandSpec) -> Self {
        Self { spec }
    }
}

impl Assembler for CommandAssembler {
    fn assemble(&self, assembly: &str) -> Result<Vec<u8>> {
        let output = run(&self.spec, assembly.as_bytes()).map_err(|e| {
            PredVisError::Assemble(format!("failed to run '{}': {}", describe(&self.spec), e))
        })?;
        if !output.status.success() {
            return Err(PredVisError::Assemble(diagnostic(&output)));
        }
        Ok(output.stdout)
    }
}
