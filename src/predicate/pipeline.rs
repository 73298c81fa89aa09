//! Compile and assemble stages for predicate scripts
//!
//! Both stages are external to this crate. [`ScriptCompiler`] turns a script
//! into its target mote, remote variable table and assembly text;
//! [`Assembler`] turns assembly text into bytecode. A [`PredicatePipeline`]
//! owns one instance of each and serializes calls to them, so an
//! implementation may keep scratch state between calls as long as every call
//! behaves as if freshly initialized.

use crate::error::{PredVisError, Result};
use crate::types::{NodeId, VariableDetails};
use std::sync::Mutex;

/// Output of a successful compile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScript {
    /// Mote the predicate is evaluated on
    pub target: NodeId,
    /// Remote variables the predicate reads
    pub variables: Vec<VariableDetails>,
    /// Assembly text for the [`Assembler`]
    pub assembly: String,
}

/// Everything needed to deploy a predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PredicateArtifacts {
    pub target: NodeId,
    pub variables: Vec<VariableDetails>,
    pub assembly: String,
    pub bytecode: Vec<u8>,
}

impl PredicateArtifacts {
    pub fn new(compiled: CompiledScript, bytecode: Vec<u8>) -> Self {
        Self {
            target: compiled.target,
            variables: compiled.variables,
            assembly: compiled.assembly,
            bytecode,
        }
    }
}

/// Script to assembly stage.
///
/// Must be deterministic in `script`. Fails with [`PredVisError::Compile`]
/// carrying a diagnostic the editor can show.
#[cfg_attr(test, mockall::automock)]
pub trait ScriptCompiler: Send {
    fn compile(&self, script: &str) -> Result<CompiledScript>;
}

/// Assembly to bytecode stage.
///
/// Must be deterministic in `assembly`. Fails with [`PredVisError::Assemble`].
#[cfg_attr(test, mockall::automock)]
pub trait Assembler: Send {
    fn assemble(&self, assembly: &str) -> Result<Vec<u8>>;
}

struct Unavailable;

impl ScriptCompiler for Unavailable {
    fn compile(&self, _script: &str) -> Result<CompiledScript> {
        Err(PredVisError::Compile("no compiler configured".to_string()))
    }
}

impl Assembler for Unavailable {
    fn assemble(&self, _assembly: &str) -> Result<Vec<u8>> {
        Err(PredVisError::Assemble("no assembler configured".to_string()))
    }
}

/// A compiler and assembler pair with serialized access
pub struct PredicatePipeline {
    compiler: Mutex<Box<dyn ScriptCompiler>>,
    assembler: Mutex<Box<dyn Assembler>>,
}

impl PredicatePipeline {
    pub fn new(compiler: Box<dyn ScriptCompiler>, assembler: Box<dyn Assembler>) -> Self {
        Self {
            compiler: Mutex::new(compiler),
            assembler: Mutex::new(assembler),
        }
    }

    pub fn compile(&self, script: &str) -> Result<CompiledScript> {
        let compiler = crate::lock(&self.compiler);
        compiler.compile(script)
    }

    /// Assemble previously compiled assembly text
    pub fn assemble(&self, assembly: &str) -> Result<Vec<u8>> {
        if assembly.trim().is_empty() {
            return Err(PredVisError::Precondition(
                "no assembly to assemble; compile the script first".to_string(),
            ));
        }
        let assembler = crate::lock(&self.assembler);
        assembler.assemble(assembly)
    }

    /// A pipeline whose stages always fail, for running without a toolchain
    pub fn unavailable() -> Self {
        Self::new(Box::new(Unavailable), Box::new(Unavailable))
    }

    /// Compile then assemble
    pub fn build(&self, script: &str) -> Result<PredicateArtifacts> {
        let compiled = self.compile(script)?;
        let bytecode = self.assemble(&compiled.assembly)?;
        tracing::debug!(
            "Built predicate for {}: {} variables, {} bytes of bytecode",
            compiled.target,
            compiled.variables.len(),
            bytecode.len()
        );
        Ok(PredicateArtifacts::new(compiled, bytecode))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;

    fn compiled(target: &str, assembly: &str) -> CompiledScript {
        CompiledScript {
            target: target.parse().unwrap(),
            variables: vec![VariableDetails::new(1, 2)],
            assembly: assembly.to_string(),
        }
    }

    #[test]
    fn test_build_runs_both_stages() {
        let mut compiler = MockScriptCompiler::new();
        compiler
            .expect_compile()
            .with(eq("a == 1"))
            .times(1)
            .returning(|_| Ok(compiled("1.2", "PUSH 1")));

        let mut assembler = MockAssembler::new();
        assembler
            .expect_assemble()
            .with(eq("PUSH 1"))
            .times(1)
            .returning(|_| Ok(vec![0x01, 0xFF]));

        let pipeline = PredicatePipeline::new(Box::new(compiler), Box::new(assembler));
        let artifacts = pipeline.build("a == 1").unwrap();
        assert_eq!(artifacts.target.as_str(), "1.2");
        assert_eq!(artifacts.assembly, "PUSH 1");
        assert_eq!(artifacts.bytecode, vec![0x01, 0xFF]);
    }

    #[test]
    fn test_compile_failure_skips_assembler() {
        let mut compiler = MockScriptCompiler::new();
        compiler
            .expect_compile()
            .returning(|_| Err(PredVisError::Compile("line 1: unexpected ')'".to_string())));

        let mut assembler = MockAssembler::new();
        assembler.expect_assemble().never();

        let pipeline = PredicatePipeline::new(Box::new(compiler), Box::new(assembler));
        let err = pipeline.build("a == )").unwrap_err();
        assert!(matches!(err, PredVisError::Compile(msg) if msg.contains("line 1")));
    }

    #[test]
    fn test_assemble_without_assembly_is_precondition() {
        let mut assembler = MockAssembler::new();
        assembler.expect_assemble().never();

        let pipeline =
            PredicatePipeline::new(Box::new(MockScriptCompiler::new()), Box::new(assembler));
        assert!(matches!(
            pipeline.assemble("  \n"),
            Err(PredVisError::Precondition(_))
        ));
    }

    #[test]
    fn test_unavailable_pipeline_fails_to_compile() {
        let pipeline = PredicatePipeline::unavailable();
        assert!(matches!(pipeline.build("a"), Err(PredVisError::Compile(_))));
    }

    #[test]
    fn test_repeated_calls_are_independent() {
        let mut compiler = MockScriptCompiler::new();
        compiler
            .expect_compile()
            .times(2)
            .returning(|script| Ok(compiled("3", script)));

        let pipeline =
            PredicatePipeline::new(Box::new(compiler), Box::new(MockAssembler::new()));
        assert_eq!(pipeline.compile("x").unwrap().assembly, "x");
        assert_eq!(pipeline.compile("y").unwrap().assembly, "y");
    }
}
