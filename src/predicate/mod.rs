//! Predicates: scripts, their compiled artifacts, and the pipeline that builds them
//!
//! - [`pipeline`] - [`ScriptCompiler`] and [`Assembler`] stages behind a serialized [`PredicatePipeline`]
//! - [`command`] - Stages implemented by external programs
//! - [`registry`] - [`Predicate`] model and the id-allocating [`PredicateRegistry`]

pub mod command;
pub mod pipeline;
pub mod registry;

pub use command::{CommandAssembler, CommandCompiler};
pub use pipeline::{
    Assembler, CompiledScript, PredicateArtifacts, PredicatePipeline, ScriptCompiler,
};
pub use registry::{Predicate, PredicateRegistry};

use crate::config::CompilerConfig;
use crate::error::{PredVisError, Result};

/// Build the pipeline from the configured external programs
pub fn pipeline_from_config(config: &CompilerConfig) -> Result<PredicatePipeline> {
    let compiler = config
        .compiler_command
        .clone()
        .ok_or_else(|| PredVisError::Config("compiler.compiler_command is not set".to_string()))?;
    let assembler = config.assembler_command.clone().ok_or_else(|| {
        PredVisError::Config("compiler.assembler_command is not set".to_string())
    })?;
    Ok(PredicatePipeline::new(
        Box::new(CommandCompiler::new(compiler)),
        Box::new(CommandAssembler::new(assembler)),
    ))
}
