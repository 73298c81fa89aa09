//! Predicate model and the registry that owns every predicate
//!
//! A predicate carries its script and, once built, the artifacts derived
//! from it. Artifacts only change as a whole and only after both pipeline
//! stages succeed, so a failed rebuild leaves the last good state in place.

use super::pipeline::{PredicateArtifacts, PredicatePipeline};
use crate::error::{PredVisError, Result, ResultExt};
use crate::types::PredicateId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

/// A predicate and its compiled state
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub id: PredicateId,
    pub name: String,
    /// File the script is loaded from and saved to
    pub script_path: Option<PathBuf>,
    script: Option<String>,
    artifacts: Option<PredicateArtifacts>,
    monitored: bool,
}

impl Predicate {
    fn new(id: PredicateId, name: String, script_path: Option<PathBuf>) -> Self {
        Self {
            id,
            name,
            script_path,
            script: None,
            artifacts: None,
            monitored: false,
        }
    }

    /// Script text, if set or already loaded
    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn artifacts(&self) -> Option<&PredicateArtifacts> {
        self.artifacts.as_ref()
    }

    pub fn assembly(&self) -> Option<&str> {
        self.artifacts.as_ref().map(|a| a.assembly.as_str())
    }

    pub fn bytecode(&self) -> Option<&[u8]> {
        self.artifacts.as_ref().map(|a| a.bytecode.as_slice())
    }

    /// Deployed and awaiting feedback
    pub fn is_monitored(&self) -> bool {
        self.monitored
    }

    pub fn is_deployable(&self) -> bool {
        self.artifacts.is_some()
    }
}

fn read_script(id: PredicateId, path: &Path) -> Result<String> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    tracing::debug!("Loaded script for predicate {} from {}", id, path.display());
    Ok(text)
}

/// A failed save is logged; the in-memory script stays authoritative
fn save_script(id: PredicateId, path: &Path, script: &str) {
    if let Err(e) = std::fs::write(path, script) {
        tracing::warn!(
            "Failed to save script for predicate {} to {}: {}",
            id,
            path.display(),
            e
        );
    }
}

/// Owns every predicate and allocates their ids
pub struct PredicateRegistry {
    pipeline: PredicatePipeline,
    predicates: Mutex<BTreeMap<PredicateId, Predicate>>,
    next_id: AtomicU32,
}

impl PredicateRegistry {
    pub fn new(pipeline: PredicatePipeline) -> Self {
        Self {
            pipeline,
            predicates: Mutex::new(BTreeMap::new()),
            next_id: AtomicU32::new(0),
        }
    }

    pub fn pipeline(&self) -> &PredicatePipeline {
        &self.pipeline
    }

    fn allocate_id(&self) -> PredicateId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a predicate with no script yet
    pub fn create(&self, name: impl Into<String>) -> PredicateId {
        self.insert(name.into(), None)
    }

    /// Register a predicate bound to a script file. The file is read on first use.
    pub fn create_from_file(&self, name: impl Into<String>, path: impl AsRef<Path>) -> PredicateId {
        self.insert(name.into(), Some(path.as_ref().to_path_buf()))
    }

    fn insert(&self, name: String, script_path: Option<PathBuf>) -> PredicateId {
        let id = self.allocate_id();
        tracing::info!("Registered predicate {} '{}'", id, name);
        crate::lock(&self.predicates).insert(id, Predicate::new(id, name, script_path));
        id
    }

    pub fn get(&self, id: PredicateId) -> Result<Predicate> {
        crate::lock(&self.predicates)
            .get(&id)
            .cloned()
            .ok_or(PredVisError::UnknownPredicate(id))
    }

    pub fn contains(&self, id: PredicateId) -> bool {
        crate::lock(&self.predicates).contains_key(&id)
    }

    /// All predicates in id order
    pub fn list(&self) -> Vec<Predicate> {
        crate::lock(&self.predicates).values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        crate::lock(&self.predicates).len()
    }

    pub fn is_empty(&self) -> bool {
        crate::lock(&self.predicates).is_empty()
    }

    pub fn remove(&self, id: PredicateId) -> Result<Predicate> {
        crate::lock(&self.predicates)
            .remove(&id)
            .ok_or(PredVisError::UnknownPredicate(id))
    }

    pub fn set_name(&self, id: PredicateId, name: impl Into<String>) -> Result<()> {
        let mut predicates = crate::lock(&self.predicates);
        let predicate = predicates
            .get_mut(&id)
            .ok_or(PredVisError::UnknownPredicate(id))?;
        predicate.name = name.into();
        Ok(())
    }

    pub fn set_monitored(&self, id: PredicateId, monitored: bool) -> Result<()> {
        let mut predicates = crate::lock(&self.predicates);
        let predicate = predicates
            .get_mut(&id)
            .ok_or(PredVisError::UnknownPredicate(id))?;
        predicate.monitored = monitored;
        Ok(())
    }

    /// Script text, loading it from the bound file on first use.
    /// The file is read without holding the registry lock.
    pub fn script(&self, id: PredicateId) -> Result<String> {
        let path = {
            let predicates = crate::lock(&self.predicates);
            let predicate = predicates
                .get(&id)
                .ok_or(PredVisError::UnknownPredicate(id))?;
            if let Some(script) = &predicate.script {
                return Ok(script.clone());
            }
            predicate.script_path.clone().ok_or_else(|| {
                PredVisError::Precondition(format!("predicate {} has no script", id))
            })?
        };

        let text = read_script(id, &path)?;
        let mut predicates = crate::lock(&self.predicates);
        let predicate = predicates
            .get_mut(&id)
            .ok_or(PredVisError::UnknownPredicate(id))?;
        // A script set while the file was being read wins
        Ok(predicate.script.get_or_insert(text).clone())
    }

    /// Replace the script, rebuilding every artifact.
    ///
    /// Nothing changes unless both compile and assemble succeed. On success
    /// the script is written back to its file, if it has one.
    pub fn set_script(&self, id: PredicateId, script: impl Into<String>) -> Result<()> {
        let script = script.into();
        if !self.contains(id) {
            return Err(PredVisError::UnknownPredicate(id));
        }

        let artifacts = self
            .pipeline
            .build(&script)
            .with_context(|| format!("Predicate {}", id))?;

        let script_path = {
            let mut predicates = crate::lock(&self.predicates);
            let predicate = predicates
                .get_mut(&id)
                .ok_or(PredVisError::UnknownPredicate(id))?;
            predicate.script = Some(script.clone());
            predicate.artifacts = Some(artifacts);
            predicate.script_path.clone()
        };
        tracing::info!("Predicate {} rebuilt from new script", id);

        if let Some(path) = script_path {
            save_script(id, &path, &script);
        }
        Ok(())
    }

    /// Replace the assembly and reassemble. Target and variables are kept.
    pub fn set_assembly(&self, id: PredicateId, assembly: impl Into<String>) -> Result<()> {
        let assembly = assembly.into();
        if self.get(id)?.artifacts.is_none() {
            return Err(PredVisError::Precondition(format!(
                "predicate {} has not been compiled",
                id
            )));
        }

        let bytecode = self
            .pipeline
            .assemble(&assembly)
            .with_context(|| format!("Predicate {}", id))?;

        let mut predicates = crate::lock(&self.predicates);
        let artifacts = predicates
            .get_mut(&id)
            .ok_or(PredVisError::UnknownPredicate(id))?
            .artifacts
            .as_mut()
            .ok_or_else(|| {
                PredVisError::Precondition(format!("predicate {} has not been compiled", id))
            })?;
        artifacts.assembly = assembly;
        artifacts.bytecode = bytecode;
        tracing::info!("Predicate {} reassembled", id);
        Ok(())
    }

    /// Rebuild from the current script
    pub fn recompile(&self, id: PredicateId) -> Result<()> {
        let script = self.script(id)?;
        self.set_script(id, script)
    }

    /// Artifacts for deployment, building from the script if that never happened
    pub fn ensure_built(&self, id: PredicateId) -> Result<PredicateArtifacts> {
        if let Some(artifacts) = self.get(id)?.artifacts {
            return Ok(artifacts);
        }
        self.recompile(id)?;
        self.get(id)?.artifacts.ok_or_else(|| {
            PredVisError::Precondition(format!("predicate {} has not been compiled", id))
        })
    }
}
