//! Module application
//!
//! [`ModuleApplier`] applies one plan entry to one module. Each mixin runs
//! against a scratch copy of the working buffer, so a mixin that fails part
//! way leaves no trace; the failure is recorded and the next mixin runs on
//! the buffer as it was before.
//!
//! The result is written through a temporary file in the destination
//! directory that is renamed into place only once the whole module is done.
//! A module that is cancelled or fails to write leaves nothing behind.

use crate::baseline::BaselineSource;
use crate::cancel::CancellationToken;
use crate::failure::{Failure, FailureCause, FailureSink, NullSink, Tee};
use crate::planner::PlanEntry;
use crate::store::PayloadStore;
use crate::{MixinId, ModuleId};
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Extra information about the module being patched
///
/// Typically describes a custom DLC the module is packaged into.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleContext {
    /// Display name, used in logs
    pub name: String,
    /// Directory under the output root that receives the module
    pub output_subdir: Option<PathBuf>,
}

impl ModuleContext {
    /// Context with a display name
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            output_subdir: None,
        }
    }

    /// Place the output under `subdir`
    pub fn with_output_subdir<P: Into<PathBuf>>(mut self, subdir: P) -> Self {
        self.output_subdir = Some(subdir.into());
        self
    }
}

/// Fatal error for one module
///
/// Other modules of the run are unaffected.
#[derive(Error, Debug)]
pub enum ApplyError {
    /// Baseline bytes could not be read
    #[error("cannot read baseline for {module}: {source}")]
    Baseline {
        /// Affected module
        module: ModuleId,
        /// Underlying error
        source: io::Error,
    },

    /// The output file could not be written
    #[error("cannot write {module} to {}: {source}", path.display())]
    Output {
        /// Affected module
        module: ModuleId,
        /// Destination path
        path: PathBuf,
        /// Underlying error
        source: io::Error,
    },

    /// No output path can be derived for the module
    #[error("no output path for {module}: {reason}")]
    InvalidTarget {
        /// Affected module
        module: ModuleId,
        /// Why
        reason: String,
    },

    /// Cancellation was requested before the module was written
    #[error("application of {module} was cancelled")]
    Cancelled {
        /// Affected module
        module: ModuleId,
    },
}

impl ApplyError {
    /// Module the error belongs to
    pub fn module(&self) -> &ModuleId {
        match self {
            ApplyError::Baseline { module, .. }
            | ApplyError::Output { module, .. }
            | ApplyError::InvalidTarget { module, .. }
            | ApplyError::Cancelled { module } => module,
        }
    }

    /// Whether this is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApplyError::Cancelled { .. })
    }
}

/// A written module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleOutput {
    /// The module
    pub module: ModuleId,
    /// Path of the written file
    pub path: PathBuf,
    /// Size of the written file
    pub size: u64,
    /// Mixins applied, in order
    pub applied: Vec<MixinId>,
    /// Mixins that failed, one entry each
    pub failures: Vec<Failure>,
}

/// A module patched in memory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchedModule {
    /// Resulting bytes
    pub bytes: Vec<u8>,
    /// Mixins applied, in order
    pub applied: Vec<MixinId>,
    /// Mixins that failed, one entry each
    pub failures: Vec<Failure>,
}

/// Applies plan entries using a payload store and a baseline source
pub struct ModuleApplier<'s> {
    store: &'s PayloadStore,
    baseline: &'s dyn BaselineSource,
}

impl fmt::Debug for ModuleApplier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleApplier")
            .field("payloads", &self.store.len())
            .finish_non_exhaustive()
    }
}

impl<'s> ModuleApplier<'s> {
    /// Create an applier
    pub fn new(store: &'s PayloadStore, baseline: &'s dyn BaselineSource) -> Self {
        Self { store, baseline }
    }

    /// Apply `entry` and write the module under `output_dir`
    ///
    /// Mixin failures are reported through `sink` and in the returned
    /// [`ModuleOutput`]. Only an unreadable baseline, an unwritable output or
    /// cancellation is an error.
    pub fn apply_to_module(
        &self,
        entry: &PlanEntry<'_>,
        output_dir: &Path,
        context: Option<&ModuleContext>,
        cancel: &CancellationToken,
        sink: &dyn FailureSink,
    ) -> Result<ModuleOutput, ApplyError> {
        let module = &entry.module;
        if cancel.is_cancelled() {
            return Err(ApplyError::Cancelled {
                module: module.clone(),
            });
        }

        let path = output_path(module, output_dir, context)?;
        match context {
            Some(context) => log::info!(
                "Applying {} mixins to {module} ({})",
                entry.len(),
                context.name
            ),
            None => log::info!("Applying {} mixins to {module}", entry.len()),
        }

        let mut working = self
            .baseline
            .read_module(module)
            .map_err(|source| ApplyError::Baseline {
                module: module.clone(),
                source,
            })?;

        let tee = Tee::new(sink);
        let applied = self.apply_mixins(entry, &mut working, Some(cancel), &tee)?;

        if cancel.is_cancelled() {
            return Err(ApplyError::Cancelled {
                module: module.clone(),
            });
        }

        write_output(&path, &working).map_err(|source| ApplyError::Output {
            module: module.clone(),
            path: path.clone(),
            source,
        })?;

        let failures = tee.log.into_failures();
        log::info!(
            "Wrote {} ({} bytes, {} applied, {} failed)",
            path.display(),
            working.len(),
            applied.len(),
            failures.len()
        );

        Ok(ModuleOutput {
            module: module.clone(),
            path,
            size: working.len() as u64,
            applied,
            failures,
        })
    }

    /// Apply `entry` to baseline bytes already in memory
    pub fn patch(&self, entry: &PlanEntry<'_>, baseline: Vec<u8>) -> PatchedModule {
        self.patch_with_sink(entry, baseline, &NullSink)
    }

    /// [`patch`](Self::patch), forwarding failures to `sink`
    pub fn patch_with_sink(
        &self,
        entry: &PlanEntry<'_>,
        baseline: Vec<u8>,
        sink: &dyn FailureSink,
    ) -> PatchedModule {
        let tee = Tee::new(sink);
        let mut bytes = baseline;
        // Without a token the only error, cancellation, cannot occur
        let applied = self
            .apply_mixins(entry, &mut bytes, None, &tee)
            .unwrap_or_default();
        PatchedModule {
            bytes,
            applied,
            failures: tee.log.into_failures(),
        }
    }

    fn apply_mixins(
        &self,
        entry: &PlanEntry<'_>,
        working: &mut Vec<u8>,
        cancel: Option<&CancellationToken>,
        tee: &Tee<'_>,
    ) -> Result<Vec<MixinId>, ApplyError> {
        let mut applied = Vec::with_capacity(entry.len());

        for descriptor in &entry.mixins {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                log::debug!("Cancelled before {} in {}", descriptor.id, entry.module);
                return Err(ApplyError::Cancelled {
                    module: entry.module.clone(),
                });
            }

            let payload = match self.store.resolve(&descriptor.id) {
                Ok(payload) => payload,
                Err(cause) => {
                    tee.push(Failure::new(&descriptor.id, &entry.module, cause));
                    continue;
                }
            };

            let mut scratch = working.clone();
            match payload.apply(&mut scratch) {
                Ok(()) => {
                    log::debug!(
                        "Applied {} to {} ({} -> {} bytes)",
                        descriptor.id,
                        entry.module,
                        working.len(),
                        scratch.len()
                    );
                    *working = scratch;
                    applied.push(descriptor.id.clone());
                }
                Err(err) => {
                    tee.push(Failure::new(
                        &descriptor.id,
                        &entry.module,
                        FailureCause::Edit(err),
                    ));
                }
            }
        }

        Ok(applied)
    }
}

/// Where a module's output goes
///
/// `output_dir[/context subdir]/<module relative path>`
pub fn output_path(
    module: &ModuleId,
    output_dir: &Path,
    context: Option<&ModuleContext>,
) -> Result<PathBuf, ApplyError> {
    let relative = module
        .relative_path()
        .map_err(|e| ApplyError::InvalidTarget {
            module: module.clone(),
            reason: e.to_string(),
        })?;

    let mut path = output_dir.to_path_buf();
    if let Some(subdir) = context.and_then(|c| c.output_subdir.as_deref()) {
        let subdir = crate::ids::relative_path(&subdir.to_string_lossy().replace('\\', "/"))
            .map_err(|e| ApplyError::InvalidTarget {
                module: module.clone(),
                reason: format!("context output directory: {e}"),
            })?;
        path.push(subdir);
    }
    path.push(relative);
    Ok(path)
}

/// Write `bytes` to `path` through a temporary file in the same directory
fn write_output(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let mut temp_file = NamedTempFile::new_in(parent)?;
    temp_file.write_all(bytes)?;
    temp_file.as_file().sync_all()?;

    temp_file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
