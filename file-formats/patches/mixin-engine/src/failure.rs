//! Recoverable per-mixin failures
//!
//! Anything that prevents a single mixin from being planned or applied is
//! recorded as a [`Failure`] and processing continues. Failures are returned
//! in reports and can also be observed as they happen through a
//! [`FailureSink`]; any `Fn(&Failure) + Sync` closure is a sink.

use crate::payload::EditError;
use crate::{MixinId, ModuleId};
use parking_lot::Mutex;
use std::fmt;

/// Why a mixin was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureCause {
    /// The descriptor has no target module
    EmptyTarget,
    /// The target module id cannot be mapped to a path
    UnresolvedTarget(String),
    /// No payload is cached for the mixin, or the cache was freed
    PayloadUnavailable,
    /// Fetching, verifying or decoding the payload failed
    PayloadLoad(String),
    /// The mixin is listed more than once for its module
    DuplicateMixin,
    /// A prerequisite targets a different module
    CrossModulePrerequisite {
        /// The prerequisite id
        prerequisite: MixinId,
        /// The module the prerequisite targets
        module: ModuleId,
    },
    /// A prerequisite is not part of the plan
    MissingPrerequisite {
        /// The prerequisite id
        prerequisite: MixinId,
    },
    /// A prerequisite is planned after its dependent
    PrerequisiteOrder {
        /// The prerequisite id
        prerequisite: MixinId,
    },
    /// An edit operation could not be applied
    Edit(EditError),
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::EmptyTarget => write!(f, "no target module"),
            FailureCause::UnresolvedTarget(reason) => {
                write!(f, "unresolved target module: {reason}")
            }
            FailureCause::PayloadUnavailable => write!(f, "payload unavailable"),
            FailureCause::PayloadLoad(reason) => write!(f, "payload failed to load: {reason}"),
            FailureCause::DuplicateMixin => write!(f, "listed more than once for its module"),
            FailureCause::CrossModulePrerequisite {
                prerequisite,
                module,
            } => write!(
                f,
                "prerequisite '{prerequisite}' targets a different module ({module})"
            ),
            FailureCause::MissingPrerequisite { prerequisite } => {
                write!(f, "prerequisite '{prerequisite}' is not planned")
            }
            FailureCause::PrerequisiteOrder { prerequisite } => {
                write!(f, "prerequisite '{prerequisite}' is ordered after this mixin")
            }
            FailureCause::Edit(err) => write!(f, "edit failed: {err}"),
        }
    }
}

/// A recoverable failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    /// The affected mixin
    pub mixin: Option<MixinId>,
    /// The affected module, if known
    pub module: Option<ModuleId>,
    /// What went wrong
    pub cause: FailureCause,
}

impl Failure {
    /// Failure of a mixin within a module
    pub fn new(mixin: &MixinId, module: &ModuleId, cause: FailureCause) -> Self {
        Self {
            mixin: Some(mixin.clone()),
            module: (!module.is_empty()).then(|| module.clone()),
            cause,
        }
    }

    /// Failure of a mixin not tied to a module
    pub fn for_mixin(mixin: &MixinId, cause: FailureCause) -> Self {
        Self {
            mixin: Some(mixin.clone()),
            module: None,
            cause,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.mixin, &self.module) {
            (Some(mixin), Some(module)) => write!(f, "{mixin} @ {module}: {}", self.cause),
            (Some(mixin), None) => write!(f, "{mixin}: {}", self.cause),
            (None, Some(module)) => write!(f, "{module}: {}", self.cause),
            (None, None) => write!(f, "{}", self.cause),
        }
    }
}

/// Receives failures as they are recorded
///
/// Sinks are called from worker threads and must tolerate concurrent calls.
pub trait FailureSink: Sync {
    /// Record one failure
    fn record(&self, failure: &Failure);
}

impl<F> FailureSink for F
where
    F: Fn(&Failure) + Sync,
{
    fn record(&self, failure: &Failure) {
        self(failure)
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl FailureSink for NullSink {
    fn record(&self, _failure: &Failure) {}
}

/// Thread-safe failure collector
#[derive(Debug, Default)]
pub struct FailureLog {
    failures: Mutex<Vec<Failure>>,
}

impl FailureLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded failures
    pub fn len(&self) -> usize {
        self.failures.lock().len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.failures.lock().is_empty()
    }

    /// Copy of the failures recorded so far
    pub fn snapshot(&self) -> Vec<Failure> {
        self.failures.lock().clone()
    }

    /// Take the recorded failures
    pub fn into_failures(self) -> Vec<Failure> {
        self.failures.into_inner()
    }
}

impl FailureSink for FailureLog {
    fn record(&self, failure: &Failure) {
        self.failures.lock().push(failure.clone());
    }
}

/// Records into a local log and forwards to the caller's sink
pub(crate) struct Tee<'a> {
    pub(crate) log: FailureLog,
    pub(crate) sink: &'a dyn FailureSink,
}

impl<'a> Tee<'a> {
    pub(crate) fn new(sink: &'a dyn FailureSink) -> Self {
        Self {
            log: FailureLog::new(),
            sink,
        }
    }

    /// Record, log and forward one failure
    pub(crate) fn push(&self, failure: Failure) {
        log::warn!("{failure}");
        self.sink.record(&failure);
        self.log.record(&failure);
    }
}
