//! Running a plan across modules
//!
//! Modules are independent, so a plan's entries are applied concurrently on
//! a bounded rayon pool, one module per worker. Mixins of one module always
//! run sequentially on the same worker. With a single worker everything runs
//! on the calling thread.

use crate::applier::{ApplyError, ModuleApplier, ModuleContext, ModuleOutput};
use crate::cancel::CancellationToken;
use crate::failure::{Failure, FailureLog, FailureSink};
use crate::planner::{ApplicationPlan, PlanEntry};
use crate::{Error, MixinId, ModuleId, Result};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Options for [`run_plan`]
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Worker threads, 0 lets rayon decide, 1 runs sequentially
    pub workers: usize,
    /// Per-module contexts
    pub contexts: HashMap<ModuleId, ModuleContext>,
    /// Cancellation signal
    pub cancel: CancellationToken,
}

impl RunOptions {
    /// Default options: one worker per CPU, no contexts
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of workers
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Run every module on the calling thread
    pub fn sequential(self) -> Self {
        self.workers(1)
    }

    /// Attach a context to `module`
    pub fn context(mut self, module: &str, context: ModuleContext) -> Self {
        self.contexts.insert(ModuleId::new(module), context);
        self
    }

    /// Use `token` for cancellation
    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Context for `module`, if any
    pub fn context_for(&self, module: &ModuleId) -> Option<&ModuleContext> {
        self.contexts.get(module)
    }
}

/// What happened to one module
#[derive(Debug)]
pub enum ModuleStatus {
    /// The module was written
    Written(ModuleOutput),
    /// A module-level error stopped the module
    Failed(ApplyError),
    /// The run was cancelled before the module was written
    Cancelled,
}

/// Result for one plan entry
#[derive(Debug)]
pub struct ModuleResult {
    /// The module
    pub module: ModuleId,
    /// Planned mixins in order
    pub mixins: Vec<MixinId>,
    /// Final status
    pub status: ModuleStatus,
    /// Mixin failures recorded while applying
    pub failures: Vec<Failure>,
}

impl ModuleResult {
    /// Output, if the module was written
    pub fn output(&self) -> Option<&ModuleOutput> {
        match &self.status {
            ModuleStatus::Written(output) => Some(output),
            _ => None,
        }
    }

    /// Whether the module was written
    pub fn is_written(&self) -> bool {
        self.output().is_some()
    }
}

/// Overall classification of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every selected mixin applied and every module written
    Success,
    /// Some mixins failed, others applied
    PartialSuccess,
    /// No selected mixin made it into an output
    Failed,
    /// The run was cancelled
    Cancelled,
}

/// Aggregated result of a run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Per-module results in plan order
    pub modules: Vec<ModuleResult>,
    /// Every recorded failure, planning failures first
    pub failures: Vec<Failure>,
    /// Whether cancellation was requested
    pub cancelled: bool,
    /// Number of mixins the run was asked to apply
    pub attempted: usize,
}

impl RunReport {
    /// Add failures found before the plan ran
    ///
    /// Each failure counts as one more attempted mixin.
    pub fn with_planning_failures(mut self, failures: Vec<Failure>) -> Self {
        self.attempted += failures.len();
        let mut merged = failures;
        merged.append(&mut self.failures);
        self.failures = merged;
        self
    }

    /// Written modules
    pub fn written(&self) -> impl Iterator<Item = &ModuleOutput> {
        self.modules.iter().filter_map(ModuleResult::output)
    }

    /// Modules stopped by a module-level error
    pub fn module_errors(&self) -> impl Iterator<Item = &ApplyError> {
        self.modules.iter().filter_map(|result| match &result.status {
            ModuleStatus::Failed(err) => Some(err),
            _ => None,
        })
    }

    /// Number of mixins present in a written output
    pub fn applied_count(&self) -> usize {
        self.written().map(|output| output.applied.len()).sum()
    }

    /// Distinct mixins that did not make it into an output
    ///
    /// Covers recorded failures and every mixin of a module that was not
    /// written.
    pub fn failed_mixins(&self) -> BTreeSet<&MixinId> {
        let mut failed: BTreeSet<&MixinId> = self
            .failures
            .iter()
            .filter_map(|failure| failure.mixin.as_ref())
            .collect();
        for result in self.modules.iter().filter(|r| !r.is_written()) {
            failed.extend(result.mixins.iter());
        }
        failed
    }

    /// Whether nothing failed and nothing was cancelled
    pub fn is_fully_successful(&self) -> bool {
        !self.cancelled
            && self.failures.is_empty()
            && self.modules.iter().all(ModuleResult::is_written)
    }

    /// Classify the run
    pub fn outcome(&self) -> RunOutcome {
        if self.cancelled {
            RunOutcome::Cancelled
        } else if self.is_fully_successful() {
            RunOutcome::Success
        } else if self.failed_mixins().len() >= self.attempted {
            RunOutcome::Failed
        } else {
            RunOutcome::PartialSuccess
        }
    }
}

/// Apply every entry of `plan`, writing modules under `output_dir`
///
/// Module-level errors are recorded in the report; the returned error is
/// reserved for a worker pool that cannot be created.
pub fn run_plan(
    plan: &ApplicationPlan<'_>,
    applier: &ModuleApplier<'_>,
    output_dir: &Path,
    options: &RunOptions,
    sink: &dyn FailureSink,
) -> Result<RunReport> {
    run_plan_with_progress(plan, applier, output_dir, options, sink, &|_: &ModuleResult| {})
}

/// [`run_plan`], calling `progress` as each module finishes
pub fn run_plan_with_progress(
    plan: &ApplicationPlan<'_>,
    applier: &ModuleApplier<'_>,
    output_dir: &Path,
    options: &RunOptions,
    sink: &dyn FailureSink,
    progress: &(dyn Fn(&ModuleResult) + Sync),
) -> Result<RunReport> {
    let run_entry = |entry: &PlanEntry<'_>| {
        let result = run_module(entry, applier, output_dir, options, sink);
        progress(&result);
        result
    };

    let modules: Vec<ModuleResult> = if options.workers == 1 {
        log::debug!("Applying {} modules sequentially", plan.len());
        plan.iter().map(run_entry).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(options.workers)
            .thread_name(|i| format!("mixin-worker-{i}"))
            .build()
            .map_err(|e| Error::WorkerPool(e.to_string()))?;
        log::debug!(
            "Applying {} modules on {} workers",
            plan.len(),
            pool.current_num_threads()
        );
        pool.install(|| plan.entries().par_iter().map(run_entry).collect())
    };

    let failures = modules
        .iter()
        .flat_map(|result| result.failures.iter().cloned())
        .collect();
    let cancelled = options.cancel.is_cancelled()
        || modules
            .iter()
            .any(|result| matches!(result.status, ModuleStatus::Cancelled));

    let report = RunReport {
        modules,
        failures,
        cancelled,
        attempted: plan.mixin_count(),
    };

    log::info!(
        "Run finished: {} of {} modules written, {} failures{}",
        report.written().count(),
        report.modules.len(),
        report.failures.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
    Ok(report)
}

/// Forwards to the caller's sink while keeping the module's own failures
struct ModuleSink<'a> {
    log: FailureLog,
    outer: &'a dyn FailureSink,
}

impl FailureSink for ModuleSink<'_> {
    fn record(&self, failure: &Failure) {
        self.log.record(failure);
        self.outer.record(failure);
    }
}

fn run_module(
    entry: &PlanEntry<'_>,
    applier: &ModuleApplier<'_>,
    output_dir: &Path,
    options: &RunOptions,
    sink: &dyn FailureSink,
) -> ModuleResult {
    let module_sink = ModuleSink {
        log: FailureLog::new(),
        outer: sink,
    };

    let status = match applier.apply_to_module(
        entry,
        output_dir,
        options.context_for(&entry.module),
        &options.cancel,
        &module_sink,
    ) {
        Ok(output) => ModuleStatus::Written(output),
        Err(err) if err.is_cancelled() => {
            log::info!("{err}");
            ModuleStatus::Cancelled
        }
        Err(err) => {
            log::error!("{err}");
            ModuleStatus::Failed(err)
        }
    };

    ModuleResult {
        module: entry.module.clone(),
        mixins: entry.mixins.iter().map(|d| d.id.clone()).collect(),
        status,
        failures: module_sink.log.into_failures(),
    }
}
