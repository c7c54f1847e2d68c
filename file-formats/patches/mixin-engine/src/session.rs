//! Working sessions
//!
//! A [`Session`] ties the pieces together for one batch of work: it loads
//! the catalog, resolves the caller's selection, loads the selected payloads,
//! plans and applies, and finally frees the payloads.
//!
//! ```no_run
//! use mixin_engine::{
//!     DirectoryBaseline, DirectoryPayloadSource, ManifestFile, RunOptions, Selection, Session,
//! };
//! use std::path::Path;
//!
//! # fn main() -> Result<(), mixin_engine::Error> {
//! let session = Session::start(
//!     &ManifestFile::new("mixins.yaml"),
//!     &DirectoryPayloadSource::new("payloads"),
//!     Selection::All,
//! )?;
//!
//! let baseline = DirectoryBaseline::new("backup");
//! let report = session.run(
//!     &baseline,
//!     Path::new("out"),
//!     &RunOptions::new().workers(4),
//!     &|failure: &mixin_engine::Failure| eprintln!("{failure}"),
//! )?;
//! println!("{:?}", report.outcome());
//!
//! session.end();
//! # Ok(())
//! # }
//! ```

use crate::applier::ModuleApplier;
use crate::baseline::BaselineSource;
use crate::catalog::{ManifestSource, MixinCatalog, MixinDescriptor};
use crate::failure::{FailureSink, NullSink};
use crate::planner::{PlanReport, plan_with_sink};
use crate::runner::{ModuleResult, RunOptions, RunReport, run_plan_with_progress};
use crate::store::{LoadReport, PayloadSource, PayloadStore};
use crate::{MixinId, Result};
use std::path::Path;

/// Which catalog mixins a session works with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every mixin in manifest order
    All,
    /// The listed ids in the given order
    Only(Vec<MixinId>),
}

impl Selection {
    /// Select the given ids
    pub fn only<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<MixinId>,
    {
        Selection::Only(ids.into_iter().map(Into::into).collect())
    }
}

/// One batch of planning and application
#[derive(Debug)]
pub struct Session {
    catalog: MixinCatalog,
    store: PayloadStore,
    selection: Vec<MixinId>,
    load_report: LoadReport,
}

impl Session {
    /// Load the catalog and the payloads of the selected mixins
    ///
    /// Fails if the manifest cannot be loaded, a selected id is unknown or
    /// the payload source is unusable. Individual payload problems are kept
    /// in [`load_report`](Self::load_report) instead.
    pub fn start(
        manifest: &dyn ManifestSource,
        payloads: &dyn PayloadSource,
        selection: Selection,
    ) -> Result<Self> {
        let catalog = MixinCatalog::load(manifest)?;
        Self::with_catalog(catalog, payloads, selection)
    }

    /// Start a session on an already loaded catalog
    pub fn with_catalog(
        catalog: MixinCatalog,
        payloads: &dyn PayloadSource,
        selection: Selection,
    ) -> Result<Self> {
        let selection = match selection {
            Selection::All => catalog.ids(),
            Selection::Only(ids) => {
                // Resolve up front so unknown ids fail the session
                catalog.select(ids.iter().map(MixinId::as_str))?;
                ids
            }
        };

        let mut store = PayloadStore::new();
        let load_report = {
            let selected = select(&catalog, &selection);
            store.load_payloads(payloads, &selected)?
        };

        log::info!(
            "Session started: {} of {} mixins selected, {} payloads loaded",
            selection.len(),
            catalog.len(),
            store.len()
        );

        Ok(Self {
            catalog,
            store,
            selection,
            load_report,
        })
    }

    /// The catalog
    pub fn catalog(&self) -> &MixinCatalog {
        &self.catalog
    }

    /// The payload store
    pub fn store(&self) -> &PayloadStore {
        &self.store
    }

    /// Selected ids in selection order
    pub fn selection(&self) -> &[MixinId] {
        &self.selection
    }

    /// Payload loading results
    pub fn load_report(&self) -> &LoadReport {
        &self.load_report
    }

    /// Selected descriptors whose payload loaded, in selection order
    pub fn plannable(&self) -> Vec<&MixinDescriptor> {
        select(&self.catalog, &self.selection)
            .into_iter()
            .filter(|d| !self.load_report.is_failed(&d.id))
            .collect()
    }

    /// Plan the selection
    ///
    /// Mixins whose payload failed to load were already reported by
    /// [`load_report`](Self::load_report) and are left out here.
    pub fn plan(&self) -> PlanReport<'_> {
        self.plan_with_sink(&NullSink)
    }

    /// [`plan`](Self::plan), forwarding failures to `sink`
    pub fn plan_with_sink(&self, sink: &dyn FailureSink) -> PlanReport<'_> {
        plan_with_sink(&self.plannable(), &self.store, sink)
    }

    /// Applier reading baselines from `baseline`
    pub fn applier<'s>(&'s self, baseline: &'s dyn BaselineSource) -> ModuleApplier<'s> {
        ModuleApplier::new(&self.store, baseline)
    }

    /// Plan and apply the selection
    ///
    /// The report includes load and planning failures.
    pub fn run(
        &self,
        baseline: &dyn BaselineSource,
        output_dir: &Path,
        options: &RunOptions,
        sink: &dyn FailureSink,
    ) -> Result<RunReport> {
        self.run_with_progress(baseline, output_dir, options, sink, &|_: &ModuleResult| {})
    }

    /// [`run`](Self::run), calling `progress` as each module finishes
    pub fn run_with_progress(
        &self,
        baseline: &dyn BaselineSource,
        output_dir: &Path,
        options: &RunOptions,
        sink: &dyn FailureSink,
        progress: &(dyn Fn(&ModuleResult) + Sync),
    ) -> Result<RunReport> {
        for failure in &self.load_report.failures {
            sink.record(failure);
        }

        let PlanReport { plan, failures } = self.plan_with_sink(sink);
        let applier = self.applier(baseline);
        let report = run_plan_with_progress(&plan, &applier, output_dir, options, sink, progress)?;

        let mut early = self.load_report.failures.clone();
        early.extend(failures);
        Ok(report.with_planning_failures(early))
    }

    /// Free every payload and end the session
    ///
    /// Returns how many payloads were released.
    pub fn end(mut self) -> usize {
        let freed = self.store.free_payloads();
        log::info!("Session ended, {freed} payloads freed");
        freed
    }
}

fn select<'c>(catalog: &'c MixinCatalog, ids: &[MixinId]) -> Vec<&'c MixinDescriptor> {
    ids.iter().filter_map(|id| catalog.get(id.as_str())).collect()
}
