//! # mixin_engine - Mixin Planning and Application
//!
//! Composes community-authored binary patches ("mixins") onto game asset
//! container files ("modules") and writes the patched modules to an output
//! directory.
//!
//! ## Features
//!
//! - Deterministic per-module planning with a finalizer class that always
//!   runs last
//! - Per-mixin failure isolation: a bad mixin is rolled back and reported,
//!   the rest still apply
//! - Parallel application across modules on a bounded worker pool, or fully
//!   sequential
//! - Cooperative cancellation without partially written outputs
//! - Compact MXPT payload format with pre-image checks, BSDIFF40 diffs and
//!   finalizer-only checksum and layout repair
//!
//! ## Components
//!
//! - [`MixinCatalog`] - descriptors loaded from a JSON or YAML manifest
//! - [`PayloadStore`] - decoded payloads for a working set, freed explicitly
//! - [`plan`] - groups a selection by module and orders it
//! - [`ModuleApplier`] - applies one plan entry to one module
//! - [`run_plan`] - applies a whole plan across workers
//! - [`Session`] - the load, plan, apply, free lifecycle in one place
//!
//! ## Example
//!
//! ```
//! use mixin_engine::payload::PayloadBuilder;
//! use mixin_engine::{
//!     MemoryBaseline, MemoryPayloadSource, MixinCatalog, MixinDescriptor, NullSink, OrderingClass,
//!     RunOptions, Selection, Session,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let catalog = MixinCatalog::from_descriptors(vec![
//!     MixinDescriptor::new("louder", "audio/bank.bin", "louder.mxpt"),
//!     MixinDescriptor::new("fix-crc", "audio/bank.bin", "fix-crc.mxpt")
//!         .with_ordering(OrderingClass::Finalizer),
//! ])?;
//!
//! let payloads = MemoryPayloadSource::new()
//!     .with("louder.mxpt", PayloadBuilder::new().write_checked(4, &[0x10], &[0x7F]).encode()?)
//!     .with(
//!         "fix-crc.mxpt",
//!         PayloadBuilder::finalizer()
//!             .checksum(mixin_engine::payload::ChecksumAlgorithm::Crc32, 4, u64::MAX, 0)
//!             .encode()?,
//!     );
//!
//! let session = Session::with_catalog(catalog, &payloads, Selection::All)?;
//! let baseline = MemoryBaseline::new().with("audio/bank.bin", vec![0, 0, 0, 0, 0x10, 0x20]);
//!
//! let out = tempfile::tempdir()?;
//! let report = session.run(&baseline, out.path(), &RunOptions::new().sequential(), &NullSink)?;
//! assert!(report.is_fully_successful());
//!
//! let written = std::fs::read(out.path().join("audio").join("bank.bin"))?;
//! assert_eq!(&written[4..], &[0x7F, 0x20]);
//! assert_eq!(&written[..4], &crc32fast::hash(&[0x7F, 0x20]).to_le_bytes());
//!
//! session.end();
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod applier;
pub mod baseline;
pub mod cancel;
pub mod catalog;
pub mod error;
pub mod failure;
pub mod ids;
pub mod payload;
pub mod planner;
pub mod runner;
pub mod session;
pub mod store;

pub use applier::{ApplyError, ModuleApplier, ModuleContext, ModuleOutput, PatchedModule};
pub use baseline::{BaselineSource, DirectoryBaseline, MemoryBaseline};
pub use cancel::CancellationToken;
pub use catalog::{
    MANIFEST_VERSION, Manifest, ManifestEntry, ManifestFile, ManifestSource, MixinCatalog,
    MixinDescriptor, OrderingClass, PayloadLocator,
};
pub use error::{Error, Result};
pub use failure::{Failure, FailureCause, FailureLog, FailureSink, NullSink};
pub use ids::{MixinId, ModuleId};
pub use payload::{EditError, EditOp, Payload, PayloadBuilder};
pub use planner::{ApplicationPlan, PlanEntry, PlanReport, plan, plan_with_sink};
pub use runner::{
    ModuleResult, ModuleStatus, RunOptions, RunOutcome, RunReport, run_plan, run_plan_with_progress,
};
pub use session::{Selection, Session};
pub use store::{
    DirectoryPayloadSource, LoadReport, MemoryPayloadSource, PayloadSource, PayloadStore,
};
