//! Patch payload store
//!
//! The store owns the decoded payloads of a working set of mixins. Payloads
//! are shared with applier workers as `Arc<Payload>` and never mutated after
//! loading. [`PayloadStore::free_payloads`] takes `&mut self`, so it cannot
//! run while any worker still borrows the store.

use crate::catalog::{MixinDescriptor, PayloadLocator};
use crate::failure::{Failure, FailureCause};
use crate::payload::Payload;
use crate::{Error, MixinId, Result};
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Supplies raw payload bytes
pub trait PayloadSource: Sync {
    /// Fetch the encoded payload at `locator`
    fn fetch(&self, locator: &PayloadLocator) -> io::Result<Vec<u8>>;

    /// Check that the source can be used at all
    ///
    /// An error here is fatal to the session.
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

/// Payloads stored as files under a root directory
#[derive(Debug, Clone)]
pub struct DirectoryPayloadSource {
    root: PathBuf,
}

impl DirectoryPayloadSource {
    /// Source rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PayloadSource for DirectoryPayloadSource {
    fn fetch(&self, locator: &PayloadLocator) -> io::Result<Vec<u8>> {
        let relative = crate::ids::relative_path(&crate::ids::normalize_module_path(&locator.path))
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        fs::read(self.root.join(relative))
    }

    fn check(&self) -> Result<()> {
        if self.root.is_dir() {
            Ok(())
        } else {
            Err(Error::PayloadSource(format!(
                "{} is not a directory",
                self.root.display()
            )))
        }
    }
}

/// Payloads held in memory, keyed by locator path
#[derive(Debug, Clone, Default)]
pub struct MemoryPayloadSource {
    payloads: HashMap<String, Vec<u8>>,
}

impl MemoryPayloadSource {
    /// Empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an encoded payload under `path`
    pub fn insert<S: Into<String>>(&mut self, path: S, bytes: Vec<u8>) {
        self.payloads.insert(path.into(), bytes);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with<S: Into<String>>(mut self, path: S, bytes: Vec<u8>) -> Self {
        self.insert(path, bytes);
        self
    }
}

impl PayloadSource for MemoryPayloadSource {
    fn fetch(&self, locator: &PayloadLocator) -> io::Result<Vec<u8>> {
        self.payloads.get(&locator.path).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no payload at '{}'", locator.path),
            )
        })
    }
}

/// Outcome of [`PayloadStore::load_payloads`]
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Mixins whose payload was fetched and decoded by this call
    pub loaded: Vec<MixinId>,
    /// Mixins that already had a cached payload
    pub cached: Vec<MixinId>,
    /// Mixins whose payload could not be loaded, one entry each
    pub failures: Vec<Failure>,
}

impl LoadReport {
    /// Whether `id` failed to load
    pub fn is_failed(&self, id: &MixinId) -> bool {
        self.failures
            .iter()
            .any(|failure| failure.mixin.as_ref() == Some(id))
    }
}

/// Owned cache of decoded payloads
#[derive(Debug, Default)]
pub struct PayloadStore {
    payloads: HashMap<MixinId, Arc<Payload>>,
    freed: bool,
}

impl PayloadStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch and decode payloads for every listed mixin not already cached
    ///
    /// Per-mixin problems become failures in the report. A mixin listed more
    /// than once is loaded and reported once. Only an unusable source is an
    /// error.
    pub fn load_payloads(
        &mut self,
        source: &dyn PayloadSource,
        mixins: &[&MixinDescriptor],
    ) -> Result<LoadReport> {
        source.check()?;
        self.freed = false;

        let mut report = LoadReport::default();
        let mut seen = std::collections::HashSet::new();

        for descriptor in mixins {
            if !seen.insert(&descriptor.id) {
                continue;
            }
            if self.payloads.contains_key(&descriptor.id) {
                report.cached.push(descriptor.id.clone());
                continue;
            }

            match load_one(source, descriptor) {
                Ok(payload) => {
                    log::debug!(
                        "Loaded payload for {} ({} ops)",
                        descriptor.id,
                        payload.ops().len()
                    );
                    self.payloads
                        .insert(descriptor.id.clone(), Arc::new(payload));
                    report.loaded.push(descriptor.id.clone());
                }
                Err(cause) => {
                    let failure = Failure::new(&descriptor.id, &descriptor.target, cause);
                    log::warn!("{failure}");
                    report.failures.push(failure);
                }
            }
        }

        log::info!(
            "Payload store: {} loaded, {} cached, {} failed",
            report.loaded.len(),
            report.cached.len(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Insert an already decoded payload
    pub fn insert(&mut self, id: MixinId, payload: Payload) {
        self.freed = false;
        self.payloads.insert(id, Arc::new(payload));
    }

    /// Cached payload for `id`
    pub fn get(&self, id: &MixinId) -> Option<Arc<Payload>> {
        self.payloads.get(id).cloned()
    }

    /// Cached payload for `id`, or the failure cause the applier records
    pub fn resolve(&self, id: &MixinId) -> std::result::Result<Arc<Payload>, FailureCause> {
        self.get(id).ok_or(FailureCause::PayloadUnavailable)
    }

    /// Whether a payload is cached for `id`
    pub fn contains(&self, id: &MixinId) -> bool {
        self.payloads.contains_key(id)
    }

    /// Number of cached payloads
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    /// Whether nothing is cached
    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    /// Release every cached payload, returning how many were dropped
    pub fn free_payloads(&mut self) -> usize {
        let count = self.payloads.len();
        self.payloads.clear();
        self.payloads.shrink_to_fit();
        self.freed = true;
        log::debug!("Freed {count} payloads");
        count
    }

    /// Whether [`free_payloads`](Self::free_payloads) ran since the last load
    pub fn is_freed(&self) -> bool {
        self.freed
    }
}

fn load_one(
    source: &dyn PayloadSource,
    descriptor: &MixinDescriptor,
) -> std::result::Result<Payload, FailureCause> {
    let bytes = source
        .fetch(&descriptor.payload)
        .map_err(|e| FailureCause::PayloadLoad(format!("{}: {e}", descriptor.payload.path)))?;

    if let Some(expected) = descriptor.payload.md5 {
        let actual: [u8; 16] = Md5::digest(&bytes).into();
        if actual != expected {
            return Err(FailureCause::PayloadLoad(format!(
                "MD5 mismatch: expected {}, got {}",
                hex::encode(expected),
                hex::encode(actual)
            )));
        }
    }

    Payload::decode(&bytes, descriptor.ordering).map_err(|e| FailureCause::PayloadLoad(e.to_string()))
}
