//! Mixin catalog and manifest loading
//!
//! The catalog is the enumerable set of [`MixinDescriptor`]s a session can
//! plan with. It is populated from a [`Manifest`], which any
//! [`ManifestSource`] can supply. [`ManifestFile`] reads JSON or YAML from
//! disk; fetching manifests from a remote package source is left to callers.
//!
//! ```
//! use mixin_engine::{Manifest, MixinCatalog, OrderingClass};
//!
//! # fn main() -> Result<(), mixin_engine::Error> {
//! let manifest = Manifest::from_yaml_str(r#"
//! version: 1
//! mixins:
//!   - id: shields
//!     target: DLC/MP1/Default.sfar
//!     payload: shields.mxpt
//!   - id: toc-fix
//!     target: DLC/MP1/Default.sfar
//!     ordering: finalizer
//!     payload: toc-fix.mxpt
//! "#)?;
//!
//! let catalog = MixinCatalog::from_manifest(manifest)?;
//! assert_eq!(catalog.len(), 2);
//! assert_eq!(catalog.get("toc-fix").unwrap().ordering, OrderingClass::Finalizer);
//! # Ok(())
//! # }
//! ```

use crate::{Error, MixinId, ModuleId, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

/// Highest manifest version this crate understands
pub const MANIFEST_VERSION: u32 = 1;

/// When a mixin runs relative to the other mixins of its module
///
/// The derived ordering is the application order: every `Normal` mixin of a
/// module runs before any `Finalizer`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum OrderingClass {
    /// Localized edits, applied in selection order
    #[default]
    Normal,
    /// Module-wide consistency repair, applied after all normal mixins
    Finalizer,
}

impl OrderingClass {
    /// Human readable name
    pub fn as_str(self) -> &'static str {
        match self {
            OrderingClass::Normal => "normal",
            OrderingClass::Finalizer => "finalizer",
        }
    }
}

/// Where a mixin's payload lives in a [`PayloadSource`](crate::PayloadSource)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PayloadLocator {
    /// Slash-separated path relative to the payload root
    pub path: String,
    /// Optional MD5 of the encoded payload, checked after fetching
    pub md5: Option<[u8; 16]>,
}

impl PayloadLocator {
    /// Locator without an integrity hash
    pub fn new<S: Into<String>>(path: S) -> Self {
        Self {
            path: path.into(),
            md5: None,
        }
    }

    /// Attach the expected MD5 of the encoded payload
    pub fn with_md5(mut self, md5: [u8; 16]) -> Self {
        self.md5 = Some(md5);
        self
    }
}

/// Metadata for one mixin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MixinDescriptor {
    /// Stable identity
    pub id: MixinId,
    /// Label key shown to users, falls back to the id
    pub name: Option<String>,
    /// Optional longer description
    pub description: Option<String>,
    /// Module this mixin patches
    pub target: ModuleId,
    /// Ordering class within the module
    pub ordering: OrderingClass,
    /// Mixins that must be applied earlier in the same module
    pub prerequisites: Vec<MixinId>,
    /// Payload location
    pub payload: PayloadLocator,
}

impl MixinDescriptor {
    /// Create a normal-class descriptor with no prerequisites
    pub fn new<I, P>(id: I, target: &str, payload: P) -> Self
    where
        I: Into<MixinId>,
        P: Into<String>,
    {
        Self {
            id: id.into(),
            name: None,
            description: None,
            target: ModuleId::new(target),
            ordering: OrderingClass::Normal,
            prerequisites: Vec::new(),
            payload: PayloadLocator::new(payload),
        }
    }

    /// Builder-style ordering class setter
    pub fn with_ordering(mut self, ordering: OrderingClass) -> Self {
        self.ordering = ordering;
        self
    }

    /// Builder-style prerequisite
    pub fn requires<I: Into<MixinId>>(mut self, prerequisite: I) -> Self {
        self.prerequisites.push(prerequisite.into());
        self
    }

    /// Whether this mixin is a finalizer
    pub fn is_finalizer(&self) -> bool {
        self.ordering == OrderingClass::Finalizer
    }

    /// Key used to look up a display label
    pub fn label_key(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.id.as_str())
    }
}

/// On-disk manifest document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version
    pub version: u32,
    /// Mixin records
    #[serde(default)]
    pub mixins: Vec<ManifestEntry>,
}

/// One mixin record in a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Mixin id
    pub id: String,
    /// Label key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Target module
    #[serde(default)]
    pub target: String,
    /// Explicit ordering class
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordering: Option<OrderingClass>,
    /// Legacy finalizer marker
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub finalizer: bool,
    /// Prerequisite mixin ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
    /// Payload path relative to the payload root
    pub payload: String,
    /// Hex MD5 of the encoded payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_md5: Option<String>,
}

impl Manifest {
    /// Parse a JSON manifest
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_manifest(e.to_string()))
    }

    /// Parse a YAML manifest
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml_ng::from_str(yaml).map_err(|e| Error::invalid_manifest(e.to_string()))
    }

    /// Read a manifest file, choosing the parser from the extension
    ///
    /// `.yaml` and `.yml` are parsed as YAML, anything else as JSON.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::from_yaml_str(&text)
            }
            _ => Self::from_json_str(&text),
        }
    }
}

impl ManifestEntry {
    fn into_descriptor(self) -> Result<MixinDescriptor> {
        if self.id.trim().is_empty() {
            return Err(Error::invalid_manifest("mixin with empty id"));
        }

        let ordering = match (self.ordering, self.finalizer) {
            (Some(OrderingClass::Normal), true) => {
                return Err(Error::invalid_manifest(format!(
                    "mixin '{}' is marked finalizer but declares ordering 'normal'",
                    self.id
                )));
            }
            (Some(ordering), _) => ordering,
            (None, true) => OrderingClass::Finalizer,
            (None, false) => OrderingClass::Normal,
        };

        let md5 = match self.payload_md5.as_deref() {
            None => None,
            Some(text) => Some(parse_md5(text).ok_or_else(|| {
                Error::invalid_manifest(format!(
                    "mixin '{}' has malformed payload_md5 '{text}'",
                    self.id
                ))
            })?),
        };

        Ok(MixinDescriptor {
            id: MixinId::new(self.id),
            name: self.name,
            description: self.description,
            target: ModuleId::new(&self.target),
            ordering,
            prerequisites: self.requires.into_iter().map(MixinId::new).collect(),
            payload: PayloadLocator {
                path: self.payload,
                md5,
            },
        })
    }
}

fn parse_md5(text: &str) -> Option<[u8; 16]> {
    let bytes = hex::decode(text.trim()).ok()?;
    bytes.try_into().ok()
}

/// Anything that can produce a manifest
///
/// This is the seam for remote package sources.
pub trait ManifestSource {
    /// Load the manifest document
    fn load_manifest(&self) -> Result<Manifest>;
}

impl ManifestSource for Manifest {
    fn load_manifest(&self) -> Result<Manifest> {
        Ok(self.clone())
    }
}

/// Manifest stored in a local JSON or YAML file
#[derive(Debug, Clone)]
pub struct ManifestFile {
    path: PathBuf,
}

impl ManifestFile {
    /// Manifest at `path`
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Path of the manifest file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ManifestSource for ManifestFile {
    fn load_manifest(&self) -> Result<Manifest> {
        log::debug!("Loading manifest from {}", self.path.display());
        Manifest::from_path(&self.path)
    }
}

/// The set of mixins available for planning
#[derive(Debug, Clone, Default)]
pub struct MixinCatalog {
    /// Descriptors in manifest order
    descriptors: Vec<MixinDescriptor>,
    /// Position of each id in `descriptors`
    index: HashMap<MixinId, usize>,
}

impl MixinCatalog {
    /// Load the catalog from a manifest source
    ///
    /// Failure here is fatal to the session.
    pub fn load(source: &dyn ManifestSource) -> Result<Self> {
        let catalog = Self::from_manifest(source.load_manifest()?)?;
        log::info!("Loaded catalog with {} mixins", catalog.len());
        Ok(catalog)
    }

    /// Build the catalog from a parsed manifest
    pub fn from_manifest(manifest: Manifest) -> Result<Self> {
        if manifest.version == 0 || manifest.version > MANIFEST_VERSION {
            return Err(Error::UnsupportedManifestVersion(manifest.version));
        }

        let descriptors = manifest
            .mixins
            .into_iter()
            .map(ManifestEntry::into_descriptor)
            .collect::<Result<Vec<_>>>()?;

        Self::from_descriptors(descriptors)
    }

    /// Build the catalog from descriptors, rejecting duplicate ids
    pub fn from_descriptors(descriptors: Vec<MixinDescriptor>) -> Result<Self> {
        let mut index = HashMap::with_capacity(descriptors.len());
        for (position, descriptor) in descriptors.iter().enumerate() {
            if index.insert(descriptor.id.clone(), position).is_some() {
                return Err(Error::DuplicateMixin(descriptor.id.to_string()));
            }
        }
        Ok(Self { descriptors, index })
    }

    /// Number of mixins
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the catalog is empty
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Look up a descriptor by id
    pub fn get(&self, id: &str) -> Option<&MixinDescriptor> {
        self.index.get(id).map(|&i| &self.descriptors[i])
    }

    /// Iterate descriptors in manifest order
    pub fn iter(&self) -> impl Iterator<Item = &MixinDescriptor> {
        self.descriptors.iter()
    }

    /// All ids in manifest order
    pub fn ids(&self) -> Vec<MixinId> {
        self.descriptors.iter().map(|d| d.id.clone()).collect()
    }

    /// Distinct target modules, sorted
    pub fn modules(&self) -> BTreeSet<&ModuleId> {
        self.descriptors.iter().map(|d| &d.target).collect()
    }

    /// Descriptors targeting `module`, in manifest order
    pub fn by_module<'a>(
        &'a self,
        module: &'a ModuleId,
    ) -> impl Iterator<Item = &'a MixinDescriptor> + 'a {
        self.descriptors.iter().filter(move |d| &d.target == module)
    }

    /// Resolve a caller selection, keeping the caller's order
    ///
    /// Ids listed twice are returned twice; the planner reports the repeat.
    pub fn select<I, S>(&self, ids: I) -> Result<Vec<&MixinDescriptor>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|id| {
                let id = id.as_ref();
                self.get(id)
                    .ok_or_else(|| Error::UnknownMixin(id.to_string()))
            })
            .collect()
    }
}
