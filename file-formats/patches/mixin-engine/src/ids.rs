//! Identifiers for mixins and modules
//!
//! Module ids are paths relative to a baseline root. Manifests written on
//! Windows tend to use backslashes, so ids are normalized to forward slashes
//! on construction:
//!
//! ```
//! use mixin_engine::ModuleId;
//!
//! let a = ModuleId::new("DLC\\DLC_MP1\\Default.sfar");
//! let b = ModuleId::new("DLC/DLC_MP1/Default.sfar");
//! assert_eq!(a, b);
//! assert_eq!(a.file_name(), Some("Default.sfar"));
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Stable identity of a mixin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MixinId(String);

impl MixinId {
    /// Create a mixin id
    pub fn new<S: Into<String>>(id: S) -> Self {
        Self(id.into())
    }

    /// The id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MixinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for MixinId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MixinId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for MixinId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identity of a target module, a normalized path relative to the baseline root
///
/// An empty id is representable: it marks a descriptor whose target could not
/// be resolved, which the planner reports as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ModuleId(String);

impl ModuleId {
    /// Create a module id, normalizing separators
    pub fn new(raw: &str) -> Self {
        Self(normalize_module_path(raw))
    }

    /// The normalized id
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last path component, used as the module's canonical filename
    pub fn file_name(&self) -> Option<&str> {
        self.0.rsplit('/').next().filter(|name| !name.is_empty())
    }

    /// Convert to a relative filesystem path
    ///
    /// Fails for empty ids, absolute paths and ids that escape the root.
    pub fn relative_path(&self) -> Result<PathBuf> {
        relative_path(&self.0)
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ModuleId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for ModuleId {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<ModuleId> for String {
    fn from(id: ModuleId) -> Self {
        id.0
    }
}

/// Normalize a module path
///
/// Backslashes become forward slashes, surrounding whitespace and leading
/// `./` segments are dropped.
///
/// ```
/// use mixin_engine::ids::normalize_module_path;
///
/// assert_eq!(normalize_module_path("a\\b\\c.pcc"), "a/b/c.pcc");
/// assert_eq!(normalize_module_path("./a/b.pcc"), "a/b.pcc");
/// assert_eq!(normalize_module_path("  x.sfar "), "x.sfar");
/// ```
pub fn normalize_module_path(raw: &str) -> String {
    let mut path = raw.trim().replace('\\', "/");
    while let Some(rest) = path.strip_prefix("./") {
        path = rest.to_string();
    }
    path
}

/// Validate a slash-separated relative path and convert it for the host
pub(crate) fn relative_path(raw: &str) -> Result<PathBuf> {
    if raw.is_empty() {
        return Err(Error::invalid_module_id(raw, "empty path"));
    }
    if raw.starts_with('/') {
        return Err(Error::invalid_module_id(raw, "absolute path"));
    }

    let mut path = PathBuf::new();
    for component in raw.split('/') {
        match component {
            "" | "." => continue,
            ".." => return Err(Error::invalid_module_id(raw, "parent directory component")),
            c if c.contains(':') => {
                return Err(Error::invalid_module_id(raw, "drive or stream prefix"));
            }
            c => path.push(c),
        }
    }

    if path.as_os_str().is_empty() {
        return Err(Error::invalid_module_id(raw, "no file component"));
    }
    Ok(path)
}
