//! Display label tables
//!
//! A label table maps descriptor label keys to display strings. Keys without
//! an entry are shown raw.
//!
//! ```yaml
//! mixin.shields: Faster shield regeneration
//! mixin.ammo: Larger ammo capacity
//! ```

use anyhow::{Context, Result};
use mixin_engine::MixinDescriptor;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Label key to display string
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    labels: HashMap<String, String>,
}

impl LabelTable {
    /// Empty table, every key resolves to itself
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a table from a JSON or YAML file, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read label table: {}", path.display()))?;

        let labels = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                serde_yaml_ng::from_str(&text)
                    .with_context(|| format!("Invalid YAML label table: {}", path.display()))?
            }
            _ => serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON label table: {}", path.display()))?,
        };

        Ok(Self { labels })
    }

    /// Load `path` if given, otherwise an empty table
    pub fn load_optional(path: Option<&Path>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::new()), Self::load)
    }

    /// Add or replace a label
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, label: V) {
        self.labels.insert(key.into(), label.into());
    }

    /// Display string for `key`, falling back to the key itself
    pub fn resolve<'a>(&'a self, key: &'a str) -> &'a str {
        self.labels.get(key).map_or(key, String::as_str)
    }

    /// Display string for a descriptor
    pub fn label<'a>(&'a self, descriptor: &'a MixinDescriptor) -> &'a str {
        self.resolve(descriptor.label_key())
    }
}
