//! Baseline module resolution
//!
//! The engine never validates where baseline bytes come from. Callers plug in
//! whatever backup lookup they have through [`BaselineSource`].

use crate::ModuleId;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maps a module id to its unmodified bytes
pub trait BaselineSource: Sync {
    /// Read the baseline bytes for `module`
    fn read_module(&self, module: &ModuleId) -> io::Result<Vec<u8>>;
}

/// Baseline modules stored under a root directory, such as a clean game
/// installation or backup copy
#[derive(Debug, Clone)]
pub struct DirectoryBaseline {
    root: PathBuf,
}

impl DirectoryBaseline {
    /// Baseline rooted at `root`
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of a module's baseline file
    pub fn module_path(&self, module: &ModuleId) -> io::Result<PathBuf> {
        let relative = module
            .relative_path()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        Ok(self.root.join(relative))
    }
}

impl BaselineSource for DirectoryBaseline {
    fn read_module(&self, module: &ModuleId) -> io::Result<Vec<u8>> {
        let path = self.module_path(module)?;
        log::debug!("Reading baseline {}", path.display());
        fs::read(path)
    }
}

/// Baseline modules held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryBaseline {
    modules: HashMap<ModuleId, Vec<u8>>,
}

impl MemoryBaseline {
    /// Empty baseline
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module
    pub fn insert(&mut self, module: &str, bytes: Vec<u8>) {
        self.modules.insert(ModuleId::new(module), bytes);
    }

    /// Builder-style [`insert`](Self::insert)
    pub fn with(mut self, module: &str, bytes: Vec<u8>) -> Self {
        self.insert(module, bytes);
        self
    }
}

impl BaselineSource for MemoryBaseline {
    fn read_module(&self, module: &ModuleId) -> io::Result<Vec<u8>> {
        self.modules.get(module).cloned().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no baseline for module '{module}'"),
            )
        })
    }
}
