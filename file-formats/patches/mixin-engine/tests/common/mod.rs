//! Common test utilities and fixtures

#![allow(dead_code)]

use mixin_engine::payload::PayloadBuilder;
use mixin_engine::{
    DirectoryBaseline, DirectoryPayloadSource, ManifestFile, MixinDescriptor, ModuleId,
    OrderingClass, PayloadStore,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Baseline, payload and output directories under one temp dir
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        for sub in ["baseline", "payloads", "out"] {
            fs::create_dir_all(dir.path().join(sub)).expect("Failed to create subdir");
        }
        Self { dir }
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.dir.path().join("baseline")
    }

    pub fn payload_dir(&self) -> PathBuf {
        self.dir.path().join("payloads")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join("out")
    }

    pub fn baseline(&self) -> DirectoryBaseline {
        DirectoryBaseline::new(self.baseline_dir())
    }

    pub fn payloads(&self) -> DirectoryPayloadSource {
        DirectoryPayloadSource::new(self.payload_dir())
    }

    /// Write a baseline module
    pub fn add_baseline(&self, module: &str, bytes: &[u8]) {
        write_file(&self.baseline_dir(), module, bytes);
    }

    /// Encode and write a payload file
    pub fn add_payload(&self, name: &str, builder: PayloadBuilder) {
        let bytes = builder.encode().expect("Failed to encode payload");
        write_file(&self.payload_dir(), name, &bytes);
    }

    /// Write raw payload bytes
    pub fn add_raw_payload(&self, name: &str, bytes: &[u8]) {
        write_file(&self.payload_dir(), name, bytes);
    }

    /// Write a YAML manifest and return a source for it
    pub fn write_manifest(&self, yaml: &str) -> ManifestFile {
        let path = self.dir.path().join("mixins.yaml");
        fs::write(&path, yaml).expect("Failed to write manifest");
        ManifestFile::new(path)
    }

    /// Write a JSON manifest and return a source for it
    pub fn write_json_manifest(&self, json: &str) -> ManifestFile {
        let path = self.dir.path().join("mixins.json");
        fs::write(&path, json).expect("Failed to write manifest");
        ManifestFile::new(path)
    }

    /// Path a module's output is written to
    pub fn output_path(&self, module: &str) -> PathBuf {
        self.output_dir()
            .join(ModuleId::new(module).relative_path().expect("valid module id"))
    }

    /// Output bytes of a module, if written
    pub fn output(&self, module: &str) -> Option<Vec<u8>> {
        fs::read(self.output_path(module)).ok()
    }

    /// Number of files under the output directory
    pub fn output_file_count(&self) -> usize {
        count_files(&self.output_dir())
    }
}

fn write_file(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(path, bytes).expect("Failed to write test file");
}

fn count_files(dir: &Path) -> usize {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| {
                    let path = e.path();
                    if path.is_dir() { count_files(&path) } else { 1 }
                })
                .sum()
        })
        .unwrap_or(0)
}

/// Generate test data of a specific size
pub fn generate_test_data(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

/// Normal-class descriptor with payload `<id>.mxpt`
pub fn normal(id: &str, module: &str) -> MixinDescriptor {
    MixinDescriptor::new(id, module, format!("{id}.mxpt"))
}

/// Finalizer-class descriptor with payload `<id>.mxpt`
pub fn finalizer(id: &str, module: &str) -> MixinDescriptor {
    normal(id, module).with_ordering(OrderingClass::Finalizer)
}

/// Store holding the built payload of each descriptor
pub fn store_with(entries: &[(&MixinDescriptor, PayloadBuilder)]) -> PayloadStore {
    let mut store = PayloadStore::new();
    for (descriptor, builder) in entries {
        let payload = builder.clone().build().expect("Failed to build payload");
        store.insert(descriptor.id.clone(), payload);
    }
    store
}
