//! Command implementations

pub mod apply;
pub mod inspect;
pub mod list;
pub mod pack;
pub mod plan;

use anyhow::{Context, Result};
use clap::Args;
use mixin_engine::{DirectoryPayloadSource, ManifestFile, Selection, Session};
use std::path::PathBuf;

/// Where the manifest and payloads come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Mixin manifest (.json, .yaml or .yml)
    #[arg(short, long, env = "MIXIN_MANIFEST")]
    pub manifest: PathBuf,

    /// Directory holding the payload files
    #[arg(short, long, env = "MIXIN_PAYLOADS")]
    pub payloads: PathBuf,
}

/// Which mixins to work with
#[derive(Args, Debug, Clone, Default)]
pub struct SelectionArgs {
    /// Mixin ids in application order (comma separated or repeated)
    #[arg(short, long, value_delimiter = ',', conflicts_with = "all")]
    pub select: Vec<String>,

    /// Select every mixin in manifest order (the default)
    #[arg(long)]
    pub all: bool,
}

impl SelectionArgs {
    /// Engine selection for these arguments
    pub fn selection(&self) -> Selection {
        if self.all || self.select.is_empty() {
            Selection::All
        } else {
            Selection::only(self.select.iter().map(String::as_str))
        }
    }
}

/// Load the manifest and the selected payloads
pub fn open_session(source: &SourceArgs, selection: &SelectionArgs) -> Result<Session> {
    Session::start(
        &ManifestFile::new(&source.manifest),
        &DirectoryPayloadSource::new(&source.payloads),
        selection.selection(),
    )
    .with_context(|| {
        format!(
            "Failed to start session with manifest {} and payloads {}",
            source.manifest.display(),
            source.payloads.display()
        )
    })
}
