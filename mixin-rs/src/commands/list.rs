//! Catalog listing

use anyhow::{Context, Result};
use clap::Args;
use glob::Pattern;
use mixin_engine::{ManifestFile, MixinCatalog, MixinDescriptor};
use std::path::PathBuf;

use crate::utils::{LabelTable, add_table_row, create_table, format_count};

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Mixin manifest (.json, .yaml or .yml)
    #[arg(short, long, env = "MIXIN_MANIFEST")]
    pub manifest: PathBuf,

    /// Label table used for display names
    #[arg(short, long)]
    pub labels: Option<PathBuf>,

    /// Only show mixins whose id or target matches this wildcard pattern
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Show descriptions and payload paths
    #[arg(long)]
    pub detailed: bool,
}

pub fn execute(args: ListArgs) -> Result<()> {
    let catalog = MixinCatalog::load(&ManifestFile::new(&args.manifest))
        .with_context(|| format!("Failed to load manifest: {}", args.manifest.display()))?;
    let labels = LabelTable::load_optional(args.labels.as_deref())?;
    let filter = args
        .filter
        .as_deref()
        .map(Pattern::new)
        .transpose()
        .context("Invalid filter pattern")?;

    let shown: Vec<&MixinDescriptor> = catalog
        .iter()
        .filter(|d| filter.as_ref().is_none_or(|p| matches(p, d)))
        .collect();

    if shown.is_empty() {
        println!("No mixins found");
        return Ok(());
    }

    let mut headers = vec!["ID", "Label", "Module", "Class", "Requires"];
    if args.detailed {
        headers.extend(["Payload", "Description"]);
    }
    let mut table = create_table(headers);

    for descriptor in &shown {
        let requires = descriptor
            .prerequisites
            .iter()
            .map(|id| id.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let mut row = vec![
            descriptor.id.to_string(),
            labels.label(descriptor).to_string(),
            descriptor.target.to_string(),
            descriptor.ordering.as_str().to_string(),
            requires,
        ];
        if args.detailed {
            row.push(descriptor.payload.path.clone());
            row.push(descriptor.description.clone().unwrap_or_default());
        }
        add_table_row(&mut table, row);
    }

    table.printstd();
    println!(
        "\n{} across {}",
        format_count(shown.len(), "mixin"),
        format_count(
            shown
                .iter()
                .map(|d| &d.target)
                .collect::<std::collections::BTreeSet<_>>()
                .len(),
            "module"
        )
    );
    Ok(())
}

fn matches(pattern: &Pattern, descriptor: &MixinDescriptor) -> bool {
    pattern.matches(descriptor.id.as_str()) || pattern.matches(descriptor.target.as_str())
}
