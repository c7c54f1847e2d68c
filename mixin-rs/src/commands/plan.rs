//! Planning without applying

use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;

use super::{SelectionArgs, SourceArgs, open_session};
use crate::utils::{LabelTable, format_count};

#[derive(Args, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Label table used for display names
    #[arg(short, long)]
    pub labels: Option<PathBuf>,
}

pub fn execute(args: PlanArgs) -> Result<()> {
    let labels = LabelTable::load_optional(args.labels.as_deref())?;
    let session = open_session(&args.source, &args.selection)?;
    let report = session.plan();

    for entry in &report.plan {
        println!("{}", style(entry.module.as_str()).bold());
        for (position, descriptor) in entry.mixins.iter().enumerate() {
            let class = if descriptor.is_finalizer() {
                style(" [finalizer]").cyan().to_string()
            } else {
                String::new()
            };
            println!(
                "  {:>3}. {} ({}){class}",
                position + 1,
                descriptor.id,
                labels.label(descriptor)
            );
        }
    }

    let failures: Vec<_> = session
        .load_report()
        .failures
        .iter()
        .chain(report.failures.iter())
        .collect();

    if !failures.is_empty() {
        println!("\n{}", style("Rejected:").yellow().bold());
        for failure in &failures {
            println!("  {failure}");
        }
    }

    println!(
        "\n{} planned across {}, {} rejected",
        format_count(report.plan.mixin_count(), "mixin"),
        format_count(report.plan.len(), "module"),
        failures.len()
    );

    session.end();
    Ok(())
}
