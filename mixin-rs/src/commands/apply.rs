//! Applying a selection to baseline modules

use anyhow::{Context, Result, bail};
use clap::Args;
use console::style;
use mixin_engine::{
    DirectoryBaseline, Failure, ModuleContext, ModuleResult, ModuleStatus, RunOptions, RunOutcome,
    Session,
};
use std::path::PathBuf;

use super::{SelectionArgs, SourceArgs, open_session};
use crate::utils::{
    add_aligned_row, create_progress_bar, create_table, format_bytes, format_count, format_outcome,
};

#[derive(Args, Debug)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Directory holding the unmodified baseline modules
    #[arg(short, long, env = "MIXIN_BASELINE")]
    pub baseline: PathBuf,

    /// Output directory for patched modules
    #[arg(short, long)]
    pub output: PathBuf,

    /// Worker threads (0 = one per CPU, 1 = sequential)
    #[arg(short, long, env = "MIXIN_JOBS", default_value_t = 0)]
    pub jobs: usize,

    /// Module context as MODULE=NAME or MODULE=NAME:SUBDIR
    #[arg(long = "context", value_name = "SPEC", value_parser = parse_context)]
    pub contexts: Vec<(String, ModuleContext)>,

    /// Exit successfully when only some mixins applied
    #[arg(long)]
    pub allow_partial: bool,
}

/// Parse `MODULE=NAME[:SUBDIR]`
fn parse_context(spec: &str) -> Result<(String, ModuleContext), String> {
    let (module, rest) = spec
        .split_once('=')
        .ok_or_else(|| format!("expected MODULE=NAME[:SUBDIR], got '{spec}'"))?;
    if module.is_empty() {
        return Err(format!("missing module in '{spec}'"));
    }

    let context = match rest.split_once(':') {
        Some((name, subdir)) if !subdir.is_empty() => {
            ModuleContext::new(name).with_output_subdir(subdir)
        }
        Some((name, _)) => ModuleContext::new(name),
        None => ModuleContext::new(rest),
    };
    if context.name.is_empty() {
        return Err(format!("missing context name in '{spec}'"));
    }
    Ok((module.to_string(), context))
}

/// Modules the run will report on
///
/// Modules whose every mixin is rejected during planning never reach a worker.
fn planned_module_count(session: &Session) -> usize {
    session.plan().plan.len()
}

pub fn execute(args: ApplyArgs, quiet: bool) -> Result<()> {
    let session = open_session(&args.source, &args.selection)?;
    let baseline = DirectoryBaseline::new(&args.baseline);

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create output directory: {}", args.output.display()))?;

    let mut options = RunOptions::new().workers(args.jobs);
    for (module, context) in args.contexts {
        options = options.context(&module, context);
    }

    let pb = create_progress_bar(planned_module_count(&session) as u64, "Applying mixins", quiet);

    let report = session
        .run_with_progress(
            &baseline,
            &args.output,
            &options,
            &|failure: &Failure| pb.println(format!("  {} {failure}", style("!").yellow())),
            &|result: &ModuleResult| {
                pb.set_message(result.module.to_string());
                pb.inc(1);
            },
        )
        .context("Failed to run plan")?;
    pb.finish_and_clear();

    if !quiet {
        let mut table = create_table(vec!["Module", "Mixins", "Applied", "Status", "Size"]);
        for result in &report.modules {
            let (applied, status, size) = match &result.status {
                ModuleStatus::Written(output) => (
                    output.applied.len().to_string(),
                    "written".to_string(),
                    format_bytes(output.size),
                ),
                ModuleStatus::Failed(err) => ("0".to_string(), err.to_string(), String::new()),
                ModuleStatus::Cancelled => ("0".to_string(), "cancelled".to_string(), String::new()),
            };
            add_aligned_row(
                &mut table,
                vec![
                    result.module.to_string(),
                    result.mixins.len().to_string(),
                    applied,
                    status,
                    size,
                ],
                &[1, 2, 4],
            );
        }
        table.printstd();

        println!(
            "\n{} of {} applied, {} written to {}",
            report.applied_count(),
            format_count(report.attempted, "mixin"),
            format_count(report.written().count(), "module"),
            args.output.display()
        );
    }

    let freed = session.end();
    log::debug!("Released {freed} payloads");

    let outcome = report.outcome();
    match outcome {
        RunOutcome::Success => {
            if !quiet {
                println!("{}", style(format_outcome(outcome)).green().bold());
            }
            Ok(())
        }
        RunOutcome::PartialSuccess if args.allow_partial => {
            if !quiet {
                println!("{}", style(format_outcome(outcome)).yellow().bold());
            }
            Ok(())
        }
        _ => bail!(
            "Run finished with {}: {} failed",
            format_outcome(outcome),
            format_count(report.failed_mixins().len(), "mixin")
        ),
    }
}
