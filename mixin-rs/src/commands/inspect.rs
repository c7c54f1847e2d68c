//! Payload inspection

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use mixin_engine::OrderingClass;
use mixin_engine::payload::{Payload, PayloadHeader};
use std::fs;
use std::io::Cursor;
use std::path::PathBuf;

use crate::utils::{add_aligned_row, create_table, format_bytes};

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Payload file
    pub file: PathBuf,

    /// Try the payload against a module file without writing anything
    #[arg(long, value_name = "MODULE")]
    pub against: Option<PathBuf>,
}

pub fn execute(args: InspectArgs) -> Result<()> {
    let data = fs::read(&args.file)
        .with_context(|| format!("Failed to read payload: {}", args.file.display()))?;

    let header = PayloadHeader::parse(&mut Cursor::new(&data))
        .with_context(|| format!("Invalid payload header: {}", args.file.display()))?;
    let ordering = if header.is_finalizer() {
        OrderingClass::Finalizer
    } else {
        OrderingClass::Normal
    };
    let payload = Payload::decode(&data, ordering)
        .with_context(|| format!("Invalid payload: {}", args.file.display()))?;

    println!("Payload: {}", args.file.display());
    println!("  Version:    {}", header.version);
    println!("  Class:      {}", ordering.as_str());
    println!("  Operations: {}", header.op_count);
    println!("  Body CRC32: 0x{:08X}", header.body_crc32);
    println!("  Size:       {}", format_bytes(data.len() as u64));
    println!("  Data:       {}", format_bytes(payload.data_size() as u64));

    if !payload.ops().is_empty() {
        println!();
        let mut table = create_table(vec!["#", "Op", "Details"]);
        for (index, op) in payload.ops().iter().enumerate() {
            add_aligned_row(
                &mut table,
                vec![index.to_string(), op.name().to_string(), op.to_string()],
                &[0],
            );
        }
        table.printstd();
    }

    if let Some(module) = args.against {
        let mut working = fs::read(&module)
            .with_context(|| format!("Failed to read module: {}", module.display()))?;
        let before = working.len();
        match payload.apply(&mut working) {
            Ok(()) => println!(
                "\n{} applies cleanly to {} ({} -> {})",
                style("OK").green().bold(),
                module.display(),
                format_bytes(before as u64),
                format_bytes(working.len() as u64)
            ),
            Err(err) => anyhow::bail!("Payload does not apply to {}: {err}", module.display()),
        }
    }

    Ok(())
}
