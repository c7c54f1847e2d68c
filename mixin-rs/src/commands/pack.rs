//! Building payload files from a description
//!
//! ```yaml
//! ordering: normal
//! ops:
//!   - op: write
//!     offset: 0x40
//!     bytes: "10270000"
//!     expected: "00000000"
//!   - op: insert
//!     offset: 0
//!     bytes: "4d4f4421"
//!   - op: bsdiff
//!     file: tweak.bsdiff
//! ```
//!
//! Byte strings are hex. `file` paths are relative to the description.

use anyhow::{Context, Result, bail};
use clap::Args;
use mixin_engine::OrderingClass;
use mixin_engine::payload::{ChecksumAlgorithm, PayloadBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::utils::{format_bytes, format_count};

#[derive(Args, Debug)]
pub struct PackArgs {
    /// Payload description (.json, .yaml or .yml)
    pub description: PathBuf,

    /// Output payload file
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PayloadDescription {
    #[serde(default)]
    ordering: OrderingClass,
    ops: Vec<OpDescription>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum OpDescription {
    Write {
        offset: u64,
        bytes: String,
        expected: Option<String>,
    },
    Insert {
        offset: u64,
        bytes: String,
    },
    Delete {
        offset: u64,
        len: Option<u32>,
        expected: Option<String>,
    },
    Fill {
        offset: u64,
        len: u32,
        value: u8,
    },
    Replace {
        base_file: PathBuf,
        file: PathBuf,
    },
    Bsdiff {
        file: PathBuf,
    },
    Checksum {
        #[serde(default)]
        algorithm: Algorithm,
        start: u64,
        end: Option<u64>,
        store_at: u64,
    },
    LengthField {
        at: u64,
        width: u8,
    },
    Align {
        alignment: u32,
        #[serde(default)]
        pad: u8,
    },
    Digest {
        start: u64,
        end: Option<u64>,
        store_at: u64,
    },
}

#[derive(Debug, Default, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Algorithm {
    #[default]
    Crc32,
    Adler32,
}

impl From<Algorithm> for ChecksumAlgorithm {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Crc32 => ChecksumAlgorithm::Crc32,
            Algorithm::Adler32 => ChecksumAlgorithm::Adler32,
        }
    }
}

pub fn execute(args: PackArgs) -> Result<()> {
    let text = fs::read_to_string(&args.description).with_context(|| {
        format!("Failed to read description: {}", args.description.display())
    })?;
    let description = parse_description(&args.description, &text)?;
    let base_dir = args.description.parent().unwrap_or(Path::new("."));

    let op_count = description.ops.len();
    let bytes = build(description, base_dir)?
        .encode()
        .context("Failed to encode payload")?;

    fs::write(&args.output, &bytes)
        .with_context(|| format!("Failed to write payload: {}", args.output.display()))?;

    println!(
        "Wrote {} ({}, {})",
        args.output.display(),
        format_count(op_count, "operation"),
        format_bytes(bytes.len() as u64)
    );
    Ok(())
}

fn parse_description(path: &Path, text: &str) -> Result<PayloadDescription> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            serde_yaml_ng::from_str(text)
                .with_context(|| format!("Invalid YAML description: {}", path.display()))
        }
        _ => serde_json::from_str(text)
            .with_context(|| format!("Invalid JSON description: {}", path.display())),
    }
}

fn build(description: PayloadDescription, base_dir: &Path) -> Result<PayloadBuilder> {
    let mut builder = match description.ordering {
        OrderingClass::Normal => PayloadBuilder::new(),
        OrderingClass::Finalizer => PayloadBuilder::finalizer(),
    };

    for (index, op) in description.ops.into_iter().enumerate() {
        builder = add_op(builder, op, base_dir).with_context(|| format!("Operation {index}"))?;
    }
    Ok(builder)
}

fn add_op(builder: PayloadBuilder, op: OpDescription, base_dir: &Path) -> Result<PayloadBuilder> {
    let end_or_eof = |end: Option<u64>| end.unwrap_or(u64::MAX);

    Ok(match op {
        OpDescription::Write {
            offset,
            bytes,
            expected: None,
        } => builder.write(offset, &decode_hex(&bytes)?),
        OpDescription::Write {
            offset,
            bytes,
            expected: Some(expected),
        } => builder.write_checked(offset, &decode_hex(&expected)?, &decode_hex(&bytes)?),
        OpDescription::Insert { offset, bytes } => builder.insert(offset, &decode_hex(&bytes)?),
        OpDescription::Delete {
            offset,
            len,
            expected,
        } => match (len, expected) {
            (_, Some(expected)) => builder.delete_checked(offset, &decode_hex(&expected)?),
            (Some(len), None) => builder.delete(offset, len),
            (None, None) => bail!("delete needs 'len' or 'expected'"),
        },
        OpDescription::Fill { offset, len, value } => builder.fill(offset, len, value),
        OpDescription::Replace { base_file, file } => {
            let base = read_relative(base_dir, &base_file)?;
            let bytes = read_relative(base_dir, &file)?;
            builder.replace(&base, &bytes)
        }
        OpDescription::Bsdiff { file } => builder.bsdiff(&read_relative(base_dir, &file)?),
        OpDescription::Checksum {
            algorithm,
            start,
            end,
            store_at,
        } => builder.checksum(algorithm.into(), start, end_or_eof(end), store_at),
        OpDescription::LengthField { at, width } => builder.length_field(at, width),
        OpDescription::Align { alignment, pad } => builder.align(alignment, pad),
        OpDescription::Digest {
            start,
            end,
            store_at,
        } => builder.digest(start, end_or_eof(end), store_at),
    })
}

fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    hex::decode(&compact).with_context(|| format!("Invalid hex string '{text}'"))
}

fn read_relative(base_dir: &Path, path: &Path) -> Result<Vec<u8>> {
    let full = base_dir.join(path);
    fs::read(&full).with_context(|| format!("Failed to read {}", full.display()))
}
