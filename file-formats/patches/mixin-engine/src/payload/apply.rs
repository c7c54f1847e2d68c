//! Edit application logic
//!
//! Operations are applied in declared order against a mutable working copy.
//! An error leaves the working copy partially edited; callers that need
//! all-or-nothing behaviour apply to a scratch copy (see
//! [`ModuleApplier`](crate::ModuleApplier)).

use super::Payload;
use super::ops::{END_OF_MODULE, EditOp};
use byteorder::{LittleEndian, ReadBytesExt};
use md5::{Digest, Md5};
use std::io::Cursor;
use std::ops::Range;
use thiserror::Error;

/// BSDIFF40 stream signature
const BSDIFF40_SIGNATURE: u64 = 0x3034_4646_4944_5342; // 'BSDIFF40'

/// Size of the BSDIFF40 header
const BSDIFF40_HEADER_SIZE: usize = 32;

/// Why an edit operation could not be applied
///
/// `op` is the zero-based index of the operation inside its payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// The targeted range lies outside the working copy
    #[error("op {op} ({name}): range 0x{offset:X}+{len} is outside the module ({size} bytes)")]
    OutOfRange {
        /// Operation index
        op: usize,
        /// Operation name
        name: &'static str,
        /// Start of the range
        offset: u64,
        /// Length of the range
        len: u64,
        /// Size of the working copy
        size: u64,
    },

    /// The current bytes differ from the declared pre-image
    #[error("op {op} ({name}): bytes at 0x{offset:X} do not match the expected pre-image")]
    PreimageMismatch {
        /// Operation index
        op: usize,
        /// Operation name
        name: &'static str,
        /// Start of the checked range
        offset: u64,
    },

    /// A whole-module replacement found an unexpected base
    #[error("op {op} (replace): {reason}")]
    BaseMismatch {
        /// Operation index
        op: usize,
        /// Details
        reason: String,
    },

    /// A BSDIFF40 stream is malformed or does not fit the module
    #[error("op {op} (bsdiff): {reason}")]
    InvalidStream {
        /// Operation index
        op: usize,
        /// Details
        reason: String,
    },

    /// A module-wide operation has inconsistent parameters
    #[error("op {op} ({name}): {reason}")]
    InvalidOperation {
        /// Operation index
        op: usize,
        /// Operation name
        name: &'static str,
        /// Details
        reason: String,
    },
}

impl Payload {
    /// Apply every operation in order to `working`
    ///
    /// Stops at the first failing operation, leaving earlier edits in place.
    pub fn apply(&self, working: &mut Vec<u8>) -> Result<(), EditError> {
        for (index, op) in self.ops().iter().enumerate() {
            log::trace!("Applying op {index}: {op}");
            apply_op(index, op, working)?;
        }
        Ok(())
    }
}

/// Apply a single operation
pub fn apply_op(index: usize, op: &EditOp, working: &mut Vec<u8>) -> Result<(), EditError> {
    let name = op.name();
    match op {
        EditOp::Write {
            offset,
            bytes,
            expected,
        } => {
            let range = checked_range(index, name, *offset, bytes.len() as u64, working.len())?;
            check_preimage(index, name, *offset, &working[range.clone()], expected.as_deref())?;
            working[range].copy_from_slice(bytes);
        }
        EditOp::Insert { offset, bytes } => {
            let at = checked_range(index, name, *offset, 0, working.len())?.start;
            working.splice(at..at, bytes.iter().copied());
        }
        EditOp::Delete {
            offset,
            len,
            expected,
        } => {
            let range = checked_range(index, name, *offset, u64::from(*len), working.len())?;
            check_preimage(index, name, *offset, &working[range.clone()], expected.as_deref())?;
            working.drain(range);
        }
        EditOp::Fill { offset, len, value } => {
            let range = checked_range(index, name, *offset, u64::from(*len), working.len())?;
            working[range].fill(*value);
        }
        EditOp::Replace {
            expected_size,
            expected_md5,
            bytes,
        } => {
            if working.len() as u64 != *expected_size {
                return Err(EditError::BaseMismatch {
                    op: index,
                    reason: format!(
                        "module size mismatch: expected {expected_size}, got {}",
                        working.len()
                    ),
                });
            }
            let actual: [u8; 16] = Md5::digest(working.as_slice()).into();
            if &actual != expected_md5 {
                return Err(EditError::BaseMismatch {
                    op: index,
                    reason: format!(
                        "module MD5 mismatch: expected {}, got {}",
                        hex::encode(expected_md5),
                        hex::encode(actual)
                    ),
                });
            }
            log::debug!(
                "Replacing module: {} -> {} bytes",
                working.len(),
                bytes.len()
            );
            working.clone_from(bytes);
        }
        EditOp::Bsdiff { stream } => {
            *working = apply_bsdiff(index, stream, working)?;
        }
        EditOp::Checksum {
            algorithm,
            start,
            end,
            store_at,
        } => {
            let span = checked_span(index, name, *start, *end, working.len())?;
            let store = checked_range(index, name, *store_at, 4, working.len())?;
            reject_overlap(index, name, &span, &store)?;
            let value = algorithm.compute(&working[span]);
            working[store].copy_from_slice(&value.to_le_bytes());
        }
        EditOp::LengthField { at, width } => {
            let len = working.len() as u64;
            let field = checked_range(index, name, *at, u64::from(*width), working.len())?;
            match width {
                4 => {
                    let value = u32::try_from(len).map_err(|_| EditError::InvalidOperation {
                        op: index,
                        name,
                        reason: format!("module length {len} does not fit a 4-byte field"),
                    })?;
                    working[field].copy_from_slice(&value.to_le_bytes());
                }
                8 => working[field].copy_from_slice(&len.to_le_bytes()),
                _ => {
                    return Err(EditError::InvalidOperation {
                        op: index,
                        name,
                        reason: format!("unsupported field width {width}"),
                    });
                }
            }
        }
        EditOp::Align { alignment, pad } => {
            let alignment = *alignment as usize;
            if alignment == 0 || !alignment.is_power_of_two() {
                return Err(EditError::InvalidOperation {
                    op: index,
                    name,
                    reason: format!("alignment {alignment} is not a power of two"),
                });
            }
            let padded = working.len().next_multiple_of(alignment);
            working.resize(padded, *pad);
        }
        EditOp::Digest {
            start,
            end,
            store_at,
        } => {
            let span = checked_span(index, name, *start, *end, working.len())?;
            let store = checked_range(index, name, *store_at, 16, working.len())?;
            reject_overlap(index, name, &span, &store)?;
            let digest: [u8; 16] = Md5::digest(&working[span]).into();
            working[store].copy_from_slice(&digest);
        }
    }
    Ok(())
}

/// Range `offset..offset + len`, which must lie within `size`
fn checked_range(
    op: usize,
    name: &'static str,
    offset: u64,
    len: u64,
    size: usize,
) -> Result<Range<usize>, EditError> {
    match offset.checked_add(len) {
        Some(end) if end <= size as u64 => Ok(offset as usize..end as usize),
        _ => Err(EditError::OutOfRange {
            op,
            name,
            offset,
            len,
            size: size as u64,
        }),
    }
}

/// Range `start..end` where `end` may be [`END_OF_MODULE`]
fn checked_span(
    op: usize,
    name: &'static str,
    start: u64,
    end: u64,
    size: usize,
) -> Result<Range<usize>, EditError> {
    let end = if end == END_OF_MODULE {
        size as u64
    } else {
        end
    };
    if start > end {
        return Err(EditError::InvalidOperation {
            op,
            name,
            reason: format!("range start 0x{start:X} is after its end 0x{end:X}"),
        });
    }
    checked_range(op, name, start, end - start, size)
}

fn reject_overlap(
    op: usize,
    name: &'static str,
    span: &Range<usize>,
    store: &Range<usize>,
) -> Result<(), EditError> {
    if store.start < span.end && span.start < store.end {
        return Err(EditError::InvalidOperation {
            op,
            name,
            reason: format!(
                "result field 0x{:X}..0x{:X} overlaps the covered range 0x{:X}..0x{:X}",
                store.start, store.end, span.start, span.end
            ),
        });
    }
    Ok(())
}

fn check_preimage(
    op: usize,
    name: &'static str,
    offset: u64,
    current: &[u8],
    expected: Option<&[u8]>,
) -> Result<(), EditError> {
    match expected {
        Some(expected) if expected != current => {
            Err(EditError::PreimageMismatch { op, name, offset })
        }
        _ => Ok(()),
    }
}

/// Apply a BSDIFF40 stream to `old`, returning the new module contents
///
/// Each 12-byte control record holds three little-endian u32 values: bytes to
/// add from the diff block onto the old data, bytes to copy from the extra
/// block, and a signed seek of the old cursor (sign in bit 31).
fn apply_bsdiff(op: usize, stream: &[u8], old: &[u8]) -> Result<Vec<u8>, EditError> {
    let invalid = |reason: String| EditError::InvalidStream { op, reason };

    if stream.len() < BSDIFF40_HEADER_SIZE {
        return Err(invalid(format!(
            "stream too small: {} bytes, need at least {BSDIFF40_HEADER_SIZE}",
            stream.len()
        )));
    }

    let (signature, ctrl_block_size, data_block_size, new_file_size) =
        read_bsdiff_header(stream).map_err(|e| invalid(e.to_string()))?;

    if signature != BSDIFF40_SIGNATURE {
        return Err(invalid(format!(
            "invalid signature: expected 0x{BSDIFF40_SIGNATURE:016X}, got 0x{signature:016X}"
        )));
    }

    let ctrl_start = BSDIFF40_HEADER_SIZE;
    let data_start = ctrl_start
        .checked_add(usize::try_from(ctrl_block_size).unwrap_or(usize::MAX))
        .filter(|&end| end <= stream.len());
    let Some(data_start) = data_start else {
        return Err(invalid(format!(
            "control block of {ctrl_block_size} bytes exceeds the stream"
        )));
    };
    let extra_start = data_start
        .checked_add(usize::try_from(data_block_size).unwrap_or(usize::MAX))
        .filter(|&end| end <= stream.len());
    let Some(extra_start) = extra_start else {
        return Err(invalid(format!(
            "diff block of {data_block_size} bytes exceeds the stream"
        )));
    };
    let new_file_size = usize::try_from(new_file_size)
        .map_err(|_| invalid(format!("new size {new_file_size} is not addressable")))?;

    let ctrl_block = &stream[ctrl_start..data_start];
    let data_block = &stream[data_start..extra_start];
    let extra_block = &stream[extra_start..];

    if ctrl_block.len() % 12 != 0 {
        return Err(invalid(format!(
            "control block size {} is not a multiple of 12",
            ctrl_block.len()
        )));
    }

    // Every output byte comes from the diff block or the extra block
    let max_new_size = data_block.len() + extra_block.len();
    if new_file_size > max_new_size {
        return Err(invalid(format!(
            "new size {new_file_size} exceeds the {max_new_size} bytes the stream can produce"
        )));
    }

    log::debug!(
        "BSDIFF40: {} -> {new_file_size} bytes (ctrl: {}, data: {}, extra: {})",
        old.len(),
        ctrl_block.len(),
        data_block.len(),
        extra_block.len()
    );

    let mut new_data = vec![0u8; new_file_size];
    let mut new_offset = 0usize;
    let mut old_offset = 0usize;
    let mut data_ptr = 0usize;
    let mut extra_ptr = 0usize;

    for (i, record) in ctrl_block.chunks_exact(12).enumerate() {
        let add_len = u32::from_le_bytes([record[0], record[1], record[2], record[3]]) as usize;
        let mov_len = u32::from_le_bytes([record[4], record[5], record[6], record[7]]) as usize;
        let seek_raw = u32::from_le_bytes([record[8], record[9], record[10], record[11]]);

        // Diff bytes are added onto the old data
        if new_offset + add_len > new_file_size {
            return Err(invalid(format!(
                "add overflow at ctrl {i}: {new_offset} + {add_len} > {new_file_size}"
            )));
        }
        if data_ptr + add_len > data_block.len() {
            return Err(invalid(format!(
                "diff block overflow at ctrl {i}: {data_ptr} + {add_len} > {}",
                data_block.len()
            )));
        }
        new_data[new_offset..new_offset + add_len]
            .copy_from_slice(&data_block[data_ptr..data_ptr + add_len]);
        data_ptr += add_len;

        let combine = add_len.min(old.len().saturating_sub(old_offset));
        for j in 0..combine {
            new_data[new_offset + j] = new_data[new_offset + j].wrapping_add(old[old_offset + j]);
        }
        new_offset += add_len;
        old_offset += add_len;

        // Extra bytes are copied verbatim
        if new_offset + mov_len > new_file_size {
            return Err(invalid(format!(
                "extra overflow at ctrl {i}: {new_offset} + {mov_len} > {new_file_size}"
            )));
        }
        if extra_ptr + mov_len > extra_block.len() {
            return Err(invalid(format!(
                "extra block overflow at ctrl {i}: {extra_ptr} + {mov_len} > {}",
                extra_block.len()
            )));
        }
        new_data[new_offset..new_offset + mov_len]
            .copy_from_slice(&extra_block[extra_ptr..extra_ptr + mov_len]);
        extra_ptr += mov_len;
        new_offset += mov_len;

        if seek_raw & 0x8000_0000 != 0 {
            let back = (seek_raw & 0x7FFF_FFFF) as usize;
            old_offset = old_offset.saturating_sub(back);
        } else {
            old_offset += seek_raw as usize;
        }
    }

    if new_offset != new_file_size {
        return Err(invalid(format!(
            "final offset mismatch: got {new_offset}, expected {new_file_size}"
        )));
    }

    Ok(new_data)
}

fn read_bsdiff_header(stream: &[u8]) -> std::io::Result<(u64, u64, u64, u64)> {
    let mut reader = Cursor::new(stream);
    Ok((
        reader.read_u64::<LittleEndian>()?,
        reader.read_u64::<LittleEndian>()?,
        reader.read_u64::<LittleEndian>()?,
        reader.read_u64::<LittleEndian>()?,
    ))
}
