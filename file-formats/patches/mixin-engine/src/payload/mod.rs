//! Mixin payload support
//!
//! A payload is the binary instruction set of one mixin, stored in the MXPT
//! format:
//!
//! 1. **Header** - magic, version, flags, operation count, body CRC32
//! 2. **Body** - `op_count` operation records, each led by a kind byte
//!
//! # Operation kinds
//!
//! Localized edits, allowed in every payload:
//!
//! - **Write** (`0x01`) - overwrite bytes, optional pre-image check
//! - **Insert** (`0x02`) - splice bytes in
//! - **Delete** (`0x03`) - remove a range, optional pre-image check
//! - **Fill** (`0x04`) - overwrite a range with one byte
//! - **Replace** (`0x05`) - swap the whole module after a size and MD5 check
//! - **Bsdiff** (`0x06`) - BSDIFF40 binary diff over the whole module
//!
//! Module-wide repair, only allowed in finalizer payloads:
//!
//! - **Checksum** (`0x80`) - CRC32 or Adler-32 over a range
//! - **LengthField** (`0x81`) - store the module length
//! - **Align** (`0x82`) - pad the module end
//! - **Digest** (`0x83`) - MD5 over a range
//!
//! Finalizer payloads carry the `FINALIZER` header flag and go through a
//! separate decode path that accepts module-wide kinds. The flag must agree
//! with the descriptor's ordering class.
//!
//! ```
//! use mixin_engine::payload::{Payload, PayloadBuilder};
//! use mixin_engine::OrderingClass;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = PayloadBuilder::new().fill(2, 2, 0xFF).encode()?;
//! let payload = Payload::decode(&bytes, OrderingClass::Normal)?;
//!
//! let mut module = vec![0u8; 6];
//! payload.apply(&mut module)?;
//! assert_eq!(module, [0, 0, 0xFF, 0xFF, 0, 0]);
//! # Ok(())
//! # }
//! ```

mod apply;
mod builder;
mod header;
mod ops;

pub use apply::{EditError, apply_op};
pub use builder::PayloadBuilder;
pub use header::{MXPT_SIGNATURE, MXPT_VERSION, PayloadFlags, PayloadHeader};
pub use ops::{ChecksumAlgorithm, END_OF_MODULE, EditOp};

use crate::catalog::OrderingClass;
use crate::{Error, Result};
use std::io::Cursor;

/// A decoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    ordering: OrderingClass,
    ops: Vec<EditOp>,
}

impl Payload {
    /// Create a payload from operations
    ///
    /// Normal payloads may not contain module-wide operations, and pre-images
    /// must match the length of the edit they guard.
    pub fn new(ordering: OrderingClass, ops: Vec<EditOp>) -> Result<Self> {
        for (index, op) in ops.iter().enumerate() {
            if op.is_module_wide() && ordering == OrderingClass::Normal {
                return Err(Error::invalid_payload(format!(
                    "Operation {index} ({}) is only allowed in finalizer payloads",
                    op.name()
                )));
            }
            let preimage_ok = match op {
                EditOp::Write {
                    bytes,
                    expected: Some(expected),
                    ..
                } => expected.len() == bytes.len(),
                EditOp::Delete {
                    len,
                    expected: Some(expected),
                    ..
                } => expected.len() == *len as usize,
                _ => true,
            };
            if !preimage_ok {
                return Err(Error::invalid_payload(format!(
                    "Operation {index} ({}) has a pre-image of the wrong length",
                    op.name()
                )));
            }
        }
        Ok(Self { ordering, ops })
    }

    /// Decode MXPT bytes for a mixin of the given ordering class
    pub fn decode(data: &[u8], ordering: OrderingClass) -> Result<Self> {
        let mut reader = Cursor::new(data);
        let header = PayloadHeader::parse(&mut reader)?;

        let body = &data[PayloadHeader::SIZE..];
        let actual = crc32fast::hash(body);
        if actual != header.body_crc32 {
            return Err(Error::ChecksumMismatch {
                expected: header.body_crc32,
                actual,
            });
        }

        let is_finalizer = ordering == OrderingClass::Finalizer;
        if header.is_finalizer() != is_finalizer {
            return Err(Error::invalid_payload(format!(
                "Payload flags say {} but the mixin is declared {}",
                if header.is_finalizer() {
                    "finalizer"
                } else {
                    "normal"
                },
                ordering.as_str()
            )));
        }

        let ops = if is_finalizer {
            decode_finalizer_ops(&mut reader, header.op_count)?
        } else {
            decode_edit_ops(&mut reader, header.op_count)?
        };

        let trailing = data.len() as u64 - reader.position();
        if trailing != 0 {
            return Err(Error::invalid_payload(format!(
                "{trailing} trailing bytes after {} operations",
                header.op_count
            )));
        }

        log::debug!(
            "Decoded {} payload with {} operations",
            ordering.as_str(),
            ops.len()
        );
        Ok(Self { ordering, ops })
    }

    /// Ordering class the payload was built for
    pub fn ordering(&self) -> OrderingClass {
        self.ordering
    }

    /// Operations in application order
    pub fn ops(&self) -> &[EditOp] {
        &self.ops
    }

    /// Total size of the literal data carried by the operations
    pub fn data_size(&self) -> usize {
        self.ops
            .iter()
            .map(|op| match op {
                EditOp::Write {
                    bytes, expected, ..
                } => bytes.len() + expected.as_ref().map_or(0, Vec::len),
                EditOp::Insert { bytes, .. } | EditOp::Replace { bytes, .. } => bytes.len(),
                EditOp::Delete { expected, .. } => expected.as_ref().map_or(0, Vec::len),
                EditOp::Bsdiff { stream } => stream.len(),
                _ => 0,
            })
            .sum()
    }
}

/// Decode path for normal payloads: localized edits only
fn decode_edit_ops(reader: &mut Cursor<&[u8]>, count: u32) -> Result<Vec<EditOp>> {
    let mut ops = Vec::new();
    for _ in 0..count {
        ops.push(EditOp::decode(reader, false)?);
    }
    Ok(ops)
}

/// Decode path for finalizer payloads: module-wide operations allowed
fn decode_finalizer_ops(reader: &mut Cursor<&[u8]>, count: u32) -> Result<Vec<EditOp>> {
    let mut ops = Vec::new();
    for _ in 0..count {
        let op = EditOp::decode(reader, true)?;
        if let EditOp::Checksum {
            start,
            end,
            store_at,
            ..
        }
        | EditOp::Digest {
            start,
            end,
            store_at,
        } = &op
        {
            if *end != END_OF_MODULE && start > end {
                return Err(Error::invalid_payload(format!(
                    "{} range 0x{start:X}..0x{end:X} is reversed",
                    op.name()
                )));
            }
            log::trace!("Finalizer {} stored at 0x{store_at:X}", op.name());
        }
        ops.push(op);
    }
    Ok(ops)
}
