//! Payload construction

use super::header::{MXPT_VERSION, PayloadFlags, PayloadHeader};
use super::ops::{ChecksumAlgorithm, EditOp};
use super::Payload;
use crate::catalog::OrderingClass;
use crate::{Error, Result};
use md5::{Digest, Md5};

/// Builder for MXPT payloads
///
/// ```
/// use mixin_engine::payload::{Payload, PayloadBuilder};
/// use mixin_engine::OrderingClass;
///
/// # fn main() -> Result<(), mixin_engine::Error> {
/// let bytes = PayloadBuilder::new()
///     .write_checked(4, &[0x00, 0x00], &[0x10, 0x27])
///     .insert(0, b"HDR0")
///     .encode()?;
///
/// let payload = Payload::decode(&bytes, OrderingClass::Normal)?;
/// assert_eq!(payload.ops().len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    ordering: OrderingClass,
    ops: Vec<EditOp>,
}

impl PayloadBuilder {
    /// Builder for a normal payload
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder for a finalizer payload
    pub fn finalizer() -> Self {
        Self {
            ordering: OrderingClass::Finalizer,
            ops: Vec::new(),
        }
    }

    /// Append an arbitrary operation
    pub fn op(mut self, op: EditOp) -> Self {
        self.ops.push(op);
        self
    }

    /// Overwrite bytes without a pre-image check
    pub fn write(self, offset: u64, bytes: &[u8]) -> Self {
        self.op(EditOp::Write {
            offset,
            bytes: bytes.to_vec(),
            expected: None,
        })
    }

    /// Overwrite bytes after checking the current bytes
    pub fn write_checked(self, offset: u64, expected: &[u8], bytes: &[u8]) -> Self {
        self.op(EditOp::Write {
            offset,
            bytes: bytes.to_vec(),
            expected: Some(expected.to_vec()),
        })
    }

    /// Splice bytes in
    pub fn insert(self, offset: u64, bytes: &[u8]) -> Self {
        self.op(EditOp::Insert {
            offset,
            bytes: bytes.to_vec(),
        })
    }

    /// Remove a range without a pre-image check
    pub fn delete(self, offset: u64, len: u32) -> Self {
        self.op(EditOp::Delete {
            offset,
            len,
            expected: None,
        })
    }

    /// Remove a range after checking its bytes
    pub fn delete_checked(self, offset: u64, expected: &[u8]) -> Self {
        self.op(EditOp::Delete {
            offset,
            len: expected.len() as u32,
            expected: Some(expected.to_vec()),
        })
    }

    /// Overwrite a range with one byte value
    pub fn fill(self, offset: u64, len: u32, value: u8) -> Self {
        self.op(EditOp::Fill { offset, len, value })
    }

    /// Replace a whole module whose current contents are `base`
    pub fn replace(self, base: &[u8], bytes: &[u8]) -> Self {
        self.op(EditOp::Replace {
            expected_size: base.len() as u64,
            expected_md5: Md5::digest(base).into(),
            bytes: bytes.to_vec(),
        })
    }

    /// Apply a BSDIFF40 stream to the whole module
    pub fn bsdiff(self, stream: &[u8]) -> Self {
        self.op(EditOp::Bsdiff {
            stream: stream.to_vec(),
        })
    }

    /// Recompute a checksum over `start..end` into `store_at`
    pub fn checksum(self, algorithm: ChecksumAlgorithm, start: u64, end: u64, store_at: u64) -> Self {
        self.op(EditOp::Checksum {
            algorithm,
            start,
            end,
            store_at,
        })
    }

    /// Store the module length at `at`
    pub fn length_field(self, at: u64, width: u8) -> Self {
        self.op(EditOp::LengthField { at, width })
    }

    /// Pad the module to a multiple of `alignment`
    pub fn align(self, alignment: u32, pad: u8) -> Self {
        self.op(EditOp::Align { alignment, pad })
    }

    /// Recompute an MD5 digest over `start..end` into `store_at`
    pub fn digest(self, start: u64, end: u64, store_at: u64) -> Self {
        self.op(EditOp::Digest {
            start,
            end,
            store_at,
        })
    }

    /// Number of operations added so far
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether no operations were added
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Validate and produce the in-memory payload
    pub fn build(self) -> Result<Payload> {
        Payload::new(self.ordering, self.ops)
    }

    /// Encode to MXPT bytes
    pub fn encode(self) -> Result<Vec<u8>> {
        self.build()?.encode()
    }
}

impl Payload {
    /// Encode to MXPT bytes
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut body = Vec::new();
        for op in self.ops() {
            op.encode(&mut body)?;
        }

        let op_count = u32::try_from(self.ops().len())
            .map_err(|_| Error::invalid_payload("Too many operations"))?;
        let flags = match self.ordering() {
            OrderingClass::Normal => PayloadFlags::empty(),
            OrderingClass::Finalizer => PayloadFlags::FINALIZER,
        };
        let header = PayloadHeader {
            version: MXPT_VERSION,
            flags,
            op_count,
            body_crc32: crc32fast::hash(&body),
        };

        let mut bytes = Vec::with_capacity(PayloadHeader::SIZE + body.len());
        header.write(&mut bytes)?;
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }
}
