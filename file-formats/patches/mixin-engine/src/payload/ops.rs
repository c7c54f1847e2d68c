//! Edit operation records
//!
//! Each record starts with a kind byte. Kinds below `0x80` are localized
//! edits any payload may carry; kinds from `0x80` up operate over the whole
//! module and are only decoded for finalizer payloads.

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{Read, Write};

const KIND_WRITE: u8 = 0x01;
const KIND_INSERT: u8 = 0x02;
const KIND_DELETE: u8 = 0x03;
const KIND_FILL: u8 = 0x04;
const KIND_REPLACE: u8 = 0x05;
const KIND_BSDIFF: u8 = 0x06;
const KIND_CHECKSUM: u8 = 0x80;
const KIND_LENGTH_FIELD: u8 = 0x81;
const KIND_ALIGN: u8 = 0x82;
const KIND_DIGEST: u8 = 0x83;

/// Marks "until the end of the module" in range fields
pub const END_OF_MODULE: u64 = u64::MAX;

/// Checksum algorithm used by [`EditOp::Checksum`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    /// CRC-32 (IEEE)
    Crc32,
    /// Adler-32
    Adler32,
}

impl ChecksumAlgorithm {
    fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0 => Ok(ChecksumAlgorithm::Crc32),
            1 => Ok(ChecksumAlgorithm::Adler32),
            _ => Err(Error::invalid_payload(format!(
                "Unknown checksum algorithm: {byte}"
            ))),
        }
    }

    fn to_byte(self) -> u8 {
        match self {
            ChecksumAlgorithm::Crc32 => 0,
            ChecksumAlgorithm::Adler32 => 1,
        }
    }

    /// Compute the checksum of `data`
    pub fn compute(self, data: &[u8]) -> u32 {
        match self {
            ChecksumAlgorithm::Crc32 => crc32fast::hash(data),
            ChecksumAlgorithm::Adler32 => adler2::adler32_slice(data),
        }
    }
}

/// A single edit against a module's working copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOp {
    /// Overwrite bytes in place, optionally checking the current bytes first
    Write {
        /// Offset into the working copy
        offset: u64,
        /// Replacement bytes
        bytes: Vec<u8>,
        /// Expected current bytes, same length as `bytes`
        expected: Option<Vec<u8>>,
    },
    /// Splice bytes in, growing the module
    Insert {
        /// Insertion point, may equal the module length
        offset: u64,
        /// Inserted bytes
        bytes: Vec<u8>,
    },
    /// Remove a range, shrinking the module
    Delete {
        /// Start of the removed range
        offset: u64,
        /// Length of the removed range
        len: u32,
        /// Expected removed bytes
        expected: Option<Vec<u8>>,
    },
    /// Overwrite a range with one repeated byte
    Fill {
        /// Start of the range
        offset: u64,
        /// Length of the range
        len: u32,
        /// Fill value
        value: u8,
    },
    /// Replace the whole module after checking its size and MD5
    Replace {
        /// Expected size of the module before replacement
        expected_size: u64,
        /// Expected MD5 of the module before replacement
        expected_md5: [u8; 16],
        /// New module contents
        bytes: Vec<u8>,
    },
    /// Transform the whole module with a BSDIFF40 stream
    Bsdiff {
        /// Raw BSDIFF40 stream (header, control, diff and extra blocks)
        stream: Vec<u8>,
    },
    /// Recompute a checksum over a range and store it as little-endian u32
    Checksum {
        /// Algorithm
        algorithm: ChecksumAlgorithm,
        /// Start of the checksummed range
        start: u64,
        /// End of the range (exclusive), or [`END_OF_MODULE`]
        end: u64,
        /// Where the 4-byte result is written
        store_at: u64,
    },
    /// Store the module length as a little-endian integer
    LengthField {
        /// Offset of the field
        at: u64,
        /// Field width in bytes, 4 or 8
        width: u8,
    },
    /// Pad the module end to a multiple of `alignment`
    Align {
        /// Alignment, a power of two
        alignment: u32,
        /// Padding byte
        pad: u8,
    },
    /// Recompute an MD5 digest over a range and store its 16 bytes
    Digest {
        /// Start of the digested range
        start: u64,
        /// End of the range (exclusive), or [`END_OF_MODULE`]
        end: u64,
        /// Where the 16-byte digest is written
        store_at: u64,
    },
}

impl EditOp {
    /// Record kind byte
    pub fn kind(&self) -> u8 {
        match self {
            EditOp::Write { .. } => KIND_WRITE,
            EditOp::Insert { .. } => KIND_INSERT,
            EditOp::Delete { .. } => KIND_DELETE,
            EditOp::Fill { .. } => KIND_FILL,
            EditOp::Replace { .. } => KIND_REPLACE,
            EditOp::Bsdiff { .. } => KIND_BSDIFF,
            EditOp::Checksum { .. } => KIND_CHECKSUM,
            EditOp::LengthField { .. } => KIND_LENGTH_FIELD,
            EditOp::Align { .. } => KIND_ALIGN,
            EditOp::Digest { .. } => KIND_DIGEST,
        }
    }

    /// Whether this operation is reserved for finalizer payloads
    pub fn is_module_wide(&self) -> bool {
        self.kind() >= KIND_CHECKSUM
    }

    /// Short operation name
    pub fn name(&self) -> &'static str {
        match self {
            EditOp::Write { .. } => "write",
            EditOp::Insert { .. } => "insert",
            EditOp::Delete { .. } => "delete",
            EditOp::Fill { .. } => "fill",
            EditOp::Replace { .. } => "replace",
            EditOp::Bsdiff { .. } => "bsdiff",
            EditOp::Checksum { .. } => "checksum",
            EditOp::LengthField { .. } => "length-field",
            EditOp::Align { .. } => "align",
            EditOp::Digest { .. } => "digest",
        }
    }

    /// Decode one record
    ///
    /// `allow_module_wide` is only set when decoding a finalizer payload.
    pub fn decode<R: Read>(reader: &mut R, allow_module_wide: bool) -> Result<Self> {
        let kind = reader.read_u8()?;
        if kind >= KIND_CHECKSUM && !allow_module_wide {
            return Err(Error::invalid_payload(format!(
                "Operation kind 0x{kind:02X} is only allowed in finalizer payloads"
            )));
        }

        let op = match kind {
            KIND_WRITE => {
                let offset = reader.read_u64::<LittleEndian>()?;
                let bytes = read_block(reader)?;
                let expected = read_preimage(reader, bytes.len())?;
                EditOp::Write {
                    offset,
                    bytes,
                    expected,
                }
            }
            KIND_INSERT => {
                let offset = reader.read_u64::<LittleEndian>()?;
                let bytes = read_block(reader)?;
                EditOp::Insert { offset, bytes }
            }
            KIND_DELETE => {
                let offset = reader.read_u64::<LittleEndian>()?;
                let len = reader.read_u32::<LittleEndian>()?;
                let expected = read_preimage(reader, len as usize)?;
                EditOp::Delete {
                    offset,
                    len,
                    expected,
                }
            }
            KIND_FILL => EditOp::Fill {
                offset: reader.read_u64::<LittleEndian>()?,
                len: reader.read_u32::<LittleEndian>()?,
                value: reader.read_u8()?,
            },
            KIND_REPLACE => {
                let expected_size = reader.read_u64::<LittleEndian>()?;
                let mut expected_md5 = [0u8; 16];
                reader.read_exact(&mut expected_md5)?;
                let bytes = read_block(reader)?;
                EditOp::Replace {
                    expected_size,
                    expected_md5,
                    bytes,
                }
            }
            KIND_BSDIFF => EditOp::Bsdiff {
                stream: read_block(reader)?,
            },
            KIND_CHECKSUM => EditOp::Checksum {
                algorithm: ChecksumAlgorithm::from_byte(reader.read_u8()?)?,
                start: reader.read_u64::<LittleEndian>()?,
                end: reader.read_u64::<LittleEndian>()?,
                store_at: reader.read_u64::<LittleEndian>()?,
            },
            KIND_LENGTH_FIELD => {
                let at = reader.read_u64::<LittleEndian>()?;
                let width = reader.read_u8()?;
                if width != 4 && width != 8 {
                    return Err(Error::invalid_payload(format!(
                        "Length field width must be 4 or 8, got {width}"
                    )));
                }
                EditOp::LengthField { at, width }
            }
            KIND_ALIGN => {
                let alignment = reader.read_u32::<LittleEndian>()?;
                if !alignment.is_power_of_two() {
                    return Err(Error::invalid_payload(format!(
                        "Alignment must be a power of two, got {alignment}"
                    )));
                }
                EditOp::Align {
                    alignment,
                    pad: reader.read_u8()?,
                }
            }
            KIND_DIGEST => EditOp::Digest {
                start: reader.read_u64::<LittleEndian>()?,
                end: reader.read_u64::<LittleEndian>()?,
                store_at: reader.read_u64::<LittleEndian>()?,
            },
            _ => {
                return Err(Error::invalid_payload(format!(
                    "Unknown operation kind: 0x{kind:02X}"
                )));
            }
        };

        Ok(op)
    }

    /// Encode one record
    pub fn encode<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(self.kind())?;
        match self {
            EditOp::Write {
                offset,
                bytes,
                expected,
            } => {
                writer.write_u64::<LittleEndian>(*offset)?;
                write_block(writer, bytes)?;
                write_preimage(writer, expected.as_deref(), bytes.len())?;
            }
            EditOp::Insert { offset, bytes } => {
                writer.write_u64::<LittleEndian>(*offset)?;
                write_block(writer, bytes)?;
            }
            EditOp::Delete {
                offset,
                len,
                expected,
            } => {
                writer.write_u64::<LittleEndian>(*offset)?;
                writer.write_u32::<LittleEndian>(*len)?;
                write_preimage(writer, expected.as_deref(), *len as usize)?;
            }
            EditOp::Fill { offset, len, value } => {
                writer.write_u64::<LittleEndian>(*offset)?;
                writer.write_u32::<LittleEndian>(*len)?;
                writer.write_u8(*value)?;
            }
            EditOp::Replace {
                expected_size,
                expected_md5,
                bytes,
            } => {
                writer.write_u64::<LittleEndian>(*expected_size)?;
                writer.write_all(expected_md5)?;
                write_block(writer, bytes)?;
            }
            EditOp::Bsdiff { stream } => write_block(writer, stream)?,
            EditOp::Checksum {
                algorithm,
                start,
                end,
                store_at,
            } => {
                writer.write_u8(algorithm.to_byte())?;
                writer.write_u64::<LittleEndian>(*start)?;
                writer.write_u64::<LittleEndian>(*end)?;
                writer.write_u64::<LittleEndian>(*store_at)?;
            }
            EditOp::LengthField { at, width } => {
                writer.write_u64::<LittleEndian>(*at)?;
                writer.write_u8(*width)?;
            }
            EditOp::Align { alignment, pad } => {
                writer.write_u32::<LittleEndian>(*alignment)?;
                writer.write_u8(*pad)?;
            }
            EditOp::Digest {
                start,
                end,
                store_at,
            } => {
                writer.write_u64::<LittleEndian>(*start)?;
                writer.write_u64::<LittleEndian>(*end)?;
                writer.write_u64::<LittleEndian>(*store_at)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for EditOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditOp::Write {
                offset,
                bytes,
                expected,
            } => write!(
                f,
                "write {} bytes at 0x{offset:X}{}",
                bytes.len(),
                if expected.is_some() { " (checked)" } else { "" }
            ),
            EditOp::Insert { offset, bytes } => {
                write!(f, "insert {} bytes at 0x{offset:X}", bytes.len())
            }
            EditOp::Delete {
                offset,
                len,
                expected,
            } => write!(
                f,
                "delete {len} bytes at 0x{offset:X}{}",
                if expected.is_some() { " (checked)" } else { "" }
            ),
            EditOp::Fill { offset, len, value } => {
                write!(f, "fill {len} bytes at 0x{offset:X} with 0x{value:02X}")
            }
            EditOp::Replace {
                expected_size,
                bytes,
                ..
            } => write!(f, "replace {expected_size} bytes with {} bytes", bytes.len()),
            EditOp::Bsdiff { stream } => write!(f, "bsdiff stream of {} bytes", stream.len()),
            EditOp::Checksum {
                algorithm,
                start,
                end,
                store_at,
            } => write!(
                f,
                "{algorithm:?} of {} stored at 0x{store_at:X}",
                format_range(*start, *end)
            ),
            EditOp::LengthField { at, width } => {
                write!(f, "module length as u{} at 0x{at:X}", u32::from(*width) * 8)
            }
            EditOp::Align { alignment, pad } => {
                write!(f, "pad to {alignment}-byte boundary with 0x{pad:02X}")
            }
            EditOp::Digest {
                start,
                end,
                store_at,
            } => write!(
                f,
                "MD5 of {} stored at 0x{store_at:X}",
                format_range(*start, *end)
            ),
        }
    }
}

fn format_range(start: u64, end: u64) -> String {
    if end == END_OF_MODULE {
        format!("0x{start:X}..EOF")
    } else {
        format!("0x{start:X}..0x{end:X}")
    }
}

fn read_block<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut bytes = Vec::new();
    // take() bounds the allocation by what the reader actually holds
    reader.by_ref().take(len as u64).read_to_end(&mut bytes)?;
    if bytes.len() != len {
        return Err(Error::invalid_payload(format!(
            "Truncated data block: expected {len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn write_block<W: Write>(writer: &mut W, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len())
        .map_err(|_| Error::invalid_payload("Data block larger than 4 GiB"))?;
    writer.write_u32::<LittleEndian>(len)?;
    writer.write_all(bytes)?;
    Ok(())
}

fn read_preimage<R: Read>(reader: &mut R, expected_len: usize) -> Result<Option<Vec<u8>>> {
    let block = read_block(reader)?;
    match block.len() {
        0 => Ok(None),
        n if n == expected_len => Ok(Some(block)),
        n => Err(Error::invalid_payload(format!(
            "Pre-image length {n} does not match edit length {expected_len}"
        ))),
    }
}

fn write_preimage<W: Write>(writer: &mut W, preimage: Option<&[u8]>, len: usize) -> Result<()> {
    match preimage {
        None => write_block(writer, &[]),
        Some(bytes) if bytes.len() == len => write_block(writer, bytes),
        Some(bytes) => Err(Error::invalid_payload(format!(
            "Pre-image length {} does not match edit length {len}",
            bytes.len()
        ))),
    }
}
