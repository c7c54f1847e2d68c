//! MXPT header parsing

use crate::{Error, Result};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic signature for the payload header
pub const MXPT_SIGNATURE: u32 = 0x5450_584D; // 'MXPT'

/// Payload format version written by [`PayloadBuilder`](super::PayloadBuilder)
pub const MXPT_VERSION: u16 = 1;

bitflags! {
    /// Payload header flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PayloadFlags: u16 {
        /// Payload belongs to a finalizer mixin and may contain module-wide operations
        const FINALIZER = 0x0001;
    }
}

/// Fixed-size header at the start of every payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    /// Format version
    pub version: u16,
    /// Header flags
    pub flags: PayloadFlags,
    /// Number of operation records in the body
    pub op_count: u32,
    /// CRC32 of the body (everything after the header)
    pub body_crc32: u32,
}

impl PayloadHeader {
    /// Header size in bytes
    pub const SIZE: usize = 16;

    /// Parse the header from a reader
    pub fn parse<R: Read>(reader: &mut R) -> Result<Self> {
        let signature = reader.read_u32::<LittleEndian>()?;
        if signature != MXPT_SIGNATURE {
            return Err(Error::invalid_payload(format!(
                "Invalid MXPT signature: expected 0x{MXPT_SIGNATURE:08X}, got 0x{signature:08X}"
            )));
        }

        let version = reader.read_u16::<LittleEndian>()?;
        if version == 0 || version > MXPT_VERSION {
            return Err(Error::UnsupportedVersion(version));
        }

        let raw_flags = reader.read_u16::<LittleEndian>()?;
        let flags = PayloadFlags::from_bits(raw_flags).ok_or_else(|| {
            Error::invalid_payload(format!("Unknown payload flags: 0x{raw_flags:04X}"))
        })?;

        let op_count = reader.read_u32::<LittleEndian>()?;
        let body_crc32 = reader.read_u32::<LittleEndian>()?;

        log::trace!(
            "MXPT header: version={version}, flags={flags:?}, ops={op_count}, crc=0x{body_crc32:08X}"
        );

        Ok(Self {
            version,
            flags,
            op_count,
            body_crc32,
        })
    }

    /// Write the header
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(MXPT_SIGNATURE)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u16::<LittleEndian>(self.flags.bits())?;
        writer.write_u32::<LittleEndian>(self.op_count)?;
        writer.write_u32::<LittleEndian>(self.body_crc32)?;
        Ok(())
    }

    /// Whether the finalizer flag is set
    pub fn is_finalizer(&self) -> bool {
        self.flags.contains(PayloadFlags::FINALIZER)
    }
}
