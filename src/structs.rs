//! CISO header and index table structures

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

use crate::error::CsoError;

/// Index entry bit marking a block as stored uncompressed.
pub const PLAIN_BLOCK_FLAG: u32 = 0x8000_0000;

/// CISO file header (fixed 24-byte prefix of every CSO file)
#[repr(C)]
#[derive(Debug, Clone, BinRead, BinWrite)]
#[br(little)]
#[bw(little)]
pub struct CisoHeader {
    pub magic: [u8; 4],
    pub header_size: u32,
    /// Size of the original, decompressed image in bytes.
    pub total_bytes: u64,
    /// Size of one logical block (2048 for ISO9660 sectors).
    pub block_size: u32,
    pub version: u8,
    /// Shift applied to stored index values to recover real file offsets.
    pub align: u8,
    pub reserved: [u8; 2],
}

impl CisoHeader {
    /// Size of the CISO header in bytes
    pub const SIZE: usize = 0x18;

    /// Expected magic number for CISO files
    pub const MAGIC: [u8; 4] = *b"CISO";

    /// Format version written by this implementation
    pub const VERSION: u8 = 1;

    /// Block size written by this implementation (one ISO9660 sector)
    pub const DEFAULT_BLOCK_SIZE: u32 = 0x800;

    /// Create a header describing an image of `total_bytes` split into
    /// `block_size`-byte blocks. Written containers always use `align = 0`.
    #[must_use]
    pub const fn new(total_bytes: u64, block_size: u32) -> Self {
        Self {
            magic: Self::MAGIC,
            header_size: Self::SIZE as u32,
            total_bytes,
            block_size,
            version: Self::VERSION,
            align: 0,
            reserved: [0u8; 2],
        }
    }

    /// Parse a CISO header from a byte buffer
    pub fn parse(buffer: &[u8]) -> Result<Self, CsoError> {
        if buffer.len() < Self::SIZE {
            return Err(CsoError::InvalidHeader(format!(
                "Header too short: needed {}, got {}",
                Self::SIZE,
                buffer.len()
            )));
        }
        let mut cursor = std::io::Cursor::new(buffer);
        Self::read(&mut cursor)
            .map_err(|e| CsoError::InvalidHeader(format!("Failed to read CISO header: {e}")))
    }

    /// Validate header magic and size fields.
    ///
    /// `version` and the reserved bytes are deliberately not checked so that
    /// containers produced by other tools remain readable; `align` is honored
    /// as-is by the index table.
    pub fn validate(&self) -> Result<(), CsoError> {
        if self.magic != Self::MAGIC {
            return Err(CsoError::InvalidHeader(format!(
                "Invalid magic number: expected {:?}, got {:?}",
                Self::MAGIC,
                self.magic
            )));
        }
        if self.header_size != Self::SIZE as u32 {
            return Err(CsoError::InvalidHeader(format!(
                "Invalid header size: expected {:#x}, got {:#x}",
                Self::SIZE,
                self.header_size
            )));
        }
        if self.block_size == 0 {
            return Err(CsoError::InvalidHeader("Block size is zero".to_string()));
        }
        // 31-bit offsets shifted by 32 or more cannot describe a real file;
        // larger values would also overflow the u64 offset arithmetic.
        if self.align >= 32 {
            return Err(CsoError::InvalidHeader(format!(
                "Index align shift too large: {}",
                self.align
            )));
        }
        if self.total_bytes == 0 {
            return Err(CsoError::InvalidHeader("Total size is zero".to_string()));
        }
        Ok(())
    }

    /// Serialize the header into `buffer` (must be at least [`Self::SIZE`] bytes).
    pub fn serialize(&self, buffer: &mut [u8]) -> Result<(), CsoError> {
        if buffer.len() < Self::SIZE {
            return Err(CsoError::InvalidHeader(format!(
                "Header buffer too small: needed {}, got {}",
                Self::SIZE,
                buffer.len()
            )));
        }
        let mut cursor = std::io::Cursor::new(buffer);
        self.write(&mut cursor)
            .map_err(|e| CsoError::InvalidHeader(format!("Failed to write CISO header: {e}")))
    }

    /// Number of addressable blocks in the image.
    ///
    /// A trailing partial block below `block_size` bytes is not addressable
    /// by the format and is excluded.
    pub fn total_blocks(&self) -> Result<u32, CsoError> {
        u32::try_from(self.total_bytes / u64::from(self.block_size)).map_err(|_| {
            CsoError::InvalidHeader(format!(
                "Block count exceeds the 32-bit index ({} / {})",
                self.total_bytes, self.block_size
            ))
        })
    }
}

/// A single index table entry: bit 31 flags a plain (uncompressed) block,
/// the low 31 bits hold the stored byte offset shifted right by `align`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry(pub u32);

impl IndexEntry {
    #[must_use]
    pub const fn is_plain(self) -> bool {
        self.0 & PLAIN_BLOCK_FLAG != 0
    }

    /// Real byte offset of the block's stored data.
    #[must_use]
    pub const fn position(self, align: u8) -> u64 {
        ((self.0 & !PLAIN_BLOCK_FLAG) as u64) << align
    }
}

/// Ordered table of `total_blocks + 1` index entries; the final entry marks
/// the end of the last block's stored data.
#[derive(Debug, Clone)]
pub struct IndexTable {
    entries: Vec<u32>,
    align: u8,
}

impl IndexTable {
    /// Create a zeroed table for `total_blocks` blocks (writer side).
    #[must_use]
    pub fn new(total_blocks: u32, align: u8) -> Self {
        Self {
            entries: vec![0u32; total_blocks as usize + 1],
            align,
        }
    }

    /// Read a table of `total_blocks + 1` little-endian entries from `reader`.
    /// A short read is fatal.
    pub fn read_from<R: Read>(
        reader: &mut R,
        total_blocks: u32,
        align: u8,
    ) -> Result<Self, CsoError> {
        let mut entries = vec![0u32; total_blocks as usize + 1];
        reader.read_u32_into::<LittleEndian>(&mut entries)?;
        Ok(Self { entries, align })
    }

    /// Write all entries as little-endian words to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), CsoError> {
        for entry in &self.entries {
            writer.write_u32::<LittleEndian>(*entry)?;
        }
        Ok(())
    }

    /// Byte length of the serialized table.
    #[must_use]
    pub fn byte_len(&self) -> u64 {
        self.entries.len() as u64 * 4
    }

    #[must_use]
    pub fn entry(&self, block: u32) -> IndexEntry {
        IndexEntry(self.entries[block as usize])
    }

    /// Record the stored offset of `block`, clearing any flag bits.
    ///
    /// Fails if the shifted offset no longer fits the entry's 31 offset bits;
    /// the resulting container would be unreadable.
    pub fn set_offset(&mut self, block: u32, offset: u64) -> Result<(), CsoError> {
        let shifted = offset >> self.align;
        if shifted > u64::from(!PLAIN_BLOCK_FLAG) {
            return Err(CsoError::OffsetOverflow { block });
        }
        self.entries[block as usize] = shifted as u32;
        Ok(())
    }

    /// Set the plain-block flag on `block`'s entry.
    pub fn mark_plain(&mut self, block: u32) {
        self.entries[block as usize] |= PLAIN_BLOCK_FLAG;
    }

    /// Whether `block` is stored uncompressed.
    #[must_use]
    pub fn is_plain(&self, block: u32) -> bool {
        self.entry(block).is_plain()
    }

    /// Real byte offset of `block`'s stored data.
    #[must_use]
    pub fn position(&self, block: u32) -> u64 {
        self.entry(block).position(self.align)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let header = CisoHeader::new(0x10_0000, CisoHeader::DEFAULT_BLOCK_SIZE);
        let mut buf = [0u8; CisoHeader::SIZE];
        header.serialize(&mut buf).unwrap();

        assert_eq!(&buf[0..4], b"CISO");
        assert_eq!(buf[4], 0x18); // header_size, little-endian

        let parsed = CisoHeader::parse(&buf).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.total_bytes, 0x10_0000);
        assert_eq!(parsed.block_size, 0x800);
        assert_eq!(parsed.version, 1);
        assert_eq!(parsed.align, 0);
    }

    #[test]
    fn header_layout_is_fixed() {
        let header = CisoHeader::new(0x0123_4567_89AB_CDEF, 0x800);
        let mut buf = [0u8; CisoHeader::SIZE];
        header.serialize(&mut buf).unwrap();

        // total_bytes at +0x08, little-endian
        assert_eq!(
            &buf[0x08..0x10],
            &0x0123_4567_89AB_CDEFu64.to_le_bytes()[..]
        );
        // block_size at +0x10
        assert_eq!(&buf[0x10..0x14], &0x800u32.to_le_bytes()[..]);
        // version, align, reserved
        assert_eq!(&buf[0x14..0x18], &[1, 0, 0, 0]);
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let mut header = CisoHeader::new(0x800, 0x800);
        header.magic = *b"CSIO";
        assert!(matches!(
            header.validate(),
            Err(CsoError::InvalidHeader(_))
        ));

        let mut header = CisoHeader::new(0x800, 0x800);
        header.block_size = 0;
        assert!(header.validate().is_err());

        let header = CisoHeader::new(0, 0x800);
        assert!(header.validate().is_err());

        let mut header = CisoHeader::new(0x800, 0x800);
        header.header_size = 0x20;
        assert!(header.validate().is_err());

        let mut header = CisoHeader::new(0x800, 0x800);
        header.align = 32;
        assert!(header.validate().is_err());

        let mut header = CisoHeader::new(0x800, 0x800);
        header.align = 31;
        assert!(header.validate().is_ok());
    }

    #[test]
    fn index_entry_decodes_flag_and_offset() {
        let plain = IndexEntry(PLAIN_BLOCK_FLAG | 0x1000);
        assert!(plain.is_plain());
        assert_eq!(plain.position(0), 0x1000);
        assert_eq!(plain.position(2), 0x4000);

        let compressed = IndexEntry(0x1234);
        assert!(!compressed.is_plain());
        assert_eq!(compressed.position(0), 0x1234);
    }

    #[test]
    fn index_offset_overflow_is_rejected() {
        let mut table = IndexTable::new(1, 0);
        assert!(table.set_offset(0, 0x7FFF_FFFF).is_ok());
        assert!(matches!(
            table.set_offset(0, 0x8000_0000),
            Err(CsoError::OffsetOverflow { block: 0 })
        ));

        // With a nonzero align the same offset fits.
        let mut table = IndexTable::new(1, 1);
        assert!(table.set_offset(0, 0x8000_0000).is_ok());
        assert_eq!(table.entry(0).position(1), 0x8000_0000);
    }
}
