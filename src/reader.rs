use std::io::{Read, Seek, SeekFrom, Write};

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::CsoError;
use crate::progress::{ProgressSink, PROGRESS_INTERVAL};
use crate::structs::{CisoHeader, IndexTable};

/// High-level, random-access CSO reader.
///
/// Opening a reader parses and validates the header, then loads the whole
/// index table; after that any block can be read without touching the ones
/// before it.
pub struct CsoReader<R: Read + Seek> {
    inner: R,
    header: CisoHeader,
    index: IndexTable,
    total_blocks: u32,
    inflate: Decompress,
    // Scratch for stored block payloads; grown on demand, bounded at
    // 2x block_size per block.
    stored_buf: Vec<u8>,
}

/// Upper bound on memory reserved up front from header-declared sizes.
/// Header fields are untrusted until the blocks behind them decode.
const MAX_PREALLOC: u64 = 1 << 24;

impl<R: Read + Seek> CsoReader<R> {
    /// Open a CSO container from a seekable reader.
    ///
    /// # Errors
    ///
    /// This function will return an error if the header is malformed (bad
    /// magic, bad header size, zero block size or total size) or if the
    /// header or index table cannot be read in full. The index table is not
    /// touched unless the header validates.
    pub fn open(mut inner: R) -> Result<Self, CsoError> {
        inner.seek(SeekFrom::Start(0))?;

        let mut header_buf = [0u8; CisoHeader::SIZE];
        inner.read_exact(&mut header_buf)?;

        let header = CisoHeader::parse(&header_buf)?;
        header.validate()?;

        let total_blocks = header.total_blocks()?;
        let index = IndexTable::read_from(&mut inner, total_blocks, header.align)?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            total_bytes = header.total_bytes,
            block_size = header.block_size,
            total_blocks,
            index_align = 1u32 << header.align,
            "opened CSO container"
        );

        Ok(Self {
            inner,
            header,
            index,
            total_blocks,
            inflate: Decompress::new(false),
            stored_buf: Vec::new(),
        })
    }

    pub const fn header(&self) -> &CisoHeader {
        &self.header
    }

    pub const fn index(&self) -> &IndexTable {
        &self.index
    }

    pub const fn total_bytes(&self) -> u64 {
        self.header.total_bytes
    }

    pub const fn block_size(&self) -> u32 {
        self.header.block_size
    }

    pub const fn block_count(&self) -> u32 {
        self.total_blocks
    }

    /// Read and decode one block into `out`, returning the number of bytes
    /// written (always `block_size`).
    ///
    /// Plain blocks are copied through unchanged; compressed blocks are
    /// inflated in a single shot and must decompress to exactly `block_size`
    /// bytes.
    ///
    /// # Errors
    ///
    /// This function will return an error if the block index is out of range,
    /// `out` is smaller than `block_size`, the index entry describes an
    /// impossible stored length, the stored payload cannot be read in full,
    /// or inflation fails or produces the wrong number of bytes.
    pub fn read_block(&mut self, block: u32, out: &mut [u8]) -> Result<usize, CsoError> {
        if block >= self.total_blocks {
            return Err(CsoError::InvalidHeader(
                "Block index out of range".to_string(),
            ));
        }

        let block_size = self.header.block_size as usize;
        if out.len() < block_size {
            return Err(CsoError::BufferTooSmall {
                needed: block_size,
                available: out.len(),
            });
        }

        let plain = self.index.is_plain(block);
        let offset = self.index.position(block);
        let stored_len = if plain {
            block_size as u64
        } else {
            self.index
                .position(block + 1)
                .checked_sub(offset)
                .ok_or_else(|| {
                    CsoError::InvalidHeader(format!("Index is not monotonic at block {block}"))
                })?
        };

        if stored_len > u64::from(self.header.block_size) * 2 {
            return Err(CsoError::InvalidHeader(format!(
                "Block {block}: stored size {stored_len} exceeds 2x block size"
            )));
        }
        let stored_len = stored_len as usize;
        if self.stored_buf.len() < stored_len {
            self.stored_buf.resize(stored_len, 0);
        }

        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(&mut self.stored_buf[..stored_len])?;

        if plain {
            out[..block_size].copy_from_slice(&self.stored_buf[..block_size]);
            return Ok(block_size);
        }

        self.inflate.reset(false);
        let status = self
            .inflate
            .decompress(
                &self.stored_buf[..stored_len],
                &mut out[..block_size],
                FlushDecompress::Finish,
            )
            .map_err(|e| CsoError::BlockInflate {
                block,
                reason: e.to_string(),
            })?;

        if !matches!(status, Status::StreamEnd) {
            return Err(CsoError::BlockInflate {
                block,
                reason: "stream did not end".to_string(),
            });
        }
        if self.inflate.total_out() != u64::from(self.header.block_size) {
            return Err(CsoError::BlockSizeMismatch {
                block,
                expected: self.header.block_size,
                actual: self.inflate.total_out(),
            });
        }

        Ok(block_size)
    }

    /// Decompress the whole container into `out`, in block order.
    ///
    /// Returns the number of image bytes written. One bad block fails the
    /// entire operation; whatever was already written to `out` stays there.
    ///
    /// # Errors
    ///
    /// This function will return an error if any block fails to read or
    /// decode, or if writing to `out` fails.
    pub fn decompress_to_writer<W: Write>(
        &mut self,
        mut out: W,
        progress: &mut impl ProgressSink,
    ) -> Result<u64, CsoError> {
        let block_size = self.header.block_size as usize;
        let mut block_buf = vec![0u8; block_size];
        let mut total_written: u64 = 0;

        for block in 0..self.total_blocks {
            if block % PROGRESS_INTERVAL == 0 {
                progress.update(block, self.total_blocks, "Decompressing...");
            }

            let n = self.read_block(block, &mut block_buf)?;
            out.write_all(&block_buf[..n])?;
            total_written += n as u64;
        }

        progress.update(self.total_blocks, self.total_blocks, "Done!");

        #[cfg(feature = "logging")]
        tracing::info!(image_bytes = total_written, "CSO decompression completed");

        Ok(total_written)
    }

    /// Convenience helper: decompress the whole image into a Vec.
    ///
    /// # Errors
    ///
    /// This function will return an error if decompression fails.
    pub fn decompress_to_vec(&mut self) -> Result<Vec<u8>, CsoError> {
        let mut buf = Vec::with_capacity(self.header.total_bytes.min(MAX_PREALLOC) as usize);
        self.decompress_to_writer(&mut buf, &mut crate::progress::NoProgress)?;
        Ok(buf)
    }

    /// Return the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}
