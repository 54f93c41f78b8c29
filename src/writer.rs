use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use flate2::{Compress, Compression, FlushCompress, Status};

use crate::error::CsoError;
use crate::progress::{NoProgress, ProgressSink, PROGRESS_INTERVAL};
use crate::structs::{CisoHeader, IndexTable};

/// High-level CSO writer.
///
/// This is a convenience API over [`CsoStreamWriter`]: it compresses a byte
/// slice in-memory and returns the full container as a `Vec<u8>`.
#[derive(Debug, Clone)]
pub struct CsoWriter {
    block_size: u32,
}

impl Default for CsoWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl CsoWriter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block_size: CisoHeader::DEFAULT_BLOCK_SIZE,
        }
    }

    /// Override the block size (defaults to 0x800, one ISO9660 sector).
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Compress `input` into a CSO container, returning the full file bytes.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is empty or if
    /// compression fails.
    pub fn write_to_vec(&self, input: &[u8]) -> Result<Vec<u8>, CsoError> {
        let mut out = Cursor::new(Vec::<u8>::new());
        let mut in_cur = Cursor::new(input);

        // Delegate to the streaming writer, using an in-memory Cursor as the output sink.
        let _ = CsoStreamWriter::new(&mut out)
            .with_block_size(self.block_size)
            .write_from_reader_seekable(&mut in_cur, &mut NoProgress)?;

        Ok(out.into_inner())
    }
}

/// Streaming CSO writer.
///
/// Unlike [`CsoWriter`] (which returns a `Vec<u8>`), this writes directly to
/// a seekable output. The index table is written twice: a zeroed placeholder
/// up front so block data can be appended at its final position, then the
/// real entries once every stored offset is known.
pub struct CsoStreamWriter<W: Write + Seek> {
    inner: W,
    block_size: u32,
}

impl<W: Write + Seek> CsoStreamWriter<W> {
    /// Create a new streaming CSO writer over a seekable output.
    pub const fn new(inner: W) -> Self {
        Self {
            inner,
            block_size: CisoHeader::DEFAULT_BLOCK_SIZE,
        }
    }

    /// Override the block size (defaults to 0x800).
    ///
    /// The reader already supports arbitrary block sizes.
    #[must_use]
    pub const fn with_block_size(mut self, block_size: u32) -> Self {
        self.block_size = block_size;
        self
    }

    /// Stream an image from a seekable reader, compress it into a CSO
    /// container, and return the output plus the final stored size.
    ///
    /// Each block is deflated in a single shot at best compression; a block
    /// whose deflate stream cannot complete within `block_size` output bytes
    /// is stored uncompressed and flagged in the index. Progress is reported
    /// to `progress` every 256 blocks and once at completion.
    ///
    /// A trailing partial block (input size not a multiple of `block_size`)
    /// is not representable in the index and is dropped from the output.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is empty or its size
    /// cannot be determined, if reading from `input` fails, if writing to the
    /// underlying output fails, or if a stored offset outgrows the 31 offset
    /// bits of an index entry. A failed run may leave a truncated container
    /// behind on the output.
    pub fn write_from_reader_seekable(
        mut self,
        input: &mut (impl Read + Seek),
        progress: &mut impl ProgressSink,
    ) -> Result<(W, u64), CsoError> {
        let file_size = input.seek(SeekFrom::End(0))?;
        input.seek(SeekFrom::Start(0))?;

        if file_size == 0 {
            return Err(CsoError::EmptySource);
        }
        if self.block_size == 0 {
            return Err(CsoError::InvalidHeader("Block size is zero".to_string()));
        }

        let header = CisoHeader::new(file_size, self.block_size);
        let total_blocks = header.total_blocks()?;
        let block_size = self.block_size as usize;

        #[cfg(feature = "logging")]
        {
            tracing::debug!(
                total_bytes = file_size,
                block_size = self.block_size,
                total_blocks,
                "compressing image to CSO"
            );
            if !file_size.is_multiple_of(u64::from(self.block_size)) {
                tracing::warn!(
                    dropped = file_size % u64::from(self.block_size),
                    "image size is not a multiple of the block size; trailing bytes will be dropped"
                );
            }
        }

        let mut index = IndexTable::new(total_blocks, header.align);

        // Header, then a provisional zeroed index; block data goes after it.
        let mut header_buf = [0u8; CisoHeader::SIZE];
        header.serialize(&mut header_buf)?;
        self.inner.seek(SeekFrom::Start(0))?;
        self.inner.write_all(&header_buf)?;
        index.write_to(&mut self.inner)?;

        let mut write_pos = CisoHeader::SIZE as u64 + index.byte_len();

        let mut plain_buf = vec![0u8; block_size];
        let mut comp_buf = vec![0u8; block_size];
        let mut deflate = Compress::new(Compression::best(), false);

        for block in 0..total_blocks {
            if block % PROGRESS_INTERVAL == 0 {
                progress.update(block, total_blocks, "Compressing...");
            }

            index.set_offset(block, write_pos)?;

            input.read_exact(&mut plain_buf)?;

            // One-shot raw deflate into a block-sized buffer. If the stream
            // does not end in this single call the block is incompressible at
            // this size; store it plain.
            deflate.reset();
            let finished = matches!(
                deflate.compress(&plain_buf, &mut comp_buf, FlushCompress::Finish),
                Ok(Status::StreamEnd)
            );

            let payload: &[u8] = if finished {
                &comp_buf[..deflate.total_out() as usize]
            } else {
                index.mark_plain(block);
                &plain_buf
            };

            self.inner.write_all(payload)?;
            write_pos += payload.len() as u64;
        }

        // End marker: total stored size, shifted like any other entry.
        index.set_offset(total_blocks, write_pos)?;

        progress.update(total_blocks, total_blocks, "Done!");

        // Patch the provisional index with the final offsets.
        self.inner.seek(SeekFrom::Start(CisoHeader::SIZE as u64))?;
        index.write_to(&mut self.inner)?;
        self.inner.seek(SeekFrom::End(0))?;

        #[cfg(feature = "logging")]
        tracing::info!(
            compressed_bytes = write_pos,
            ratio_percent = write_pos * 100 / file_size,
            "CSO compression completed"
        );

        Ok((self.inner, write_pos))
    }
}
