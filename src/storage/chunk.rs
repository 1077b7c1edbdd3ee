use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::Block;
use crate::utils::{IpfsError, Result};

pub const CHUNK_SIZE: usize = 256 * 1024; // 256KB leaves

/// Splits a byte stream into fixed-size raw blocks.
pub struct Chunker<R> {
    reader: R,
    chunk_size: usize,
    emitted: bool,
    done: bool,
}

impl<R: AsyncRead + Unpin> Chunker<R> {
    pub fn new(reader: R) -> Self {
        Self::with_size(reader, CHUNK_SIZE)
    }

    pub fn with_size(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
            emitted: false,
            done: false,
        }
    }

    /// Next full chunk, a short final chunk, or `None` at end of stream.
    /// An empty stream yields exactly one empty chunk.
    pub async fn next_chunk(&mut self) -> Result<Option<Block>> {
        if self.done {
            return Ok(None);
        }

        let mut data = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < self.chunk_size {
            let n = self
                .reader
                .read(&mut data[filled..])
                .await
                .map_err(|e| IpfsError::IoError(format!("Failed to read input: {}", e)))?;
            if n == 0 {
                self.done = true;
                break;
            }
            filled += n;
        }
        data.truncate(filled);

        if filled == 0 && self.emitted {
            return Ok(None);
        }

        self.emitted = true;
        Ok(Some(Block::raw(data)))
    }
}
