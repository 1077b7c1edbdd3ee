use std::io::SeekFrom;
use tokio_util::sync::CancellationToken;

use crate::storage::{DagService, LeafSpan};
use crate::utils::{IpfsError, Result, until_cancelled};

/// Random-access reader over a file DAG.
///
/// Leaves are fetched on demand and the most recent one is cached, so a
/// sequence of small reads costs one block load per leaf.
pub struct DagReader {
    dag: DagService,
    cancel: CancellationToken,
    leaves: Vec<LeafSpan>,
    size: u64,
    offset: u64,
    current: Option<(usize, Vec<u8>)>,
    closed: bool,
}

impl DagReader {
    pub async fn open(dag: DagService, cancel: CancellationToken, cid: &str) -> Result<Self> {
        let leaves = until_cancelled(&cancel, dag.leaves(&cancel, cid)).await?;
        let size = leaves.last().map(|l| l.offset + l.size).unwrap_or(0);

        Ok(Self {
            dag,
            cancel,
            leaves,
            size,
            offset: 0,
            current: None,
            closed: false,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(IpfsError::IoError("read on closed reader".to_string()));
        }
        Ok(())
    }

    /// Reads up to `buf.len()` bytes from the current offset, never crossing
    /// a leaf boundary. Returns 0 at or past the end.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.ensure_open()?;
        if buf.is_empty() || self.offset >= self.size {
            return Ok(0);
        }

        let index = self
            .leaves
            .partition_point(|leaf| leaf.offset + leaf.size <= self.offset);
        let leaf = self.leaves[index].clone();

        let cached = matches!(&self.current, Some((i, _)) if *i == index);
        if !cached {
            let block = until_cancelled(&self.cancel, self.dag.blocks().get(&leaf.hash)).await?;
            self.current = Some((index, block.data));
        }

        let data = match &self.current {
            Some((_, data)) => data,
            None => return Ok(0),
        };
        let start = (self.offset - leaf.offset) as usize;
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        self.offset += n as u64;
        Ok(n)
    }

    /// Seeking past the end is allowed; seeking before the start is not.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.ensure_open()?;
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::Current(delta) => self.offset.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size.checked_add_signed(delta),
        };

        let target = target.ok_or_else(|| {
            IpfsError::IoError(format!("invalid seek to {:?} from {}", pos, self.offset))
        })?;
        self.offset = target;
        Ok(target)
    }

    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let remaining = self.size.saturating_sub(self.offset) as usize;
        let mut out = Vec::with_capacity(remaining);
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }

    pub async fn read_to_string(&mut self) -> Result<String> {
        let bytes = self.read_to_end().await?;
        String::from_utf8(bytes)
            .map_err(|e| IpfsError::SerializationError(format!("content is not UTF-8: {}", e)))
    }

    pub fn close(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.closed = true;
        self.current = None;
        Ok(())
    }
}
