//! Read channel
//!
//! Reads one object through a window of fixed-size fragments. Touching a
//! fragment that is not in the window schedules range requests for it and
//! for the following fragments, so sequential readers stay ahead of the
//! wire; the oldest fragment is evicted once the window is full.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use kfs_core::{KfsError, KfsResult};

use crate::fs::S3FileSystem;
use crate::path::S3Path;
use crate::store::ObjectStore;

#[derive(Debug)]
enum Fragment {
    Pending(JoinHandle<KfsResult<Bytes>>),
    Ready(Bytes),
}

#[derive(Debug)]
pub struct ReadChannel {
    fs: Arc<S3FileSystem>,
    store: Arc<dyn ObjectStore>,
    key: String,
    size: u64,
    position: u64,
    fragment_size: u64,
    max_fragments: usize,
    window: HashMap<u64, Fragment>,
    order: VecDeque<u64>,
    closed: bool,
}

impl ReadChannel {
    pub(crate) async fn open(path: &S3Path) -> KfsResult<Self> {
        let fs = path.filesystem().clone();
        let store = fs.store()?;
        let key = path.to_key();
        let Some(attrs) = store.head(fs.bucket(), &key).await? else {
            return Err(KfsError::NotFound(path.to_string()));
        };
        let config = fs.config();
        Ok(Self {
            store,
            key,
            size: attrs.size,
            position: 0,
            fragment_size: config.read_fragment_size() as u64,
            max_fragments: config.read_fragment_number(),
            window: HashMap::new(),
            order: VecDeque::new(),
            closed: false,
            fs,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position;
    }

    fn ensure_open(&self) -> KfsResult<()> {
        if self.closed {
            return Err(KfsError::Closed(format!(
                "read channel for '{}' is closed",
                self.key
            )));
        }
        self.fs.ensure_open()
    }

    /// Read at the current position and advance it. Returns 0 only at
    /// the end of the object.
    pub async fn read(&mut self, buf: &mut [u8]) -> KfsResult<usize> {
        let n = self.read_at(buf, self.position).await?;
        self.position += n as u64;
        Ok(n)
    }

    /// Read at an explicit position, leaving the channel position alone.
    /// One call stays within one fragment, so it may return fewer bytes
    /// than the buffer holds.
    pub async fn read_at(&mut self, buf: &mut [u8], position: u64) -> KfsResult<usize> {
        self.ensure_open()?;
        if buf.is_empty() || position >= self.size {
            return Ok(0);
        }

        let index = position / self.fragment_size;
        let fragment = self.fragment(index).await?;

        let offset = (position - index * self.fragment_size) as usize;
        let n = buf.len().min(fragment.len().saturating_sub(offset));
        buf[..n].copy_from_slice(&fragment[offset..offset + n]);
        Ok(n)
    }

    fn fragment_count(&self) -> u64 {
        self.size.div_ceil(self.fragment_size)
    }

    fn fragment_length(&self, index: u64) -> u64 {
        (self.size - index * self.fragment_size).min(self.fragment_size)
    }

    /// The fragment's bytes, fetching and read-ahead-scheduling as needed.
    async fn fragment(&mut self, index: u64) -> KfsResult<Bytes> {
        if !self.window.contains_key(&index) {
            let last = (index + self.max_fragments as u64).min(self.fragment_count());
            for ahead in index..last {
                self.schedule(ahead, index);
            }
        }

        if let Some(Fragment::Ready(bytes)) = self.window.get(&index) {
            return Ok(bytes.clone());
        }
        match self.window.remove(&index) {
            Some(Fragment::Pending(handle)) => {
                let bytes = handle
                    .await
                    .map_err(|e| KfsError::transport("read-ahead task failed", e))??;
                self.window.insert(index, Fragment::Ready(bytes.clone()));
                Ok(bytes)
            }
            Some(Fragment::Ready(bytes)) => {
                self.window.insert(index, Fragment::Ready(bytes.clone()));
                Ok(bytes)
            }
            None => Err(KfsError::transport_message(format!(
                "fragment {index} of '{}' was evicted while in use",
                self.key
            ))),
        }
    }

    fn schedule(&mut self, index: u64, needed: u64) {
        if self.window.contains_key(&index) {
            return;
        }
        self.evict_for(needed);

        let store = self.store.clone();
        let bucket = self.fs.bucket().to_string();
        let key = self.key.clone();
        let offset = index * self.fragment_size;
        let length = self.fragment_length(index);
        tracing::debug!(key = %self.key, index, offset, length, "scheduling fragment fetch");
        let handle = tokio::spawn(async move { store.get_range(&bucket, &key, offset, length).await });
        self.window.insert(index, Fragment::Pending(handle));
        self.order.push_back(index);
    }

    fn evict_for(&mut self, needed: u64) {
        while self.window.len() >= self.max_fragments {
            let Some(oldest) = self.order.pop_front() else {
                return;
            };
            if oldest == needed {
                self.order.push_back(oldest);
                if self.order.len() == 1 {
                    return;
                }
                continue;
            }
            if let Some(Fragment::Pending(handle)) = self.window.remove(&oldest) {
                handle.abort();
            }
        }
    }

    /// Abort any in-flight read-ahead and mark the channel closed.
    pub fn close(&mut self) {
        self.closed = true;
        for (_, fragment) in self.window.drain() {
            if let Fragment::Pending(handle) = fragment {
                handle.abort();
            }
        }
        self.order.clear();
    }
}

impl Drop for ReadChannel {
    fn drop(&mut self) {
        self.close();
    }
}
