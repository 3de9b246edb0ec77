//! Write channel
//!
//! Collects bytes in memory and spills to an anonymous temporary file
//! once the buffer outgrows the threshold. Nothing touches the service
//! until `close`, which uploads the staged bytes as one object.

use std::sync::Arc;

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use kfs_core::{KfsError, KfsResult};

use crate::fs::S3FileSystem;
use crate::path::S3Path;
use crate::store::ObjectStore;

const SPILL_THRESHOLD: usize = 8 * 1024 * 1024;

pub struct WriteChannel {
    fs: Arc<S3FileSystem>,
    store: Arc<dyn ObjectStore>,
    key: String,
    buffer: Vec<u8>,
    spill: Option<File>,
    threshold: usize,
    written: u64,
    closed: bool,
}

impl WriteChannel {
    pub(crate) fn create(path: &S3Path) -> KfsResult<Self> {
        Self::with_threshold(path, SPILL_THRESHOLD)
    }

    pub(crate) fn with_threshold(path: &S3Path, threshold: usize) -> KfsResult<Self> {
        let fs = path.filesystem().clone();
        let store = fs.store()?;
        Ok(Self {
            store,
            key: path.to_key(),
            buffer: Vec::new(),
            spill: None,
            threshold,
            written: 0,
            closed: false,
            fs,
        })
    }

    /// Total bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    fn ensure_open(&self) -> KfsResult<()> {
        if self.closed {
            return Err(KfsError::Closed(format!(
                "write channel for '{}' is closed",
                self.key
            )));
        }
        self.fs.ensure_open()
    }

    /// Stage bytes for upload.
    pub async fn write(&mut self, data: &[u8]) -> KfsResult<usize> {
        self.ensure_open()?;

        if self.spill.is_none() && self.buffer.len() + data.len() > self.threshold {
            tracing::debug!(key = %self.key, staged = self.buffer.len(), "spilling to temporary file");
            let mut file = File::from_std(tempfile::tempfile()?);
            file.write_all(&self.buffer).await?;
            self.buffer = Vec::new();
            self.spill = Some(file);
        }

        match &mut self.spill {
            Some(file) => file.write_all(data).await?,
            None => self.buffer.extend_from_slice(data),
        }
        self.written += data.len() as u64;
        Ok(data.len())
    }

    /// Upload the staged bytes as one object and close the channel.
    pub async fn close(&mut self) -> KfsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.ensure_open()?;

        let data = match self.spill.take() {
            Some(mut file) => {
                file.flush().await?;
                file.seek(std::io::SeekFrom::Start(0)).await?;
                let mut staged = Vec::with_capacity(self.written as usize);
                file.read_to_end(&mut staged).await?;
                Bytes::from(staged)
            }
            None => Bytes::from(std::mem::take(&mut self.buffer)),
        };

        self.store
            .put(self.fs.bucket(), &self.key, data, None)
            .await?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_fs_with_store, MemoryStore};

    fn setup() -> (Arc<MemoryStore>, Arc<S3FileSystem>) {
        let store = Arc::new(MemoryStore::new());
        store.seed("demo", &[]);
        let fs = test_fs_with_store("demo", store.clone());
        (store, fs)
    }

    #[tokio::test]
    async fn uploads_buffered_bytes_on_close() {
        let (store, fs) = setup();
        let mut channel = WriteChannel::create(&fs.path("/out.txt")).unwrap();
        channel.write(b"hello ").await.unwrap();
        channel.write(b"world").await.unwrap();
        assert_eq!(channel.written(), 11);

        // Nothing uploaded until close.
        assert!(store.head("demo", "out.txt").await.unwrap().is_none());
        channel.close().await.unwrap();
        assert_eq!(store.data("demo", "out.txt"), b"hello world");
    }

    #[tokio::test]
    async fn spills_past_the_threshold() {
        let (store, fs) = setup();
        let mut channel = WriteChannel::with_threshold(&fs.path("/big.bin"), 8).unwrap();
        let body: Vec<u8> = (0..64u8).collect();
        for chunk in body.chunks(5) {
            channel.write(chunk).await.unwrap();
        }
        channel.close().await.unwrap();
        assert_eq!(store.data("demo", "big.bin"), body);
    }

    #[tokio::test]
    async fn empty_close_uploads_an_empty_object() {
        let (store, fs) = setup();
        let mut channel = WriteChannel::create(&fs.path("/empty")).unwrap();
        channel.close().await.unwrap();
        assert_eq!(store.data("demo", "empty"), b"");
    }

    #[tokio::test]
    async fn writes_after_close_fail() {
        let (_store, fs) = setup();
        let mut channel = WriteChannel::create(&fs.path("/done")).unwrap();
        channel.close().await.unwrap();
        assert!(channel.write(b"late").await.unwrap_err().is_closed());
        // A second close is a no-op.
        channel.close().await.unwrap();
    }

    #[tokio::test]
    async fn closing_the_filesystem_invalidates_the_channel() {
        let (_store, fs) = setup();
        let mut channel = WriteChannel::create(&fs.path("/stale")).unwrap();
        channel.write(b"data").await.unwrap();
        fs.close();
        assert!(channel.close().await.unwrap_err().is_closed());
    }
}
