//! Directory streams
//!
//! A [`DirectoryStream`] enumerates the children of one directory prefix
//! lazily: pages are fetched from the service only when the consumer asks
//! for an entry past the buffered ones. The sequence is finite, single
//! pass, and not restartable.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::Stream;

use kfs_core::{KfsError, KfsResult};

use crate::fs::S3FileSystem;
use crate::path::S3Path;
use crate::store::ObjectStore;

/// Per-entry predicate; entries it rejects are dropped silently.
pub type PathFilter = Box<dyn Fn(&S3Path) -> bool + Send + Sync>;

pub struct DirectoryStream {
    fs: Arc<S3FileSystem>,
    prefix: String,
    filter: Option<PathFilter>,
    buffer: VecDeque<S3Path>,
    next_token: Option<String>,
    exhausted: bool,
    closed: bool,
}

impl DirectoryStream {
    pub(crate) fn new(dir: &S3Path, filter: Option<PathFilter>) -> KfsResult<Self> {
        if !dir.is_directory() {
            return Err(KfsError::InvalidArgument(format!(
                "'{dir}' is not a directory path"
            )));
        }
        Ok(Self {
            fs: dir.filesystem().clone(),
            prefix: dir.to_key(),
            filter,
            buffer: VecDeque::new(),
            next_token: None,
            exhausted: false,
            closed: false,
        })
    }

    /// The next child, or `None` once the listing is exhausted. A prefix
    /// that does not exist iterates empty rather than failing.
    pub async fn next_entry(&mut self) -> KfsResult<Option<S3Path>> {
        loop {
            if self.closed {
                return Err(KfsError::Closed("directory stream is closed".into()));
            }
            self.fs.ensure_open()?;

            if let Some(path) = self.buffer.pop_front() {
                match &self.filter {
                    Some(filter) if !filter(&path) => continue,
                    _ => return Ok(Some(path)),
                }
            }

            if self.exhausted {
                return Ok(None);
            }
            self.fetch_page().await?;
        }
    }

    async fn fetch_page(&mut self) -> KfsResult<()> {
        let store = self.fs.store()?;
        let page = store
            .list_page(
                self.fs.bucket(),
                &self.prefix,
                Some("/"),
                self.next_token.as_deref(),
            )
            .await?;
        tracing::debug!(
            prefix = %self.prefix,
            objects = page.objects.len(),
            prefixes = page.common_prefixes.len(),
            "fetched listing page"
        );

        for object in &page.objects {
            // The directory's own marker is not a child.
            if object.key == self.prefix {
                continue;
            }
            self.buffer
                .push_back(S3Path::from_key(self.fs.clone(), &object.key));
        }
        for common_prefix in &page.common_prefixes {
            self.buffer
                .push_back(S3Path::from_key(self.fs.clone(), common_prefix));
        }

        self.next_token = page.next_token;
        if self.next_token.is_none() {
            self.exhausted = true;
        }
        Ok(())
    }

    /// Stop the stream; later calls to `next_entry` fail with `Closed`.
    pub fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
    }

    /// Adapt to a `futures::Stream`. The stream ends after the first
    /// error instead of repeating it.
    pub fn into_stream(self) -> impl Stream<Item = KfsResult<S3Path>> + Send {
        futures::stream::unfold(self, |mut inner| async move {
            match inner.next_entry().await {
                Ok(Some(path)) => Some((Ok(path), inner)),
                Ok(None) => None,
                Err(e) if e.is_closed() => None,
                Err(e) => {
                    inner.exhausted = true;
                    inner.buffer.clear();
                    Some((Err(e), inner))
                }
            }
        })
    }
}
