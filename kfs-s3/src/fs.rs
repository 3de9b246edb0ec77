//! Filesystem instance
//!
//! An [`S3FileSystem`] binds one bucket on one endpoint under one
//! principal to configuration and a lazily constructed object-store
//! client. The provider registry holds at most one live instance per
//! identity key; closing detaches the instance and releases the client.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use kfs_core::{KfsError, KfsResult, S3Config, S3UriInfo};

use crate::client::S3Client;
use crate::path::S3Path;
use crate::provider::Registry;
use crate::store::ObjectStore;

pub struct S3FileSystem {
    info: S3UriInfo,
    identity: String,
    config: S3Config,
    registry: Weak<Registry>,
    store: Mutex<Option<Arc<dyn ObjectStore>>>,
    closed: AtomicBool,
}

impl S3FileSystem {
    pub(crate) fn new(
        info: S3UriInfo,
        config: S3Config,
        registry: Weak<Registry>,
    ) -> Arc<Self> {
        let identity = info.identity_key();
        Arc::new(Self {
            info,
            identity,
            config,
            registry,
            store: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// The bucket bound to this filesystem.
    pub fn bucket(&self) -> &str {
        &self.info.bucket
    }

    /// The identity key: `bucket`, `endpoint/bucket`, or
    /// `access-key@endpoint/bucket`.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    pub(crate) fn info(&self) -> &S3UriInfo {
        &self.info
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_open(&self) -> KfsResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(KfsError::Closed(format!(
                "filesystem '{}' is closed",
                self.identity
            )))
        }
    }

    /// Parse a path owned by this filesystem.
    pub fn path(self: &Arc<Self>, input: &str) -> S3Path {
        S3Path::parse(self.clone(), input)
    }

    /// The single root directory of the bound bucket.
    pub fn root(self: &Arc<Self>) -> S3Path {
        S3Path::root(self.clone())
    }

    /// The object-store client, constructed on first use from the
    /// configuration's endpoint, protocol, region, and credentials.
    pub(crate) fn store(&self) -> KfsResult<Arc<dyn ObjectStore>> {
        self.ensure_open()?;
        let mut slot = self.store.lock().expect("store slot poisoned");
        if let Some(store) = slot.as_ref() {
            return Ok(store.clone());
        }
        let client: Arc<dyn ObjectStore> = Arc::new(S3Client::new(&self.config)?);
        *slot = Some(client.clone());
        Ok(client)
    }

    #[cfg(test)]
    pub(crate) fn set_store(&self, store: Arc<dyn ObjectStore>) {
        *self.store.lock().expect("store slot poisoned") = Some(store);
    }

    /// Mark closed, detach from the provider registry, and release the
    /// client. Later operations on this filesystem fail with `Closed`.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(identity = %self.identity, "closing filesystem");
        if let Some(registry) = self.registry.upgrade() {
            registry.detach(&self.identity);
        }
        self.store.lock().expect("store slot poisoned").take();
    }
}

impl fmt::Debug for S3FileSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3FileSystem")
            .field("identity", &self.identity)
            .field("open", &self.is_open())
            .finish()
    }
}
