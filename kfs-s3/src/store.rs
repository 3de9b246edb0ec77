//! Object store trait
//!
//! The seam between path-level filesystem logic and the wire. The reqwest
//! client in [`crate::client`] is the production implementation; tests
//! substitute an in-memory store.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use kfs_core::KfsResult;

use crate::attrs::ObjectAttributes;

/// One object row of a listing page.
#[derive(Debug, Clone)]
pub struct ListedObject {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// One page of a paginated listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ListedObject>,
    pub common_prefixes: Vec<String>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyOptions {
    pub replace_existing: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoveOptions {
    pub replace_existing: bool,
}

/// Asynchronous object operations against one storage service.
///
/// Every method maps to a single remote call. Absence is data here:
/// `head` reports a missing object as `Ok(None)` and `list_page` lists a
/// missing bucket or prefix as empty, so callers can distinguish
/// "not there" from a transport failure.
impl std::fmt::Debug for dyn ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn ObjectStore")
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Object metadata, or `None` when no such object exists.
    async fn head(&self, bucket: &str, key: &str) -> KfsResult<Option<ObjectAttributes>>;

    /// Read `length` bytes starting at `offset`. Returns fewer bytes only
    /// at the end of the object.
    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> KfsResult<Bytes>;

    /// Write a whole object, overwriting any previous content.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> KfsResult<()>;

    /// Delete an object. Idempotent: deleting an absent key succeeds.
    async fn delete(&self, bucket: &str, key: &str) -> KfsResult<()>;

    /// Server-side copy.
    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> KfsResult<()>;

    /// One page of `prefix`-scoped listing, grouped by `delimiter`.
    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> KfsResult<ListPage>;

    async fn bucket_exists(&self, bucket: &str) -> KfsResult<bool>;

    /// Create a bucket, optionally pinned to a location constraint.
    async fn create_bucket(&self, bucket: &str, location_constraint: Option<&str>)
        -> KfsResult<()>;
}
