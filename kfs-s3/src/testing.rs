//! In-memory test doubles
//!
//! A [`MemoryStore`] stands in for the wire client behind the
//! [`ObjectStore`] seam, with a configurable page size so pagination
//! paths run in tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use kfs_core::{KfsError, KfsResult, S3Config, S3UriInfo};

use crate::attrs::ObjectAttributes;
use crate::fs::S3FileSystem;
use crate::store::{ListPage, ListedObject, ObjectStore};

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: Option<String>,
}

pub(crate) struct MemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, StoredObject>>>,
    page_size: usize,
}

impl MemoryStore {
    pub(crate) fn new() -> Self {
        Self::with_page_size(1000)
    }

    pub(crate) fn with_page_size(page_size: usize) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            page_size,
        }
    }

    pub(crate) fn seed(&self, bucket: &str, objects: &[(&str, &str)]) {
        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(bucket.to_string()).or_default();
        for (key, body) in objects {
            bucket.insert(
                key.to_string(),
                StoredObject {
                    data: Bytes::copy_from_slice(body.as_bytes()),
                    content_type: None,
                },
            );
        }
    }

    pub(crate) fn seed_bytes(&self, bucket: &str, key: &str, body: &[u8]) {
        let mut buckets = self.buckets.lock().unwrap();
        buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            StoredObject {
                data: Bytes::copy_from_slice(body),
                content_type: None,
            },
        );
    }

    /// Stored bytes of one object; panics when absent.
    pub(crate) fn data(&self, bucket: &str, key: &str) -> Vec<u8> {
        self.buckets.lock().unwrap()[bucket][key].data.to_vec()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn head(&self, bucket: &str, key: &str) -> KfsResult<Option<ObjectAttributes>> {
        let buckets = self.buckets.lock().unwrap();
        let Some(object) = buckets.get(bucket).and_then(|b| b.get(key)) else {
            return Ok(None);
        };
        Ok(Some(ObjectAttributes {
            size: object.data.len() as u64,
            last_modified: Some(Utc::now()),
            etag: Some(format!("etag-{}", object.data.len())),
            content_type: object.content_type.clone(),
            directory: key.ends_with('/'),
        }))
    }

    async fn get_range(
        &self,
        bucket: &str,
        key: &str,
        offset: u64,
        length: u64,
    ) -> KfsResult<Bytes> {
        let buckets = self.buckets.lock().unwrap();
        let Some(object) = buckets.get(bucket).and_then(|b| b.get(key)) else {
            return Err(KfsError::NotFound(key.to_string()));
        };
        let len = object.data.len() as u64;
        if offset >= len || length == 0 {
            return Ok(Bytes::new());
        }
        let end = (offset + length).min(len);
        Ok(object.data.slice(offset as usize..end as usize))
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> KfsResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let Some(bucket) = buckets.get_mut(bucket) else {
            return Err(KfsError::NotFound(format!("bucket '{bucket}'")));
        };
        bucket.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(String::from),
            },
        );
        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> KfsResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        if let Some(bucket) = buckets.get_mut(bucket) {
            bucket.remove(key);
        }
        Ok(())
    }

    async fn copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> KfsResult<()> {
        let mut buckets = self.buckets.lock().unwrap();
        let object = buckets
            .get(src_bucket)
            .and_then(|b| b.get(src_key))
            .cloned()
            .ok_or_else(|| KfsError::NotFound(src_key.to_string()))?;
        let Some(dst) = buckets.get_mut(dst_bucket) else {
            return Err(KfsError::NotFound(format!("bucket '{dst_bucket}'")));
        };
        dst.insert(dst_key.to_string(), object);
        Ok(())
    }

    async fn list_page(
        &self,
        bucket: &str,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
    ) -> KfsResult<ListPage> {
        let buckets = self.buckets.lock().unwrap();
        let Some(bucket) = buckets.get(bucket) else {
            return Ok(ListPage::default());
        };

        enum Row {
            Object(ListedObject),
            Prefix(String),
        }

        let mut rows: Vec<(String, Row)> = Vec::new();
        let mut rolled = std::collections::BTreeSet::new();
        for (key, object) in bucket.range(prefix.to_string()..) {
            if !key.starts_with(prefix) {
                break;
            }
            let rest = &key[prefix.len()..];
            if let Some(delimiter) = delimiter {
                // The marker for the listed prefix itself has an empty
                // remainder and stays a plain object row.
                if let Some(at) = rest.find(delimiter) {
                    let common = format!("{prefix}{}", &rest[..at + delimiter.len()]);
                    if rolled.insert(common.clone()) {
                        rows.push((common.clone(), Row::Prefix(common)));
                    }
                    continue;
                }
            }
            rows.push((
                key.clone(),
                Row::Object(ListedObject {
                    key: key.clone(),
                    size: object.data.len() as u64,
                    last_modified: Some(Utc::now()),
                    etag: Some(format!("etag-{}", object.data.len())),
                }),
            ));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));

        let start: usize = continuation_token
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let mut page = ListPage::default();
        for (_, row) in rows.iter().skip(start).take(self.page_size) {
            match row {
                Row::Object(object) => page.objects.push(object.clone()),
                Row::Prefix(common) => page.common_prefixes.push(common.clone()),
            }
        }
        if start + self.page_size < rows.len() {
            page.next_token = Some((start + self.page_size).to_string());
        }
        Ok(page)
    }

    async fn bucket_exists(&self, bucket: &str) -> KfsResult<bool> {
        Ok(self.buckets.lock().unwrap().contains_key(bucket))
    }

    async fn create_bucket(
        &self,
        bucket: &str,
        _location_constraint: Option<&str>,
    ) -> KfsResult<()> {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default();
        Ok(())
    }
}

/// A store for bucket `demo`, pre-seeded with the given objects.
pub(crate) fn seeded_store(objects: &[(&str, &str)]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.seed("demo", objects);
    store
}

/// A detached filesystem over the given bucket, never dialing out.
pub(crate) fn test_fs(bucket: &str) -> Arc<S3FileSystem> {
    let info = S3UriInfo::parse(&format!("s3://{bucket}")).unwrap();
    S3FileSystem::new(info, S3Config::new(), Weak::new())
}

pub(crate) fn test_fs_with_store(bucket: &str, store: Arc<MemoryStore>) -> Arc<S3FileSystem> {
    test_fs_with_config(bucket, S3Config::new(), store)
}

pub(crate) fn test_fs_with_config(
    bucket: &str,
    config: S3Config,
    store: Arc<MemoryStore>,
) -> Arc<S3FileSystem> {
    let info = S3UriInfo::parse(&format!("s3://{bucket}")).unwrap();
    let fs = S3FileSystem::new(info, config, Weak::new());
    fs.set_store(store);
    fs
}
