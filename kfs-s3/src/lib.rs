//! kfs: S3-compatible object storage as a filesystem
//!
//! Buckets become roots, keys become paths, and prefixes become
//! directories. A [`S3FileSystemProvider`] interns one
//! [`S3FileSystem`] per `(endpoint, bucket, principal)` identity;
//! operations on an [`S3Path`] dispatch through the provider to the
//! object store bound to its filesystem.
//!
//! ```no_run
//! use kfs_s3::default_provider;
//! use std::collections::HashMap;
//!
//! # async fn demo() -> kfs_core::KfsResult<()> {
//! let provider = default_provider();
//! let fs = provider
//!     .new_file_system("s3x://minio.local:9000/archive", HashMap::new())
//!     .await?;
//!
//! let dir = fs.path("/reports/2024/");
//! let mut stream = provider.new_directory_stream(&dir, None)?;
//! while let Some(entry) = stream.next_entry().await? {
//!     println!("{entry}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod attrs;
pub mod channel;
pub mod client;
pub mod fs;
pub mod path;
pub mod provider;
pub mod store;
pub mod stream;
pub mod walk;

#[cfg(test)]
pub(crate) mod testing;

pub use attrs::ObjectAttributes;
pub use channel::{ReadChannel, WriteChannel};
pub use client::S3Client;
pub use fs::S3FileSystem;
pub use path::S3Path;
pub use provider::{default_provider, S3FileSystemProvider};
pub use store::{CopyOptions, ListPage, ListedObject, MoveOptions, ObjectStore};
pub use stream::{DirectoryStream, PathFilter};
pub use walk::Walk;

pub use kfs_core::{Credentials, KfsError, KfsResult, S3Config, S3UriInfo, Scheme};
