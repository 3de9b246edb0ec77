//! kfs Core
//!
//! Error type, configuration resolution, and URI extraction shared by the
//! kfs filesystem crates.

pub mod config;
pub mod error;
pub mod props;
pub mod uri;

pub use config::{Credentials, S3Config};
pub use error::{KfsError, KfsResult};
pub use uri::{S3UriInfo, Scheme};
