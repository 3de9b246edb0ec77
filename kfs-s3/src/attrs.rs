//! Object attributes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the service reports about one object or synthetic directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectAttributes {
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    pub directory: bool,
}

impl ObjectAttributes {
    /// Attributes of a synthetic directory: zero size, nothing else known.
    pub fn directory() -> Self {
        Self {
            directory: true,
            ..Default::default()
        }
    }

    pub fn is_directory(&self) -> bool {
        self.directory
    }

    pub fn is_regular_file(&self) -> bool {
        !self.directory
    }
}
