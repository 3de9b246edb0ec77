//! Recursive traversal
//!
//! Depth-first pre-order over repeated directory streams: a directory is
//! yielded when first seen, then descended into before its later
//! siblings. A visited-prefix guard refuses to descend into a prefix
//! twice, which defends against loops smuggled in through pathological
//! keys.

use std::collections::HashSet;

use kfs_core::{KfsError, KfsResult};

use crate::path::S3Path;
use crate::stream::DirectoryStream;

pub struct Walk {
    root: Option<S3Path>,
    stack: Vec<DirectoryStream>,
    visited: HashSet<String>,
}

impl Walk {
    pub(crate) fn new(root: &S3Path) -> KfsResult<Self> {
        if !root.is_directory() {
            return Err(KfsError::InvalidArgument(format!(
                "'{root}' is not a directory path"
            )));
        }
        Ok(Self {
            root: Some(root.clone()),
            stack: Vec::new(),
            visited: HashSet::new(),
        })
    }

    /// The next path in pre-order, starting with the root itself.
    pub async fn next_entry(&mut self) -> KfsResult<Option<S3Path>> {
        if let Some(root) = self.root.take() {
            self.visited.insert(root.to_key());
            self.stack.push(DirectoryStream::new(&root, None)?);
            return Ok(Some(root));
        }

        loop {
            let Some(stream) = self.stack.last_mut() else {
                return Ok(None);
            };
            match stream.next_entry().await? {
                Some(path) => {
                    if path.is_directory() && self.visited.insert(path.to_key()) {
                        self.stack.push(DirectoryStream::new(&path, None)?);
                    }
                    return Ok(Some(path));
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }

    /// Drain the traversal into a vector.
    pub async fn collect(mut self) -> KfsResult<Vec<S3Path>> {
        let mut paths = Vec::new();
        while let Some(path) = self.next_entry().await? {
            paths.push(path);
        }
        Ok(paths)
    }
}
