//! Path model
//!
//! An [`S3Path`] is an immutable value: the owning filesystem, a sequence
//! of name segments, and two flags. `absolute` records a leading `/`;
//! `directory` records a trailing `/`, the convention marking a key as a
//! synthetic directory prefix. The bucket root is the absolute path with
//! no segments.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use kfs_core::{KfsError, KfsResult, Scheme};

use crate::fs::S3FileSystem;

/// Hierarchical path over a flat key namespace.
#[derive(Clone)]
pub struct S3Path {
    fs: Arc<S3FileSystem>,
    segments: Vec<String>,
    absolute: bool,
    directory: bool,
}

impl S3Path {
    pub(crate) fn parse(fs: Arc<S3FileSystem>, input: &str) -> Self {
        let absolute = input.starts_with('/');
        let bare = input.trim_matches('/').is_empty();
        let directory = (input.ends_with('/') && !bare) || (absolute && bare);
        let segments = input
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self {
            fs,
            segments,
            absolute,
            directory,
        }
    }

    /// The bucket root: absolute, no segments, a directory.
    pub(crate) fn root(fs: Arc<S3FileSystem>) -> Self {
        Self {
            fs,
            segments: Vec::new(),
            absolute: true,
            directory: true,
        }
    }

    /// Absolute path for an object key; a trailing `/` marks a directory.
    pub(crate) fn from_key(fs: Arc<S3FileSystem>, key: &str) -> Self {
        let directory = key.is_empty() || key.ends_with('/');
        let segments = key
            .split('/')
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        Self {
            fs,
            segments,
            absolute: true,
            directory,
        }
    }

    fn with(&self, segments: Vec<String>, absolute: bool, directory: bool) -> Self {
        Self {
            fs: self.fs.clone(),
            segments,
            absolute,
            directory,
        }
    }

    fn ensure_same_fs(&self, other: &S3Path) -> KfsResult<()> {
        if self.fs.identity() != other.fs.identity() {
            return Err(KfsError::InvalidArgument(format!(
                "path '{other}' belongs to filesystem '{}', not '{}'",
                other.fs.identity(),
                self.fs.identity()
            )));
        }
        Ok(())
    }

    pub fn filesystem(&self) -> &Arc<S3FileSystem> {
        &self.fs
    }

    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    /// True for the root and for any path written with a trailing `/`.
    pub fn is_directory(&self) -> bool {
        self.directory || (self.absolute && self.segments.is_empty())
    }

    pub fn is_root(&self) -> bool {
        self.absolute && self.segments.is_empty()
    }

    pub fn name_count(&self) -> usize {
        self.segments.len()
    }

    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Iterate over the name segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    pub fn parent(&self) -> Option<S3Path> {
        if self.segments.is_empty() {
            return None;
        }
        if !self.absolute && self.segments.len() == 1 {
            return None;
        }
        Some(self.with(
            self.segments[..self.segments.len() - 1].to_vec(),
            self.absolute,
            true,
        ))
    }

    /// The `index`-th name as a relative path.
    pub fn name(&self, index: usize) -> KfsResult<S3Path> {
        self.subpath(index, index + 1)
    }

    /// Relative path over the segment range `begin..end`.
    pub fn subpath(&self, begin: usize, end: usize) -> KfsResult<S3Path> {
        if begin >= end || end > self.segments.len() {
            return Err(KfsError::InvalidArgument(format!(
                "subpath range {begin}..{end} out of bounds for {} segments",
                self.segments.len()
            )));
        }
        let directory = end < self.segments.len() || self.directory;
        Ok(self.with(self.segments[begin..end].to_vec(), false, directory))
    }

    pub fn starts_with(&self, other: &S3Path) -> bool {
        if self.fs.identity() != other.fs.identity() || self.absolute != other.absolute {
            return false;
        }
        self.segments.len() >= other.segments.len()
            && self.segments[..other.segments.len()] == other.segments[..]
    }

    pub fn ends_with(&self, other: &S3Path) -> bool {
        if self.fs.identity() != other.fs.identity() {
            return false;
        }
        if other.absolute {
            return self.absolute && self.segments == other.segments;
        }
        self.segments.len() >= other.segments.len()
            && self.segments[self.segments.len() - other.segments.len()..] == other.segments[..]
    }

    /// Append a relative path string, without normalizing.
    pub fn join(&self, other: &str) -> S3Path {
        let tail = S3Path::parse(self.fs.clone(), other);
        let mut segments = self.segments.clone();
        segments.extend(tail.segments);
        self.with(segments, self.absolute, tail.directory)
    }

    /// Resolve `other` against this path. An absolute `other` wins; an
    /// empty `other` yields this path.
    pub fn resolve(&self, other: &S3Path) -> KfsResult<S3Path> {
        self.ensure_same_fs(other)?;
        if other.absolute {
            return Ok(other.clone());
        }
        if other.segments.is_empty() {
            return Ok(self.clone());
        }
        let mut segments = self.segments.clone();
        segments.extend(other.segments.iter().cloned());
        Ok(self.with(segments, self.absolute, other.directory))
    }

    /// Resolve against this path's parent; with no parent, `other` stands
    /// on its own.
    pub fn resolve_sibling(&self, other: &S3Path) -> KfsResult<S3Path> {
        self.ensure_same_fs(other)?;
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => Ok(other.clone()),
        }
    }

    /// Collapse `.` and `..` segments. A relative path may keep a leading
    /// run of `..`; an absolute path cannot climb past the root.
    pub fn normalize(&self) -> S3Path {
        let mut stack: Vec<String> = Vec::new();
        for segment in &self.segments {
            match segment.as_str() {
                "." => {}
                ".." => {
                    if stack.last().map(String::as_str).unwrap_or("..") != ".." {
                        stack.pop();
                    } else if !self.absolute {
                        stack.push("..".to_string());
                    }
                }
                _ => stack.push(segment.clone()),
            }
        }
        self.with(stack, self.absolute, self.directory)
    }

    /// The minimal relative path such that
    /// `self.resolve(self.relativize(other))` names `other`.
    pub fn relativize(&self, other: &S3Path) -> KfsResult<S3Path> {
        self.ensure_same_fs(other)?;
        if self.absolute != other.absolute {
            return Err(KfsError::InvalidArgument(format!(
                "cannot relativize '{other}' against '{self}': one path is absolute and the \
                 other is not"
            )));
        }
        let base = self.normalize();
        let target = other.normalize();

        let common = base
            .segments
            .iter()
            .zip(target.segments.iter())
            .take_while(|(a, b)| a == b)
            .count();
        let mut segments: Vec<String> = std::iter::repeat("..".to_string())
            .take(base.segments.len() - common)
            .collect();
        segments.extend(target.segments[common..].iter().cloned());

        let directory = !segments.is_empty() && target.directory;
        Ok(self.with(segments, false, directory))
    }

    /// The object key: segments joined by `/`, a trailing `/` iff this is
    /// a directory path. The root's key is empty.
    pub fn to_key(&self) -> String {
        if self.segments.is_empty() {
            return String::new();
        }
        let mut key = self.segments.join("/");
        if self.is_directory() {
            key.push('/');
        }
        key
    }

    /// Reconstruct the URI for this path from the owning filesystem's
    /// scheme, endpoint, and credentials. The emitted key is normalized.
    pub fn to_uri(&self) -> String {
        let key = self.normalize().to_key();
        let info = self.fs.info();
        match info.scheme {
            Scheme::S3 => format!("s3://{}/{}", info.bucket, key),
            Scheme::S3x => {
                let userinfo = match (&info.access_key, &info.access_secret) {
                    (Some(user), Some(secret)) => format!("{user}:{secret}@"),
                    (Some(user), None) => format!("{user}@"),
                    _ => String::new(),
                };
                format!(
                    "s3x://{userinfo}{}/{}/{}",
                    info.endpoint.as_deref().unwrap_or_default(),
                    info.bucket,
                    key
                )
            }
        }
    }
}

impl fmt::Display for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            return write!(f, "/");
        }
        if self.absolute {
            write!(f, "/")?;
        }
        write!(f, "{}", self.segments.join("/"))?;
        if self.directory && !self.segments.is_empty() {
            write!(f, "/")?;
        }
        Ok(())
    }
}

impl fmt::Debug for S3Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S3Path({}:{})", self.fs.identity(), self)
    }
}

impl PartialEq for S3Path {
    fn eq(&self, other: &Self) -> bool {
        self.fs.identity() == other.fs.identity()
            && self.absolute == other.absolute
            && self.is_directory() == other.is_directory()
            && self.segments == other.segments
    }
}

impl Eq for S3Path {}

impl Hash for S3Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fs.identity().hash(state);
        self.absolute.hash(state);
        self.is_directory().hash(state);
        self.segments.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_fs;

    fn path(input: &str) -> S3Path {
        S3Path::parse(test_fs("test-bucket"), input)
    }

    #[test]
    fn parse_flags() {
        assert!(path("/a/b").is_absolute());
        assert!(!path("a/b").is_absolute());
        assert!(path("/a/b/").is_directory());
        assert!(!path("/a/b").is_directory());
        assert!(path("/").is_root());
        assert!(path("/").is_directory());
        assert_eq!(path("//a///b/").name_count(), 2);
    }

    #[test]
    fn keys() {
        assert_eq!(path("/").to_key(), "");
        assert_eq!(path("/a/b").to_key(), "a/b");
        assert_eq!(path("/a/b/").to_key(), "a/b/");
        assert_eq!(path("a/b").to_key(), "a/b");
    }

    #[test]
    fn display() {
        assert_eq!(path("/").to_string(), "/");
        assert_eq!(path("/a/b/").to_string(), "/a/b/");
        assert_eq!(path("a/b").to_string(), "a/b");
        assert_eq!(path("").to_string(), "");
    }

    #[test]
    fn parent_and_names() {
        assert_eq!(path("/a/b/c").parent().unwrap(), path("/a/b/"));
        assert_eq!(path("/a").parent().unwrap(), path("/"));
        assert_eq!(path("/").parent(), None);
        assert_eq!(path("a").parent(), None);
        assert_eq!(path("a/b").parent().unwrap(), path("a/"));

        let p = path("/a/b/c");
        assert_eq!(p.file_name(), Some("c"));
        assert_eq!(p.name(0).unwrap().to_string(), "a/");
        assert_eq!(p.name(2).unwrap().to_string(), "c");
        assert!(p.name(3).is_err());
        assert_eq!(p.subpath(0, 2).unwrap().to_string(), "a/b/");
    }

    #[test]
    fn normalize_collapses_dots() {
        assert_eq!(path("/a/./b/../c").normalize(), path("/a/c"));
        assert_eq!(path("/a/b/../../..").normalize(), path("/"));
        assert_eq!(path("../a/../b").normalize(), path("../b"));
        assert_eq!(path("a/./b/").normalize(), path("a/b/"));
        assert_eq!(path("..").normalize().to_string(), "..");
    }

    #[test]
    fn resolve_rules() {
        let base = path("/a/b/");
        assert_eq!(base.resolve(&path("c/d")).unwrap(), path("/a/b/c/d"));
        assert_eq!(base.resolve(&path("c/")).unwrap(), path("/a/b/c/"));
        assert_eq!(base.resolve(&path("/x")).unwrap(), path("/x"));
        assert_eq!(base.resolve(&path("")).unwrap(), base);
        assert_eq!(base.join("c/d"), path("/a/b/c/d"));
    }

    #[test]
    fn resolve_sibling_rules() {
        assert_eq!(
            path("/a/b/c").resolve_sibling(&path("d")).unwrap(),
            path("/a/b/d")
        );
        assert_eq!(path("a").resolve_sibling(&path("d")).unwrap(), path("d"));
    }

    #[test]
    fn relativize_rules() {
        let a = path("/a/b/");
        let b = path("/a/b/c/d");
        assert_eq!(a.relativize(&b).unwrap().to_string(), "c/d");
        assert_eq!(b.relativize(&a).unwrap().to_string(), "../../");

        assert_eq!(a.relativize(&a).unwrap().to_string(), "");
        assert!(a.relativize(&path("c")).is_err());
    }

    #[test]
    fn resolve_relativize_round_trip() {
        let cases = [
            ("/a/b/", "/a/b/c/d"),
            ("/a/b/c", "/x/y/"),
            ("/", "/deep/tree/leaf"),
            ("/a/./b", "/a/c/../d/"),
        ];
        for (p, q) in cases {
            let p = path(p);
            let q = path(q);
            let rel = p.relativize(&q).unwrap();
            assert_eq!(p.resolve(&rel).unwrap().normalize(), q.normalize());
        }
    }

    #[test]
    fn starts_and_ends_with() {
        assert!(path("/a/b/c").starts_with(&path("/a/b")));
        assert!(!path("/a/b/c").starts_with(&path("a/b")));
        assert!(!path("/a/b").starts_with(&path("/a/b/c")));
        assert!(path("/a/b/c").ends_with(&path("b/c")));
        assert!(path("/a/b/c").ends_with(&path("/a/b/c")));
        assert!(!path("/a/b/c").ends_with(&path("/b/c")));
    }

    #[test]
    fn uri_round_trip() {
        let fs = test_fs("test-bucket");
        for input in ["/a/b", "/a/b/", "/a/./b/../c", "/"] {
            let p = S3Path::parse(fs.clone(), input);
            let uri = p.to_uri();
            let info = kfs_core::S3UriInfo::parse(&uri).unwrap();
            assert_eq!(info.bucket, "test-bucket");
            let reparsed = S3Path::from_key(fs.clone(), &info.key);
            assert_eq!(reparsed, p.normalize());
        }
    }

    #[test]
    fn cross_filesystem_paths_are_rejected() {
        let p = path("/a/b");
        let other = S3Path::parse(test_fs("other-bucket"), "c");
        assert!(p.resolve(&other).is_err());
        assert!(p.relativize(&other).is_err());
        assert!(!p.starts_with(&other));
    }
}
