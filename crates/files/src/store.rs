//! Blob-store collaborator and its implementations.
//!
//! The report engine never talks to storage directly; it goes through [`BlobStore`], which
//! serves and accepts named byte streams grouped into buckets. Objects are addressed by
//! `<name>.<extension>` inside a bucket, the bucket naming a semantic file category.
//!
//! # Implementations
//!
//! - [`FsBlobStore`] keeps each bucket as a directory under a root directory
//! - [`MemoryBlobStore`] keeps objects in a map, for tests and dry runs
//!
//! # Storage Layout
//!
//! ```text
//! <root>/
//! └── <bucket>/
//!     └── <name>.<extension>
//! ```

use crate::entry::ObjectKey;
use crate::{FilesError, FilesResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Named byte streams grouped into buckets.
///
/// Implementations must be shareable across the worker pools that fetch and upload files
/// concurrently.
pub trait BlobStore: Send + Sync {
    /// Reads an object.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if no such object exists.
    fn get(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<Vec<u8>>;

    /// Stores an object, replacing any previous content, and returns its URL.
    ///
    /// `token` is the caller's bearer token, forwarded to stores that authenticate uploads.
    fn put(
        &self,
        name: &str,
        extension: &str,
        bucket: &str,
        bytes: &[u8],
        token: &str,
    ) -> FilesResult<String>;

    /// Removes an object.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::NotFound`] if no such object exists.
    fn delete(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<()>;
}

/// Rejects empty segments, separators and dot-prefixed names so an object can never escape
/// its bucket directory.
fn validate_segment(kind: &str, value: &str) -> FilesResult<()> {
    if value.is_empty()
        || value.starts_with('.')
        || value.contains(['/', '\\', '\0'])
        || value.contains("..")
    {
        return Err(FilesError::InvalidPath(format!(
            "invalid {}: '{}'",
            kind, value
        )));
    }
    Ok(())
}

fn validate_key(name: &str, extension: &str, bucket: &str) -> FilesResult<ObjectKey> {
    validate_segment("bucket", bucket)?;
    validate_segment("object name", name)?;
    if !extension.is_empty() {
        validate_segment("extension", extension)?;
    }
    Ok(ObjectKey::new(name, extension))
}

/// Filesystem-backed blob store.
///
/// The root directory is validated and canonicalised at construction; bucket directories are
/// created on first upload.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root_directory: PathBuf,
}

impl FsBlobStore {
    /// Creates a store rooted at an existing directory.
    ///
    /// # Errors
    ///
    /// Returns [`FilesError::InvalidRootDirectory`] if the directory does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> FilesResult<Self> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    fn object_path(&self, key: &ObjectKey, bucket: &str) -> PathBuf {
        self.root_directory.join(bucket).join(key.file_name())
    }
}

impl BlobStore for FsBlobStore {
    fn get(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<Vec<u8>> {
        let key = validate_key(name, extension, bucket)?;
        let path = self.object_path(&key, bucket);
        fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FilesError::NotFound(format!("{}/{}", bucket, key.file_name()))
            }
            _ => FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read object {}: {}", path.display(), e),
            )),
        })
    }

    fn put(
        &self,
        name: &str,
        extension: &str,
        bucket: &str,
        bytes: &[u8],
        _token: &str,
    ) -> FilesResult<String> {
        let key = validate_key(name, extension, bucket)?;
        let path = self.object_path(&key, bucket);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                FilesError::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create bucket directory {}: {}", parent.display(), e),
                ))
            })?;
        }

        fs::write(&path, bytes).map_err(|e| {
            FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to write object to {}: {}", path.display(), e),
            ))
        })?;

        tracing::debug!("stored {} bytes at {}", bytes.len(), path.display());
        Ok(format!("file://{}", path.display()))
    }

    fn delete(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<()> {
        let key = validate_key(name, extension, bucket)?;
        let path = self.object_path(&key, bucket);
        fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FilesError::NotFound(format!("{}/{}", bucket, key.file_name()))
            }
            _ => FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to delete object {}: {}", path.display(), e),
            )),
        })
    }
}

/// In-memory blob store.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects across all buckets.
    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, file_name: &str, bucket: &str) -> bool {
        self.objects
            .lock()
            .contains_key(&(bucket.to_string(), file_name.to_string()))
    }

    /// Object names stored in `bucket`, sorted.
    pub fn names_in(&self, bucket: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }
}

impl BlobStore for MemoryBlobStore {
    fn get(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<Vec<u8>> {
        let key = validate_key(name, extension, bucket)?;
        self.objects
            .lock()
            .get(&(bucket.to_string(), key.file_name()))
            .cloned()
            .ok_or_else(|| FilesError::NotFound(format!("{}/{}", bucket, key.file_name())))
    }

    fn put(
        &self,
        name: &str,
        extension: &str,
        bucket: &str,
        bytes: &[u8],
        _token: &str,
    ) -> FilesResult<String> {
        let key = validate_key(name, extension, bucket)?;
        let file_name = key.file_name();
        self.objects
            .lock()
            .insert((bucket.to_string(), file_name.clone()), bytes.to_vec());
        Ok(format!("memory://{}/{}", bucket, file_name))
    }

    fn delete(&self, name: &str, extension: &str, bucket: &str) -> FilesResult<()> {
        let key = validate_key(name, extension, bucket)?;
        self.objects
            .lock()
            .remove(&(bucket.to_string(), key.file_name()))
            .map(|_| ())
            .ok_or_else(|| FilesError::NotFound(format!("{}/{}", bucket, key.file_name())))
    }
}
