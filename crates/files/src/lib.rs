//! Report File Storage
//!
//! Attachments referenced by checklist instances (photos, plans, scanned documents) live in an
//! external blob store; checklist JSON only records [`FileEntry`] values pointing at them.
//!
//! ## Design Principles
//!
//! - Semantic data (checklist JSON) and binary bytes are kept apart
//! - Every stored file is identified by the SHA-256 of its content, used for deduplication
//! - Storage is reached only through the [`BlobStore`] trait
//!
//! ## Bucket Layout
//!
//! Objects are addressed by bucket and `<name>.<extension>`:
//!
//! ```text
//! <bucket>/
//! └── <instance-id>_<bucket-or-parameter>_<uuid>.<extension>
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use report_files::{content_hash, BlobStore, FsBlobStore};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = FsBlobStore::new(Path::new("blobs"))?;
//! let bytes = store.get("plan", "png", "answer-photos")?;
//! println!("{}", content_hash(&bytes));
//! # Ok(())
//! # }
//! ```

mod entry;
mod store;

pub use entry::{content_hash, detect_media_type, is_image, is_pdf, FileEntry, ObjectKey};
pub use store::{BlobStore, FsBlobStore, MemoryBlobStore};

/// Errors that can occur during file operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (potential directory traversal or unsafe name)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No object under the requested bucket and name
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Remote store rejected or failed the request
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for file storage operations.
pub type FilesResult<T> = std::result::Result<T, FilesError>;
