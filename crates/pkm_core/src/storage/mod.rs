//! Document storage seam for proposal files.
//!
//! # Responsibility
//! - Define the `store / delete / exists` contract the engine consumes.
//! - Reject oversized or unsupported documents before anything is written.
//!
//! # Invariants
//! - `store` either returns a reference to a fully written blob or fails
//!   without leaving one behind.
//! - `delete` is idempotent: deleting a missing blob succeeds.

use crate::model::submission::DocumentRef;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod fs;

pub use fs::FsDocumentStore;

/// 2.5 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 2_621_440;
pub const DEFAULT_ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "doc", "docx"];

/// Blob store used for proposal documents.
pub trait DocumentStore: Send + Sync {
    /// Persists `bytes` and returns an opaque reference.
    ///
    /// `name_hint` carries the desired stem and extension, e.g.
    /// `proposal_PKM-K-2026-001.pdf`; the store decides the final name.
    fn store(&self, bytes: &[u8], name_hint: &str) -> StorageResult<DocumentRef>;
    fn delete(&self, document: &str) -> StorageResult<()>;
    fn exists(&self, document: &str) -> StorageResult<bool>;
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooLarge { size: usize, max: usize },
    UnsupportedType(String),
    InvalidReference(String),
}

impl Display for RejectReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "document is empty"),
            Self::TooLarge { size, max } => {
                write!(f, "document is {size} bytes, limit is {max} bytes")
            }
            Self::UnsupportedType(ext) => write!(f, "unsupported document type `{ext}`"),
            Self::InvalidReference(value) => write!(f, "invalid document reference `{value}`"),
        }
    }
}

#[derive(Debug)]
pub enum StorageError {
    /// Document refused before any write.
    Rejected(RejectReason),
    Io {
        operation: &'static str,
        source: std::io::Error,
    },
}

impl StorageError {
    pub fn io(operation: &'static str, source: std::io::Error) -> Self {
        Self::Io { operation, source }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "document rejected: {reason}"),
            Self::Io { operation, source } => write!(f, "document {operation} failed: {source}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Rejected(_) => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

/// Size and type policy applied before a document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLimits {
    pub max_bytes: usize,
    /// Lowercase extensions without the dot.
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageLimits {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

impl StorageLimits {
    /// Validates a candidate document; returns its normalized extension.
    pub fn check(&self, bytes: &[u8], name_hint: &str) -> Result<String, RejectReason> {
        if bytes.is_empty() {
            return Err(RejectReason::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(RejectReason::TooLarge {
                size: bytes.len(),
                max: self.max_bytes,
            });
        }
        let ext = extension_of(name_hint);
        if !self.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            return Err(RejectReason::UnsupportedType(ext));
        }
        Ok(ext)
    }
}

fn extension_of(name: &str) -> String {
    name.rsplit_once('.')
        .map(|(_, ext)| ext.trim().to_ascii_lowercase())
        .unwrap_or_default()
}
