//! Backends module - Object store collaborators
//!
//! Provides:
//! - ObjectStore: paginated listing and streaming reads
//! - local: a directory tree where each top-level directory is a bucket
//! - retry: transient-error retry with exponential backoff
//! - memory: in-memory store with fault injection (tests only)

use async_trait::async_trait;
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

pub mod local;
pub mod retry;

#[cfg(test)]
pub mod memory;

/// Default number of concurrent object streams a store hands out
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default listing page size
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// A readable object body
pub type ObjectStream = Box<dyn AsyncRead + Send + Unpin>;

/// Store-level failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("bucket not found: {0}")]
    NamespaceNotFound(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("invalid continuation token: {0}")]
    InvalidToken(String),

    #[error("transient store error: {0}")]
    Transient(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// Map an I/O error to the store taxonomy
    pub fn from_io(path: impl Into<String>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => StoreError::NotFound(path),
            io::ErrorKind::PermissionDenied => StoreError::AccessDenied(path),
            io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted => {
                StoreError::Transient(format!("{}: {}", path, err))
            }
            _ => StoreError::Io { path, source: err },
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

/// One listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: String,
    pub is_folder_marker: bool,
}

impl ListEntry {
    pub fn object(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_folder_marker: false,
        }
    }

    pub fn folder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_folder_marker: true,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<ListEntry>,

    /// Token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

/// Object store client
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of entries under `prefix`
    async fn list_page(
        &self,
        namespace: &str,
        prefix: &str,
        token: Option<&str>,
        max_keys: usize,
    ) -> Result<ListPage, StoreError>;

    /// Open an object as a byte stream
    async fn open_object(&self, namespace: &str, path: &str) -> Result<ObjectStream, StoreError>;
}
