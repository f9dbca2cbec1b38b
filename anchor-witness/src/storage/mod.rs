//! Storage backend SPI.
//!
//! The witness store runs against any tag-indexed key-value backend that
//! implements [`StorageBackend`]. Production nodes plug in a durable
//! implementation (document database or similar); [`memory::MemoryBackend`]
//! ships in-crate for development and tests.
//!
//! # Tag queries
//!
//! Two expression forms are understood:
//!
//! - `name:value` — records whose tag `name` equals `value`
//! - `name<=value` — records whose tag `name`, parsed as an integer, is less
//!   than or equal to `value` (used by the expiry sweeper)

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemoryBackend;

/// Backend I/O failure. The witness store treats every backend failure as
/// retryable; decode failures are detected above this layer.
#[derive(Error, Debug)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Result type alias for backend operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Name/value pair attached to a stored record, forming a secondary index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One entry of a batch. A `None` value denotes a delete.
#[derive(Debug, Clone)]
pub struct Operation {
    pub key: String,
    pub value: Option<Vec<u8>>,
    pub tags: Vec<Tag>,
    /// Set when the key is known to be fresh; backends may skip their
    /// read-before-write path.
    pub is_new_key: bool,
}

impl Operation {
    /// A put of `value` under `key` with the given tags.
    pub fn put(key: impl Into<String>, value: Vec<u8>, tags: Vec<Tag>) -> Self {
        Self {
            key: key.into(),
            value: Some(value),
            tags,
            is_new_key: false,
        }
    }

    /// As [`Operation::put`], for a key known not to exist yet.
    pub fn insert(key: impl Into<String>, value: Vec<u8>, tags: Vec<Tag>) -> Self {
        Self {
            is_new_key: true,
            ..Self::put(key, value, tags)
        }
    }

    /// A delete of `key`.
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            tags: Vec::new(),
            is_new_key: false,
        }
    }
}

/// A record returned by a tag query: primary key, stored bytes and the tags
/// the record was stored with.
///
/// Queries return a collected snapshot rather than a live cursor, so update
/// paths never hold backend iterators open across their writes.
#[derive(Debug, Clone)]
pub struct QueryEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub tags: Vec<Tag>,
}

/// Tag-indexed key-value store consumed by the witness subsystem.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Store `value` under `key`, replacing any previous value and tags.
    async fn put(&self, key: &str, value: &[u8], tags: &[Tag]) -> BackendResult<()>;

    /// Fetch the value under `key`, or `None` when absent.
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;

    /// Apply a batch of puts and deletes.
    ///
    /// Backends apply entries together where they can; callers must not
    /// assume atomicity across entries.
    async fn batch(&self, operations: Vec<Operation>) -> BackendResult<()>;

    /// Return all records matching a tag expression (see module docs).
    async fn query(&self, expression: &str) -> BackendResult<Vec<QueryEntry>>;

    /// Fetch the tags stored with `key`, or `None` when the key is absent.
    async fn get_tags(&self, key: &str) -> BackendResult<Option<Vec<Tag>>>;
}
