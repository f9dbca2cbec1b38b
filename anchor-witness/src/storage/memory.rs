//! In-memory storage backend.
//!
//! Reference implementation of the backend SPI, used by tests and
//! development nodes. Thread safe behind a single RwLock; queries scan the
//! full map, which is fine at the record counts a single node holds.

use std::collections::HashMap;

use tokio::sync::RwLock;

use super::{BackendError, BackendResult, Operation, QueryEntry, StorageBackend, Tag};

#[derive(Debug, Clone)]
struct StoredRecord {
    value: Vec<u8>,
    tags: Vec<Tag>,
}

/// In-memory tag-indexed key-value store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

enum TagMatcher<'a> {
    Equals { name: &'a str, value: &'a str },
    AtMost { name: &'a str, bound: i64 },
}

impl<'a> TagMatcher<'a> {
    fn parse(expression: &'a str) -> BackendResult<Self> {
        if let Some((name, bound)) = expression.split_once("<=") {
            let bound = bound.parse().map_err(|_| {
                BackendError::new(format!("invalid bound in tag expression: {expression}"))
            })?;
            return Ok(Self::AtMost { name, bound });
        }

        match expression.split_once(':') {
            Some((name, value)) => Ok(Self::Equals { name, value }),
            None => Err(BackendError::new(format!(
                "invalid tag expression: {expression}"
            ))),
        }
    }

    fn matches(&self, tags: &[Tag]) -> bool {
        match self {
            Self::Equals { name, value } => tags
                .iter()
                .any(|t| t.name == *name && t.value == *value),
            Self::AtMost { name, bound } => tags.iter().any(|t| {
                t.name == *name
                    && t.value
                        .parse::<i64>()
                        .map(|v| v <= *bound)
                        .unwrap_or(false)
            }),
        }
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn put(&self, key: &str, value: &[u8], tags: &[Tag]) -> BackendResult<()> {
        let mut records = self.records.write().await;
        records.insert(
            key.to_string(),
            StoredRecord {
                value: value.to_vec(),
                tags: tags.to_vec(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let records = self.records.read().await;
        Ok(records.get(key).map(|r| r.value.clone()))
    }

    async fn batch(&self, operations: Vec<Operation>) -> BackendResult<()> {
        // All entries apply under one write lock, so readers never observe a
        // half-applied batch.
        let mut records = self.records.write().await;
        for op in operations {
            match op.value {
                Some(value) => {
                    records.insert(op.key, StoredRecord {
                        value,
                        tags: op.tags,
                    });
                }
                None => {
                    records.remove(&op.key);
                }
            }
        }
        Ok(())
    }

    async fn query(&self, expression: &str) -> BackendResult<Vec<QueryEntry>> {
        let matcher = TagMatcher::parse(expression)?;
        let records = self.records.read().await;

        Ok(records
            .iter()
            .filter(|(_, r)| matcher.matches(&r.tags))
            .map(|(key, r)| QueryEntry {
                key: key.clone(),
                value: r.value.clone(),
                tags: r.tags.clone(),
            })
            .collect())
    }

    async fn get_tags(&self, key: &str) -> BackendResult<Option<Vec<Tag>>> {
        let records = self.records.read().await;
        Ok(records.get(key).map(|r| r.tags.clone()))
    }
}
