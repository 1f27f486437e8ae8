//! Storage layer for boxsig.
//!
//! This crate provides the key-value abstraction used to model contract box
//! storage, an in-memory implementation, and the chunk codec that splits
//! payloads larger than a single storage write.

pub mod chunk;

use std::collections::BTreeMap;
use thiserror::Error;

pub use chunk::{chunk_count, reassemble, split, ChunkPlan, CHUNK_SIZE};

/// Store error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("key not found")]
    KeyNotFound,

    #[error("value too large: {len} bytes exceeds {max}")]
    ValueTooLarge { len: usize, max: usize },

    #[error("backend error: {0}")]
    BackendError(String),
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for boxsig_errors::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ValueTooLarge { len, max } => {
                boxsig_errors::Error::PayloadTooLarge { len, max }
            }
            other => boxsig_errors::Error::rejected(other.to_string()),
        }
    }
}

/// Basic key-value store trait
pub trait KVStore: Send + Sync {
    /// Get a value by key
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Set a key-value pair, replacing any previous value
    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    /// Append bytes to an existing value
    fn append(&mut self, key: &[u8], bytes: &[u8]) -> Result<()>;

    /// Delete a key, returning whether it existed
    fn delete(&mut self, key: &[u8]) -> Result<bool>;

    /// Check if a key exists
    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Length of the stored value, if any
    fn value_len(&self, key: &[u8]) -> Result<Option<usize>> {
        Ok(self.get(key)?.map(|v| v.len()))
    }

    /// Keys and values starting with `prefix`, in key order
    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>>;
}

impl KVStore for Box<dyn KVStore> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        (**self).set(key, value)
    }

    fn append(&mut self, key: &[u8], bytes: &[u8]) -> Result<()> {
        (**self).append(key, bytes)
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        (**self).delete(key)
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        (**self).has(key)
    }

    fn value_len(&self, key: &[u8]) -> Result<Option<usize>> {
        (**self).value_len(key)
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>> {
        (**self).prefix_iterator(prefix)
    }
}

/// In-memory key-value store with an optional per-value size limit
#[derive(Debug, Clone)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
    max_value_len: Option<usize>,
}

impl MemStore {
    /// Create a new unbounded memory store
    pub fn new() -> Self {
        Self {
            data: BTreeMap::new(),
            max_value_len: None,
        }
    }

    /// Create a memory store rejecting values longer than `max` bytes
    pub fn with_max_value_len(max: usize) -> Self {
        Self {
            data: BTreeMap::new(),
            max_value_len: Some(max),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    fn check_len(&self, len: usize) -> Result<()> {
        match self.max_value_len {
            Some(max) if len > max => Err(StoreError::ValueTooLarge { len, max }),
            _ => Ok(()),
        }
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KVStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.check_len(value.len())?;
        self.data.insert(key, value);
        Ok(())
    }

    fn append(&mut self, key: &[u8], bytes: &[u8]) -> Result<()> {
        let current = self.data.get(key).ok_or(StoreError::KeyNotFound)?.len();
        self.check_len(current + bytes.len())?;
        if let Some(value) = self.data.get_mut(key) {
            value.extend_from_slice(bytes);
        }
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }

    fn value_len(&self, key: &[u8]) -> Result<Option<usize>> {
        Ok(self.data.get(key).map(Vec::len))
    }

    fn prefix_iterator(&self, prefix: &[u8]) -> Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)>> {
        let items: Vec<_> = self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Box::new(items.into_iter())
    }
}
