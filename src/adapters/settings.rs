//! Settings adapter.
//!
//! Implements [`SettingsPort`] on an in-memory map keyed by
//! `"namespace::key"`.  Provisioned data (address, keys, abs-time flag)
//! lives in the `esl` namespace as postcard blobs written by the tag
//! service; this adapter only stores bytes.
//!
//! # Security
//!
//! - Key material is held in plain memory.  A flash backend SHOULD place
//!   the `esl` namespace on an encrypted partition.
//! - Namespace isolation: each subsystem uses its own prefix, and
//!   [`MemorySettings::erase_namespace`] never crosses it.

use std::collections::HashMap;

use log::{debug, info};

use crate::app::ports::{SettingsPort, StorageError};

/// Largest value accepted per key.
pub const MAX_BLOB_SIZE: usize = 512;

/// Total bytes the store may hold before writes fail with `Full`.
const DEFAULT_CAPACITY: usize = 4096;

pub struct MemorySettings {
    store: HashMap<String, Vec<u8>>,
    capacity: usize,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        info!("MemorySettings: {capacity} byte budget");
        Self {
            store: HashMap::new(),
            capacity,
        }
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }

    fn used(&self) -> usize {
        self.store.values().map(Vec::len).sum()
    }

    /// Remove every key under `namespace`.
    pub fn erase_namespace(&mut self, namespace: &str) {
        let prefix = format!("{namespace}::");
        self.store.retain(|k, _| !k.starts_with(&prefix));
        debug!("MemorySettings: erased namespace {namespace}");
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsPort for MemorySettings {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        match self.store.get(&composite) {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let composite = Self::composite_key(namespace, key);
        let replaced = self.store.get(&composite).map_or(0, Vec::len);
        if self.used() - replaced + data.len() > self.capacity {
            return Err(StorageError::Full);
        }
        self.store.insert(composite, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key);
        self.store.remove(&composite);
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.store.contains_key(&Self::composite_key(namespace, key))
    }
}
