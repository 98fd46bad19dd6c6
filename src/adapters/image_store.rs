//! RAM-backed image store.
//!
//! Stands in for the Object Transfer image flash on host builds.  Slots are
//! indexed `0..=max_index`; writes grow a slot up to `max_image_size`.

use std::collections::BTreeMap;

use log::debug;

use crate::app::ports::{ImageStorePort, StorageError};

pub struct RamImageStore {
    images: BTreeMap<u8, Vec<u8>>,
    max_index: u8,
    max_image_size: usize,
}

impl RamImageStore {
    pub fn new(max_index: u8, max_image_size: usize) -> Self {
        Self {
            images: BTreeMap::new(),
            max_index,
            max_image_size,
        }
    }

    fn check(&self, index: u8) -> Result<(), StorageError> {
        if index > self.max_index {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    /// Replace image `index` wholesale.
    pub fn load(&mut self, index: u8, data: &[u8]) -> Result<(), StorageError> {
        self.check(index)?;
        if data.len() > self.max_image_size {
            return Err(StorageError::Full);
        }
        self.images.insert(index, data.to_vec());
        Ok(())
    }
}

impl ImageStorePort for RamImageStore {
    fn write(&mut self, index: u8, data: &[u8], offset: usize) -> Result<usize, StorageError> {
        self.check(index)?;
        let end = offset.checked_add(data.len()).ok_or(StorageError::Full)?;
        if end > self.max_image_size {
            return Err(StorageError::Full);
        }
        let slot = self.images.entry(index).or_default();
        if slot.len() < end {
            slot.resize(end, 0);
        }
        slot[offset..end].copy_from_slice(data);
        Ok(data.len())
    }

    fn read(&self, index: u8, offset: usize, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.check(index)?;
        let Some(img) = self.images.get(&index) else {
            return Ok(0);
        };
        let Some(tail) = img.get(offset..) else {
            return Ok(0);
        };
        let n = tail.len().min(buf.len());
        buf[..n].copy_from_slice(&tail[..n]);
        Ok(n)
    }

    fn read_size(&self, index: u8) -> Result<usize, StorageError> {
        self.check(index)?;
        Ok(self.images.get(&index).map_or(0, Vec::len))
    }

    fn delete_all(&mut self) -> Result<(), StorageError> {
        debug!("RamImageStore: deleting {} image(s)", self.images.len());
        self.images.clear();
        Ok(())
    }
}
