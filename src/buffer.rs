//! I/O buffers
//!
//! An [`IoBuffer`] has exactly one owner at a time. Handing a buffer to the
//! hardware driver for a read or a write moves it there; the matching
//! completion event moves it back.

use crate::error::{Error, Result};
use alloc::vec::Vec;

/// A fixed-capacity byte buffer for endpoint I/O.
///
/// The storage is allocated once, up front. `len()` tracks how many bytes
/// are valid: the bytes to write, or the bytes a read produced.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct IoBuffer {
    storage: Vec<u8>,
    len: usize,
}

impl IoBuffer {
    /// Allocate a zeroed buffer that can hold `capacity` bytes.
    ///
    /// Returns `OutOfMemory` if the allocation fails.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        storage.resize(capacity, 0);
        Ok(IoBuffer { storage, len: 0 })
    }

    /// Allocate a buffer holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        let mut buffer = Self::with_capacity(data.len())?;
        buffer.storage.copy_from_slice(data);
        buffer.len = data.len();
        Ok(buffer)
    }

    /// Returns the number of bytes this buffer can hold.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Returns the number of valid bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Indicates that there are no valid bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the number of valid bytes, constrained by the capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.capacity());
    }

    /// Drop all valid bytes.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.storage[..self.len]
    }

    /// The valid bytes, mutably.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[..self.len]
    }

    /// The entire storage, regardless of `len()`.
    ///
    /// Use this to fill the buffer, then call [`set_len()`](IoBuffer::set_len).
    pub fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Replace the contents with `data`.
    ///
    /// Returns the number of bytes copied, which is constrained by the capacity.
    pub fn fill(&mut self, data: &[u8]) -> usize {
        let size = data.len().min(self.capacity());
        self.storage[..size].copy_from_slice(&data[..size]);
        self.len = size;
        size
    }
}
