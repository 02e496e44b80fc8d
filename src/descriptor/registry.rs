//! Descriptor storage, keyed by (type, index, language)

use crate::error::{Error, Result};
use alloc::{boxed::Box, vec::Vec};

/// The bytes of a registered descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorData {
    /// Caller-owned, static data. Never freed by the registry.
    Borrowed(&'static [u8]),
    /// A heap copy, freed on unregister.
    Owned(Box<[u8]>),
}

impl DescriptorData {
    /// Copy `data` onto the heap.
    pub fn copy_from(data: &[u8]) -> Result<Self> {
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(data.len())
            .map_err(|_| Error::OutOfMemory)?;
        owned.extend_from_slice(data);
        Ok(DescriptorData::Owned(owned.into_boxed_slice()))
    }

    /// Returns the descriptor bytes.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            DescriptorData::Borrowed(data) => data,
            DescriptorData::Owned(data) => data,
        }
    }
}

#[derive(Debug)]
struct Record {
    kind: u8,
    index: u8,
    language: u16,
    data: DescriptorData,
}

impl Record {
    fn matches(&self, kind: u8, index: u8, language: u16) -> bool {
        self.kind == kind && self.index == index && self.language == language
    }
}

/// Holds device, configuration and string descriptors for enumeration.
///
/// No two entries share a (type, index, language) key. Records stay in
/// registration order.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    records: Vec<Record>,
}

impl DescriptorRegistry {
    /// Create an empty registry.
    pub const fn new() -> Self {
        DescriptorRegistry {
            records: Vec::new(),
        }
    }

    /// Add a descriptor.
    ///
    /// Returns `AlreadyConfigured` if the key is taken.
    pub fn register(
        &mut self,
        kind: u8,
        index: u8,
        language: u16,
        data: DescriptorData,
    ) -> Result<()> {
        if self.position(kind, index, language).is_some() {
            warn!(
                "DESCRIPTOR {:#04X}/{}/{:#06X} ALREADY REGISTERED",
                kind, index, language
            );
            return Err(Error::AlreadyConfigured);
        }
        self.records
            .try_reserve(1)
            .map_err(|_| Error::OutOfMemory)?;
        self.records.push(Record {
            kind,
            index,
            language,
            data,
        });
        debug!(
            "DESCRIPTOR {:#04X}/{}/{:#06X} REGISTERED",
            kind, index, language
        );
        Ok(())
    }

    /// Add a descriptor that references static data.
    pub fn register_static(
        &mut self,
        kind: u8,
        index: u8,
        language: u16,
        data: &'static [u8],
    ) -> Result<()> {
        self.register(kind, index, language, DescriptorData::Borrowed(data))
    }

    /// Add a heap copy of `data`.
    pub fn register_copy(&mut self, kind: u8, index: u8, language: u16, data: &[u8]) -> Result<()> {
        if self.position(kind, index, language).is_some() {
            return Err(Error::AlreadyConfigured);
        }
        let data = DescriptorData::copy_from(data)?;
        self.register(kind, index, language, data)
    }

    /// Remove a descriptor, freeing it if it's owned.
    ///
    /// Returns `NotConfigured` if the key isn't registered.
    pub fn unregister(&mut self, kind: u8, index: u8, language: u16) -> Result<()> {
        let position = self
            .position(kind, index, language)
            .ok_or(Error::NotConfigured)?;
        self.records.remove(position);
        debug!(
            "DESCRIPTOR {:#04X}/{}/{:#06X} UNREGISTERED",
            kind, index, language
        );
        Ok(())
    }

    /// Find a descriptor.
    pub fn lookup(&self, kind: u8, index: u8, language: u16) -> Result<&[u8]> {
        self.records
            .iter()
            .find(|record| record.matches(kind, index, language))
            .map(|record| record.data.as_bytes())
            .ok_or(Error::NotFound)
    }

    /// Find the configuration descriptor of type `kind` whose
    /// `bConfigurationValue` is `value`.
    pub fn find_configuration(&self, kind: u8, value: u8) -> Option<&[u8]> {
        self.records
            .iter()
            .filter(|record| record.kind == kind)
            .map(|record| record.data.as_bytes())
            .find(|bytes| bytes.len() > 5 && bytes[5] == value)
    }

    /// Returns the number of registered descriptors.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Indicates that nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remove all descriptors.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    fn position(&self, kind: u8, index: u8, language: u16) -> Option<usize> {
        self.records
            .iter()
            .position(|record| record.matches(kind, index, language))
    }
}
