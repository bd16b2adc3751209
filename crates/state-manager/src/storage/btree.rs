use std::collections::BTreeMap;

use super::{StorageReader, StorageResult, StorageWriter, Transaction, TransactionalStorage};

/// A storage implementation over a [BTreeMap].
#[derive(Debug, Default, Clone)]
pub struct BTreeStorage {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl BTreeStorage {
    /// Creates a new [BTreeStorage].
    pub fn new() -> Self {
        BTreeStorage {
            data: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl StorageReader for BTreeStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }
}

impl StorageWriter for BTreeStorage {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl TransactionalStorage for BTreeStorage {
    type T<'a> = BTreeTransaction<'a>;

    fn transaction(&mut self) -> Self::T<'_> {
        BTreeTransaction::new(self)
    }
}

/// A storage transaction that can be created from a [BTreeStorage].
#[derive(Debug)]
pub struct BTreeTransaction<'a> {
    storage: &'a mut BTreeStorage,
    buffer: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl<'a> BTreeTransaction<'a> {
    /// Creates a new [BTreeTransaction].
    pub fn new(storage: &'a mut BTreeStorage) -> Self {
        BTreeTransaction {
            storage,
            buffer: BTreeMap::new(),
        }
    }
}

impl<'a> StorageReader for BTreeTransaction<'a> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.buffer.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => self.storage.get(key),
        }
    }
}

impl<'a> StorageWriter for BTreeTransaction<'a> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.buffer.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl<'a> Transaction for BTreeTransaction<'a> {
    fn commit(self) -> StorageResult<()> {
        self.storage.data.extend(self.buffer);
        Ok(())
    }

    fn discard(self) {}
}
