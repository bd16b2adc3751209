use std::collections::BTreeMap;

use super::{StorageReader, StorageResult, StorageWriter, Transaction, TransactionalStorage};

/// A persistent storage implementation over a [sled::Db].
#[derive(Debug, Clone)]
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    pub fn new(db: sled::Db) -> Self {
        SledStorage { db }
    }

    /// Opens (or creates) the database at `path`.
    pub fn open(path: impl AsRef<std::path::Path>) -> StorageResult<Self> {
        Ok(Self::new(sled::open(path)?))
    }
}

impl StorageReader for SledStorage {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?.map(|ivec| ivec.to_vec()))
    }
}

impl StorageWriter for SledStorage {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.db.insert(key, value)?;
        Ok(())
    }
}

impl TransactionalStorage for SledStorage {
    type T<'a> = SledTransaction<'a>;

    fn transaction(&mut self) -> Self::T<'_> {
        SledTransaction::new(&mut self.db)
    }
}

/// A storage transaction applied to the database as a single [sled::Batch].
pub struct SledTransaction<'a> {
    db: &'a mut sled::Db,
    batch: sled::Batch,
    buffer: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl<'a> SledTransaction<'a> {
    pub fn new(db: &'a mut sled::Db) -> Self {
        SledTransaction {
            db,
            batch: sled::Batch::default(),
            buffer: BTreeMap::new(),
        }
    }
}

impl<'a> StorageReader for SledTransaction<'a> {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.buffer.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => Ok(self.db.get(key)?.map(|ivec| ivec.to_vec())),
        }
    }
}

impl<'a> StorageWriter for SledTransaction<'a> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.batch.insert(key, value);
        self.buffer.insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

impl<'a> Transaction for SledTransaction<'a> {
    fn commit(self) -> StorageResult<()> {
        self.db.apply_batch(self.batch)?;
        Ok(())
    }

    fn discard(self) {}
}
