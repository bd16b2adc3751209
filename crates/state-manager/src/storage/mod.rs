use thiserror::Error;

pub mod btree;
pub mod keys;
pub mod sled;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("sled: {0}")]
    Sled(#[from] ::sled::Error),
    #[error("codec: {0}")]
    Codec(#[from] bincode::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Trait providing storage read access.
pub trait StorageReader {
    /// Fetches the `key` value from the storage.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
}

/// Trait providing storage write access.
pub trait StorageWriter: StorageReader {
    /// Sets the (key; value) pair in storage.
    fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;
}

/// Trait to implement for storages that allow atomic batch updates.
pub trait TransactionalStorage {
    type T<'a>: Transaction
    where
        Self: 'a;

    /// Returns a new [Transaction] for atomic batch updates.
    fn transaction(&mut self) -> Self::T<'_>;
}

/// A storage transaction that can be commited atomically or discarded.
pub trait Transaction: StorageWriter {
    /// Consumes the [Transaction] and apply its changes to the storage.
    fn commit(self) -> StorageResult<()>;

    /// Consumes the [Transaction] without applying its changes to the storage.
    fn discard(self);
}
