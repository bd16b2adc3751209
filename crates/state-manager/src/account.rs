//! A small key/value account store: accounts, contract code and storage slots, buffered in
//! memory until flushed to the underlying storage.

use std::{collections::BTreeMap, sync::Arc};

use alloy::primitives::{Address, Bytes, B256, U256};
use alloy_rlp::EMPTY_STRING_CODE;
use serde::{Deserialize, Serialize};
use tokamak_crypto::{field::unpad, CryptoBackend};
use tracing::debug;

use crate::{
    error::{StateManagerError, StateManagerResult},
    storage::{
        keys::{account_storage_key, code_storage_key, slot_storage_key},
        StorageReader, StorageResult, StorageWriter, Transaction, TransactionalStorage,
    },
};

/// Storage access shared by the account store and the state manager.
pub trait StorageBacked {
    /// Reads a storage slot, without leading zeros. Unset slots read as empty.
    fn get_storage(&self, address: &Address, key: &B256) -> StateManagerResult<Bytes>;

    /// Writes a storage slot. The account must exist.
    fn put_storage(&mut self, address: &Address, key: &B256, value: &[u8])
        -> StateManagerResult<()>;

    fn get_code(&self, address: &Address) -> StateManagerResult<Bytes>;

    /// Stores the code of `address` and updates the account code hash, opening the account if
    /// needed.
    fn put_code(&mut self, address: &Address, code: &[u8]) -> StateManagerResult<()>;

    /// Writes the pending changes to the underlying storage.
    fn flush(&mut self) -> StateManagerResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub storage_root: B256,
    pub code_hash: B256,
}

impl Account {
    /// An account without code nor storage, its commitments computed with `backend`.
    pub fn empty(backend: &dyn CryptoBackend) -> Self {
        Self {
            nonce: 0,
            balance: U256::ZERO,
            storage_root: B256::from(backend.keccak256(&[EMPTY_STRING_CODE])),
            code_hash: B256::from(backend.keccak256(&[])),
        }
    }
}

#[derive(Debug)]
pub struct AccountStore<S> {
    storage: S,
    pending: BTreeMap<Vec<u8>, Vec<u8>>,
    backend: Arc<dyn CryptoBackend>,
}

impl<S> AccountStore<S>
where
    S: StorageWriter + TransactionalStorage,
{
    pub fn new(storage: S, backend: Arc<dyn CryptoBackend>) -> Self {
        Self {
            storage,
            pending: BTreeMap::new(),
            backend,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn read(&self, key: &[u8]) -> StateManagerResult<Option<Vec<u8>>> {
        match self.pending.get(key) {
            Some(value) => Ok(Some(value.clone())),
            None => Ok(self.storage.get(key)?),
        }
    }

    pub fn put_account(&mut self, address: &Address, account: &Account) -> StateManagerResult<()> {
        let encoded = bincode::serialize(account).map_err(crate::storage::StorageError::from)?;
        self.pending.insert(account_storage_key(address), encoded);
        Ok(())
    }

    /// Opens an empty account at `address`, replacing any existing one.
    pub fn open_account(&mut self, address: &Address) -> StateManagerResult<()> {
        let account = Account::empty(self.backend.as_ref());
        self.put_account(address, &account)
    }

    pub fn get_account(&self, address: &Address) -> StateManagerResult<Option<Account>> {
        self.read(&account_storage_key(address))?
            .map(|bytes| bincode::deserialize(&bytes))
            .transpose()
            .map_err(|e| crate::storage::StorageError::from(e).into())
    }
}

impl<S> StorageBacked for AccountStore<S>
where
    S: StorageWriter + TransactionalStorage,
{
    fn get_storage(&self, address: &Address, key: &B256) -> StateManagerResult<Bytes> {
        Ok(self
            .read(&slot_storage_key(address, key))?
            .map(Bytes::from)
            .unwrap_or_default())
    }

    fn put_storage(
        &mut self,
        address: &Address,
        key: &B256,
        value: &[u8],
    ) -> StateManagerResult<()> {
        if self.get_account(address)?.is_none() {
            return Err(StateManagerError::AccountNotFound(*address));
        }
        self.pending
            .insert(slot_storage_key(address, key), unpad(value).to_vec());
        Ok(())
    }

    fn get_code(&self, address: &Address) -> StateManagerResult<Bytes> {
        Ok(self
            .read(&code_storage_key(address))?
            .map(Bytes::from)
            .unwrap_or_default())
    }

    fn put_code(&mut self, address: &Address, code: &[u8]) -> StateManagerResult<()> {
        let mut account = match self.get_account(address)? {
            Some(account) => account,
            None => Account::empty(self.backend.as_ref()),
        };
        account.code_hash = B256::from(self.backend.keccak256(code));

        self.pending.insert(code_storage_key(address), code.to_vec());
        self.put_account(address, &account)
    }

    fn flush(&mut self) -> StateManagerResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let mut txn = self.storage.transaction();
        let written = match stage(&mut txn, &self.pending) {
            Ok(written) => written,
            Err(e) => {
                txn.discard();
                return Err(e.into());
            }
        };
        txn.commit()?;

        let count = std::mem::take(&mut self.pending).len();
        debug!(count, written, "flushed pending writes");
        Ok(())
    }
}

/// Sets the pending records that differ from the stored ones, returning how many were set.
fn stage<T: Transaction>(
    txn: &mut T,
    pending: &BTreeMap<Vec<u8>, Vec<u8>>,
) -> StorageResult<usize> {
    let mut written = 0;
    for (key, value) in pending {
        if txn.get(key)?.as_ref() != Some(value) {
            txn.set(key, value)?;
            written += 1;
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};
    use tokamak_crypto::{poseidon, PoseidonBackend};

    use super::*;
    use crate::storage::{
        btree::{BTreeStorage, BTreeTransaction},
        sled::SledStorage,
        StorageError,
    };

    const ADDR: Address = address!("00000000000000000000000000000000000000aa");
    const SLOT: B256 = b256!("0000000000000000000000000000000000000000000000000000000000000001");

    fn store() -> AccountStore<BTreeStorage> {
        AccountStore::new(BTreeStorage::new(), Arc::new(PoseidonBackend))
    }

    /// In-memory storage whose commits fail while `fail_commits` is set. Counts the records
    /// set by successful commits.
    #[derive(Debug, Default)]
    struct FlakyStorage {
        inner: BTreeStorage,
        fail_commits: bool,
        committed: usize,
    }

    struct FlakyTransaction<'a> {
        inner: BTreeTransaction<'a>,
        fail: bool,
        sets: usize,
        committed: &'a mut usize,
    }

    impl StorageReader for FlakyStorage {
        fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
    }

    impl StorageWriter for FlakyStorage {
        fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
            self.inner.set(key, value)
        }
    }

    impl TransactionalStorage for FlakyStorage {
        type T<'a> = FlakyTransaction<'a>;

        fn transaction(&mut self) -> Self::T<'_> {
            let FlakyStorage {
                inner,
                fail_commits,
                committed,
            } = self;
            FlakyTransaction {
                inner: inner.transaction(),
                fail: *fail_commits,
                sets: 0,
                committed,
            }
        }
    }

    impl<'a> StorageReader for FlakyTransaction<'a> {
        fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }
    }

    impl<'a> StorageWriter for FlakyTransaction<'a> {
        fn set(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
            self.sets += 1;
            self.inner.set(key, value)
        }
    }

    impl<'a> Transaction for FlakyTransaction<'a> {
        fn commit(self) -> StorageResult<()> {
            if self.fail {
                self.inner.discard();
                return Err(StorageError::Codec(Box::new(bincode::ErrorKind::Custom(
                    "disk full".into(),
                ))));
            }
            self.inner.commit()?;
            *self.committed += self.sets;
            Ok(())
        }

        fn discard(self) {
            self.inner.discard();
        }
    }

    fn flaky_store() -> AccountStore<FlakyStorage> {
        AccountStore::new(FlakyStorage::default(), Arc::new(PoseidonBackend))
    }

    #[test]
    fn test_empty_account_commitments() {
        let account = Account::empty(&PoseidonBackend);
        assert_eq!(account.nonce, 0);
        assert_eq!(account.storage_root, B256::from(poseidon(&[0x80])));
        assert_eq!(account.code_hash, B256::from(poseidon(&[])));
    }

    #[test]
    fn test_put_storage_requires_account() {
        let mut store = store();
        assert!(matches!(
            store.put_storage(&ADDR, &SLOT, &[1]),
            Err(StateManagerError::AccountNotFound(_))
        ));

        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[0, 0, 7]).unwrap();
        assert_eq!(store.get_storage(&ADDR, &SLOT).unwrap(), Bytes::from_static(&[7]));
        assert!(store.get_storage(&ADDR, &B256::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_flush_commits_pending_writes() {
        let mut store = store();
        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[42]).unwrap();
        assert!(store.has_pending_changes());
        assert!(store.storage().is_empty());

        store.flush().unwrap();
        assert!(!store.has_pending_changes());
        assert_eq!(store.storage().len(), 2);
        assert_eq!(store.get_storage(&ADDR, &SLOT).unwrap(), Bytes::from_static(&[42]));
    }

    #[test]
    fn test_failed_flush_keeps_pending_writes() {
        let mut store = flaky_store();
        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[42]).unwrap();

        store.storage.fail_commits = true;
        assert!(matches!(
            store.flush(),
            Err(StateManagerError::Storage(StorageError::Codec(_)))
        ));
        assert!(store.has_pending_changes());
        assert!(store.storage().inner.is_empty());
        assert_eq!(store.get_storage(&ADDR, &SLOT).unwrap(), Bytes::from_static(&[42]));

        store.storage.fail_commits = false;
        store.flush().unwrap();
        assert!(!store.has_pending_changes());
        assert_eq!(store.storage().committed, 2);
        assert_eq!(
            store.storage().inner.get(&slot_storage_key(&ADDR, &SLOT)).unwrap(),
            Some(vec![42])
        );
    }

    #[test]
    fn test_flush_skips_unchanged_records() {
        let mut store = flaky_store();
        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[1]).unwrap();
        store.flush().unwrap();
        assert_eq!(store.storage().committed, 2);

        // Rewriting the same account is a no-op, the new slot value is not.
        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[2]).unwrap();
        store.flush().unwrap();
        assert_eq!(store.storage().committed, 3);
        assert!(!store.has_pending_changes());
    }

    #[test]
    fn test_put_code_updates_code_hash() {
        let mut store = store();
        store.put_code(&ADDR, &[0x60, 0x00]).unwrap();

        let account = store.get_account(&ADDR).unwrap().unwrap();
        assert_eq!(account.code_hash, B256::from(poseidon(&[0x60, 0x00])));
        assert_eq!(store.get_code(&ADDR).unwrap(), Bytes::from_static(&[0x60, 0x00]));
    }

    #[test]
    fn test_sled_backed_store() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let mut store = AccountStore::new(SledStorage::new(db), Arc::new(PoseidonBackend));

        store
            .put_account(&ADDR, &Account::empty(&PoseidonBackend))
            .unwrap();
        store.put_storage(&ADDR, &SLOT, &[9]).unwrap();
        store.flush().unwrap();

        assert_eq!(
            store.storage().get(&slot_storage_key(&ADDR, &SLOT)).unwrap(),
            Some(vec![9])
        );
        assert_eq!(
            store.get_account(&ADDR).unwrap(),
            Some(Account::empty(&PoseidonBackend))
        );
    }
}
