use alloy::primitives::{Address, B256};
use thiserror::Error;
use tokamak_crypto::{CryptoError, Layer};
use tokamak_merkle::MerkleError;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum StateManagerError {
    #[error("a crypto backend must be configured in `Common`")]
    MissingCryptoBackend,
    #[error("the state manager is already initialized")]
    AlreadyInitialized,
    #[error("the state manager is not initialized")]
    NotInitialized,
    #[error("a previous initialization failed, the state manager can not be used")]
    Poisoned,
    #[error("initialization requires storage addresses")]
    MissingStorageAddresses,
    #[error("initialization from an upstream source requires a block number")]
    MissingBlockNumber,
    #[error("initialization from an upstream source requires L1 and L2 key pairs")]
    MissingKeyPairs,
    #[error("account {0} does not exist")]
    AccountNotFound(Address),
    #[error("duplicated {layer:?} key {key} for address {address}")]
    DuplicateKey {
        address: Address,
        layer: Layer,
        key: B256,
    },
    #[error("{got} keys registered for address {address}, at most {capacity} allowed")]
    TooManyKeys {
        address: Address,
        got: usize,
        capacity: usize,
    },
    #[error("snapshot shape mismatch: {0}")]
    SnapshotShapeMismatch(String),
    #[error("root mismatch at address index {index}: declared {declared}, reconstructed {actual}")]
    RootMismatch {
        index: usize,
        declared: String,
        actual: String,
    },
    #[error("entry contract address mismatch: configured {expected}, snapshot has {got}")]
    ContractAddressMismatch { expected: Address, got: String },
    #[error("storage address {0} is not registered")]
    UnregisteredAddress(String),
    #[error("invalid permutation for address {address}: {reason}")]
    InvalidPermutation { address: Address, reason: String },
    #[error("invalid hex for `{field}`: {value}")]
    InvalidHex { field: &'static str, value: String },
    #[error(transparent)]
    Merkle(#[from] MerkleError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

pub type StateManagerResult<T> = Result<T, StateManagerError>;
