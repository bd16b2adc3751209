//! State manager of a Tokamak L2 channel.
//!
//! The manager loads the storage of the channel contracts, either from an Ethereum node or from
//! a [StateSnapshot], registers the storage keys it tracks and commits to them with one Merkle
//! tree per contract.

pub mod account;
pub mod config;
pub mod error;
pub mod manager;
pub mod snapshot;
pub mod source;
pub mod storage;

pub use account::{Account, AccountStore, StorageBacked};
pub use config::{
    ChannelParticipantConfig, ChannelStateConfig, ChannelStorageConfig, ContractCode,
    PermutationForAddress, RegisteredKeysForAddress, StateManagerOpts, StorageKeyPair,
    StorageKeysForAddress,
};
pub use error::{StateManagerError, StateManagerResult};
pub use manager::{InitSource, L2StateManager};
pub use snapshot::{
    validate_snapshot_json, KeyValue, SnapshotSummary, SnapshotValidationError, StateSnapshot,
};
pub use source::{MemorySource, RpcSource, UpstreamSource};
