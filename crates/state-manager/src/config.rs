//! Typed initialisation options of the state manager, and the channel configuration file they are
//! usually built from.

use alloy::primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};
use tokamak_crypto::{pad32, user_storage_key, Chain, Common, L2KeyPair, Layer};
use tracing::debug;

use crate::{
    error::{StateManagerError, StateManagerResult},
    snapshot::{decode_hex_number, format_key, KeyValue, StateSnapshot},
};

/// An L1 storage key and the L2 key its value is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageKeyPair {
    pub l1: B256,
    pub l2: B256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeysForAddress {
    pub address: Address,
    pub key_pairs: Vec<StorageKeyPair>,
}

/// The L2 keys registered for an address. The position of a key is its leaf index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredKeysForAddress {
    pub address: Address,
    pub keys: Vec<B256>,
}

/// Reorders the registered keys of `address`: the key at index `permutation[i]` moves to index `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermutationForAddress {
    pub address: Address,
    pub permutation: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCode {
    pub address: Address,
    pub code: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateManagerOpts {
    /// Block the upstream state is read at.
    pub block_number: Option<u64>,
    pub entry_contract_address: Address,
    /// Addresses whose accounts are opened. Defaults to the addresses of `init_storage_keys`.
    pub storage_addresses: Vec<Address>,
    pub init_storage_keys: Vec<StorageKeysForAddress>,
    /// Contracts whose code is loaded from the upstream source.
    pub call_code_addresses: Vec<Address>,
    /// Contract code loaded when initialising from a snapshot.
    pub contract_codes: Vec<ContractCode>,
}

impl StateManagerOpts {
    /// The addresses whose accounts are opened on initialisation.
    pub fn target_addresses(&self) -> Vec<Address> {
        if !self.storage_addresses.is_empty() {
            return self.storage_addresses.clone();
        }
        self.init_storage_keys.iter().map(|k| k.address).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelParticipantConfig {
    #[serde(rename = "addressL1")]
    pub address_l1: Address,
    /// Seed standing in for the participant's wallet signature.
    #[serde(rename = "prvSeedL2")]
    pub prv_seed_l2: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStorageConfig {
    pub address: Address,
    pub user_storage_slots: Vec<u64>,
    pub pre_allocated_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStateConfig {
    pub network: String,
    pub participants: Vec<ChannelParticipantConfig>,
    pub storage_configs: Vec<ChannelStorageConfig>,
    pub entry_contract_address: Address,
    pub call_code_addresses: Vec<Address>,
    pub block_number: u64,
}

impl ChannelStateConfig {
    pub fn from_json(json: &str) -> StateManagerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Chain parameters of the configured network, with the Tokamak crypto backend.
    pub fn common(&self) -> Common {
        Common::tokamak(Chain::from_network(&self.network))
    }

    /// L2 key pairs of the participants, in configuration order.
    pub fn participant_keys(&self) -> Vec<L2KeyPair> {
        self.participants
            .iter()
            .map(|p| L2KeyPair::from_seed(&p.prv_seed_l2))
            .collect()
    }

    /// Builds the initialisation options: pre-allocated keys map to themselves, then every user
    /// slot maps the participant L1 key to its L2 counterpart, participant by participant.
    pub fn to_state_manager_opts(&self) -> StateManagerResult<StateManagerOpts> {
        let l2_addresses = self
            .participant_keys()
            .iter()
            .map(L2KeyPair::address)
            .collect::<Result<Vec<_>, _>>()?;

        let mut init_storage_keys = Vec::with_capacity(self.storage_configs.len());
        for storage in &self.storage_configs {
            let mut key_pairs: Vec<StorageKeyPair> = storage
                .pre_allocated_keys()?
                .into_iter()
                .map(|key| StorageKeyPair { l1: key, l2: key })
                .collect();

            for slot in &storage.user_storage_slots {
                for (participant, l2_address) in self.participants.iter().zip(&l2_addresses) {
                    key_pairs.push(StorageKeyPair {
                        l1: user_storage_key(&participant.address_l1, *slot, Layer::L1),
                        l2: user_storage_key(l2_address, *slot, Layer::L2),
                    });
                }
            }

            debug!(address = %storage.address, keys = key_pairs.len(), "storage keys configured");
            init_storage_keys.push(StorageKeysForAddress {
                address: storage.address,
                key_pairs,
            });
        }

        Ok(StateManagerOpts {
            block_number: Some(self.block_number),
            entry_contract_address: self.entry_contract_address,
            storage_addresses: Vec::new(),
            init_storage_keys,
            call_code_addresses: self.call_code_addresses.clone(),
            contract_codes: Vec::new(),
        })
    }

    /// An empty snapshot of the configured storages, shaped to be passed to
    /// [capture_snapshot](crate::L2StateManager::capture_snapshot): pre-allocated keys are listed
    /// as pre-allocated leaves and every other registered key as a storage entry.
    pub fn snapshot_template(
        &self,
        channel_id: &str,
        registered: &[RegisteredKeysForAddress],
    ) -> StateManagerResult<StateSnapshot> {
        let mut snapshot = StateSnapshot {
            channel_id: channel_id.to_owned(),
            state_roots: Vec::with_capacity(registered.len()),
            storage_addresses: Vec::with_capacity(registered.len()),
            registered_keys: Vec::with_capacity(registered.len()),
            storage_entries: Vec::with_capacity(registered.len()),
            pre_allocated_leaves: Vec::with_capacity(registered.len()),
            entry_contract_address: self.entry_contract_address.to_string(),
        };

        for RegisteredKeysForAddress { address, keys } in registered {
            let pre_allocated = match self.storage_configs.iter().find(|s| s.address == *address) {
                Some(storage) => storage.pre_allocated_keys()?,
                None => Vec::new(),
            };
            let entry = |key: &B256| KeyValue {
                key: format_key(key),
                value: "0x".into(),
            };

            snapshot.state_roots.push("0x".into());
            snapshot.storage_addresses.push(address.to_string());
            snapshot
                .registered_keys
                .push(keys.iter().map(format_key).collect());
            snapshot.storage_entries.push(
                keys.iter()
                    .filter(|key| !pre_allocated.contains(key))
                    .map(entry)
                    .collect(),
            );
            snapshot.pre_allocated_leaves.push(
                keys.iter()
                    .filter(|key| pre_allocated.contains(key))
                    .map(entry)
                    .collect(),
            );
        }

        Ok(snapshot)
    }
}

impl ChannelStorageConfig {
    /// The pre-allocated keys, left padded to 32 bytes.
    pub fn pre_allocated_keys(&self) -> StateManagerResult<Vec<B256>> {
        self.pre_allocated_keys
            .iter()
            .map(|key| -> StateManagerResult<B256> {
                let bytes = decode_hex_number("preAllocatedKeys", key)?;
                if bytes.len() > 32 {
                    return Err(StateManagerError::InvalidHex {
                        field: "preAllocatedKeys",
                        value: key.clone(),
                    });
                }
                Ok(B256::from(pad32(&bytes)))
            })
            .collect()
    }
}
