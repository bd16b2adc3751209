use std::collections::HashSet;

use alloy::primitives::{Address, Bytes, B256};
use futures::future::try_join_all;
use tokamak_crypto::{Common, FieldElement, Layer, MAX_MT_LEAVES};
use tokamak_merkle::{leaf_value, MerkleForest, MerkleProof};
use tracing::{debug, info, warn};

use crate::{
    account::{AccountStore, StorageBacked},
    config::{
        ContractCode, PermutationForAddress, RegisteredKeysForAddress, StateManagerOpts,
        StorageKeysForAddress,
    },
    error::{StateManagerError, StateManagerResult},
    snapshot::{
        format_key, format_root, format_value, parse_address, parse_key, parse_value,
        root_matches, KeyValue, StateSnapshot,
    },
    source::UpstreamSource,
    storage::{StorageWriter, TransactionalStorage},
};

/// Where the initial state comes from.
#[derive(Clone, Copy)]
pub enum InitSource<'a> {
    Upstream(&'a dyn UpstreamSource),
    Snapshot(&'a StateSnapshot),
}

#[derive(Debug)]
enum ManagerState {
    Uninitialized,
    Initializing,
    Ready(Box<ReadyState>),
    /// A previous initialisation failed midway.
    Failed,
}

#[derive(Debug)]
struct ReadyState {
    opts: StateManagerOpts,
    registered_keys: Vec<RegisteredKeysForAddress>,
    initial_forest: MerkleForest<Address>,
}

/// Keeps the storage of the channel contracts and commits to it with one Merkle tree per storage
/// address, the registered keys of an address being the leaves of its tree.
#[derive(Debug)]
pub struct L2StateManager<S> {
    accounts: AccountStore<S>,
    common: Common,
    state: ManagerState,
}

impl<S> L2StateManager<S>
where
    S: StorageWriter + TransactionalStorage,
{
    pub fn new(storage: S, common: Common) -> StateManagerResult<Self> {
        let backend = common
            .backend()
            .cloned()
            .ok_or(StateManagerError::MissingCryptoBackend)?;

        Ok(Self {
            accounts: AccountStore::new(storage, backend),
            common,
            state: ManagerState::Uninitialized,
        })
    }

    /// Loads the initial state, registers the storage keys and builds the initial forest.
    ///
    /// Can only succeed once. Any failure leaves the manager unusable.
    pub async fn init_from_source(
        &mut self,
        source: InitSource<'_>,
        opts: StateManagerOpts,
    ) -> StateManagerResult<()> {
        match self.state {
            ManagerState::Uninitialized => {}
            ManagerState::Failed => return Err(StateManagerError::Poisoned),
            _ => return Err(StateManagerError::AlreadyInitialized),
        }
        self.state = ManagerState::Initializing;

        match self.initialize(source, &opts).await {
            Ok((registered_keys, initial_forest)) => {
                info!(
                    addresses = registered_keys.len(),
                    roots = ?initial_forest.roots(),
                    "State manager initialized"
                );
                self.state = ManagerState::Ready(Box::new(ReadyState {
                    opts,
                    registered_keys,
                    initial_forest,
                }));
                Ok(())
            }
            Err(err) => {
                warn!(%err, "State manager initialization failed");
                self.state = ManagerState::Failed;
                Err(err)
            }
        }
    }

    async fn initialize(
        &mut self,
        source: InitSource<'_>,
        opts: &StateManagerOpts,
    ) -> StateManagerResult<(Vec<RegisteredKeysForAddress>, MerkleForest<Address>)> {
        let targets = opts.target_addresses();
        if targets.is_empty() {
            return Err(StateManagerError::MissingStorageAddresses);
        }
        for address in &targets {
            self.accounts.open_account(address)?;
        }
        debug!(count = targets.len(), "Accounts opened");

        let registered_keys = match source {
            InitSource::Upstream(upstream) => self.load_upstream(upstream, opts).await?,
            InitSource::Snapshot(snapshot) => self.load_snapshot(snapshot, opts)?,
        };

        self.accounts.flush()?;
        let forest = self.build_forest(&registered_keys)?;

        if let InitSource::Snapshot(snapshot) = source {
            verify_roots(snapshot, &forest)?;
        }

        Ok((registered_keys, forest))
    }

    async fn load_upstream(
        &mut self,
        source: &dyn UpstreamSource,
        opts: &StateManagerOpts,
    ) -> StateManagerResult<Vec<RegisteredKeysForAddress>> {
        let block_number = opts
            .block_number
            .ok_or(StateManagerError::MissingBlockNumber)?;
        if opts.init_storage_keys.is_empty() {
            return Err(StateManagerError::MissingKeyPairs);
        }

        let codes = try_join_all(
            opts.call_code_addresses
                .iter()
                .map(|address| source.get_code(*address, block_number)),
        )
        .await?;
        for (address, code) in opts.call_code_addresses.iter().zip(&codes) {
            self.accounts.put_code(address, code)?;
        }

        let mut registered = Vec::with_capacity(opts.init_storage_keys.len());
        for StorageKeysForAddress { address, key_pairs } in &opts.init_storage_keys {
            check_capacity(address, key_pairs.len())?;
            check_unique(address, Layer::L1, key_pairs.iter().map(|pair| pair.l1))?;
            check_unique(address, Layer::L2, key_pairs.iter().map(|pair| pair.l2))?;

            let values = try_join_all(
                key_pairs
                    .iter()
                    .map(|pair| source.get_storage_at(*address, pair.l1, block_number)),
            )
            .await?;

            for (pair, value) in key_pairs.iter().zip(&values) {
                self.accounts.put_storage(address, &pair.l2, value.as_slice())?;
            }

            debug!(%address, keys = key_pairs.len(), "Storage keys registered");
            registered.push(RegisteredKeysForAddress {
                address: *address,
                keys: key_pairs.iter().map(|pair| pair.l2).collect(),
            });
        }

        Ok(registered)
    }

    fn load_snapshot(
        &mut self,
        snapshot: &StateSnapshot,
        opts: &StateManagerOpts,
    ) -> StateManagerResult<Vec<RegisteredKeysForAddress>> {
        for ContractCode { address, code } in &opts.contract_codes {
            self.accounts.put_code(address, code)?;
        }

        snapshot.check_shape()?;

        let per_address = snapshot
            .storage_addresses
            .iter()
            .zip(&snapshot.registered_keys)
            .zip(&snapshot.storage_entries)
            .zip(&snapshot.pre_allocated_leaves);

        let mut registered = Vec::with_capacity(snapshot.storage_addresses.len());
        for (((address, keys), entries), pre_allocated) in per_address {
            let address = parse_address("storageAddresses", address)?;
            let keys = keys
                .iter()
                .map(|key| parse_key(key))
                .collect::<StateManagerResult<Vec<_>>>()?;
            check_capacity(&address, keys.len())?;
            check_unique(&address, Layer::L2, keys.iter().copied())?;

            for entry in entries.iter().chain(pre_allocated) {
                let value = parse_value(&entry.value)?;
                self.accounts
                    .put_storage(&address, &parse_key(&entry.key)?, &value)?;
            }

            debug!(%address, keys = keys.len(), "Storage keys restored");
            registered.push(RegisteredKeysForAddress { address, keys });
        }

        Ok(registered)
    }

    /// Builds one tree per address, the leaf of a registered key committing to its current value.
    /// Unused leaves commit to an empty key and value.
    fn build_forest(
        &self,
        registered: &[RegisteredKeysForAddress],
    ) -> StateManagerResult<MerkleForest<Address>> {
        let mut leaves = Vec::with_capacity(registered.len());
        for RegisteredKeysForAddress { address, keys } in registered {
            let mut tree_leaves = Vec::with_capacity(MAX_MT_LEAVES);
            for index in 0..MAX_MT_LEAVES {
                let leaf = match keys.get(index) {
                    Some(key) => {
                        let value = self.accounts.get_storage(address, key)?;
                        leaf_value(key.as_slice(), &value)
                    }
                    None => leaf_value(&[], &[]),
                };
                tree_leaves.push(leaf);
            }
            leaves.push((*address, tree_leaves));
        }

        Ok(MerkleForest::build(leaves)?)
    }

    /// Reorders the registered keys of the given addresses. Addresses without a permutation keep
    /// their order. Nothing is changed if any permutation is invalid.
    pub fn permute(&mut self, permutations: &[PermutationForAddress]) -> StateManagerResult<()> {
        let ready = self.ready_mut()?;

        if let Some(unknown) = permutations.iter().find(|p| {
            !ready
                .registered_keys
                .iter()
                .any(|registered| registered.address == p.address)
        }) {
            return Err(StateManagerError::UnregisteredAddress(
                unknown.address.to_string(),
            ));
        }

        let permuted = ready
            .registered_keys
            .iter()
            .map(|registered| -> StateManagerResult<RegisteredKeysForAddress> {
                let keys = match permutations
                    .iter()
                    .find(|p| p.address == registered.address)
                {
                    Some(p) => apply_permutation(registered, &p.permutation)?,
                    None => registered.keys.clone(),
                };
                Ok(RegisteredKeysForAddress {
                    address: registered.address,
                    keys,
                })
            })
            .collect::<StateManagerResult<Vec<_>>>()?;

        ready.registered_keys = permuted;
        debug!(count = permutations.len(), "Registered keys permuted");
        Ok(())
    }

    /// Applies `permutations` if any, flushes and returns the root of every address tree.
    pub fn updated_roots(
        &mut self,
        permutations: Option<&[PermutationForAddress]>,
    ) -> StateManagerResult<Vec<FieldElement>> {
        match permutations {
            Some(permutations) => self.permute(permutations)?,
            None => {
                self.ready()?;
            }
        }

        self.accounts.flush()?;
        let forest = self.build_forest(&self.ready()?.registered_keys)?;
        Ok(forest.roots())
    }

    /// The `(tree, leaf)` position of `key` in the registered keys of `address`.
    pub fn leaf_index_of(&self, address: &Address, key: &B256) -> Option<(usize, usize)> {
        let ready = self.ready().ok()?;
        let tree = ready
            .registered_keys
            .iter()
            .position(|registered| registered.address == *address)?;
        let leaf = ready.registered_keys[tree]
            .keys
            .iter()
            .position(|registered| registered == key)?;
        Some((tree, leaf))
    }

    /// Proof of a leaf of the forest built on initialisation.
    pub fn merkle_proof(
        &self,
        tree_index: usize,
        leaf_index: usize,
    ) -> StateManagerResult<MerkleProof> {
        Ok(self
            .ready()?
            .initial_forest
            .proof(tree_index, leaf_index)?)
    }

    /// Captures the current state in the shape of `prior`: same addresses in the same order,
    /// current roots and registered keys, and refreshed values for every key `prior` lists.
    pub fn capture_snapshot(&mut self, prior: &StateSnapshot) -> StateManagerResult<StateSnapshot> {
        let expected = self.ready()?.opts.entry_contract_address;
        let declared = parse_address("entryContractAddress", &prior.entry_contract_address)?;
        if declared != expected {
            return Err(StateManagerError::ContractAddressMismatch {
                expected,
                got: prior.entry_contract_address.clone(),
            });
        }

        prior.check_shape()?;
        if prior.state_roots.len() != prior.storage_addresses.len() {
            return Err(StateManagerError::SnapshotShapeMismatch(format!(
                "stateRoots has {} entries, storageAddresses has {}",
                prior.state_roots.len(),
                prior.storage_addresses.len()
            )));
        }

        self.accounts.flush()?;
        let ready = self.ready()?;
        let roots = self.build_forest(&ready.registered_keys)?.roots();

        let count = prior.storage_addresses.len();
        let mut snapshot = StateSnapshot {
            channel_id: prior.channel_id.clone(),
            state_roots: Vec::with_capacity(count),
            storage_addresses: Vec::with_capacity(count),
            registered_keys: Vec::with_capacity(count),
            storage_entries: Vec::with_capacity(count),
            pre_allocated_leaves: Vec::with_capacity(count),
            entry_contract_address: prior.entry_contract_address.clone(),
        };

        let per_address = prior
            .storage_addresses
            .iter()
            .zip(&prior.storage_entries)
            .zip(&prior.pre_allocated_leaves);

        for ((address_hex, entries), pre_allocated) in per_address {
            let address = parse_address("storageAddresses", address_hex)?;
            let tree = ready
                .registered_keys
                .iter()
                .position(|registered| registered.address == address)
                .ok_or_else(|| StateManagerError::UnregisteredAddress(address_hex.clone()))?;

            snapshot.state_roots.push(format_root(&roots[tree]));
            snapshot.storage_addresses.push(address_hex.clone());
            snapshot
                .registered_keys
                .push(ready.registered_keys[tree].keys.iter().map(format_key).collect());
            snapshot
                .storage_entries
                .push(self.refresh_entries(&address, entries)?);
            snapshot
                .pre_allocated_leaves
                .push(self.refresh_entries(&address, pre_allocated)?);
        }

        info!(
            channel_id = %snapshot.channel_id,
            addresses = count,
            "State snapshot captured"
        );
        Ok(snapshot)
    }

    fn refresh_entries(
        &self,
        address: &Address,
        entries: &[KeyValue],
    ) -> StateManagerResult<Vec<KeyValue>> {
        entries
            .iter()
            .map(|entry| -> StateManagerResult<KeyValue> {
                let value = self.accounts.get_storage(address, &parse_key(&entry.key)?)?;
                Ok(KeyValue {
                    key: entry.key.clone(),
                    value: format_value(&value),
                })
            })
            .collect()
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ManagerState::Ready(_))
    }

    pub fn opts(&self) -> StateManagerResult<&StateManagerOpts> {
        Ok(&self.ready()?.opts)
    }

    pub fn registered_keys(&self) -> StateManagerResult<&[RegisteredKeysForAddress]> {
        Ok(&self.ready()?.registered_keys)
    }

    pub fn initial_forest(&self) -> StateManagerResult<&MerkleForest<Address>> {
        Ok(&self.ready()?.initial_forest)
    }

    pub fn storage_at(&self, address: &Address, key: &B256) -> StateManagerResult<Bytes> {
        self.get_storage(address, key)
    }

    pub fn code_at(&self, address: &Address) -> StateManagerResult<Bytes> {
        self.get_code(address)
    }

    fn ready(&self) -> StateManagerResult<&ReadyState> {
        match &self.state {
            ManagerState::Ready(ready) => Ok(ready),
            ManagerState::Failed => Err(StateManagerError::Poisoned),
            _ => Err(StateManagerError::NotInitialized),
        }
    }

    fn ready_mut(&mut self) -> StateManagerResult<&mut ReadyState> {
        match &mut self.state {
            ManagerState::Ready(ready) => Ok(ready),
            ManagerState::Failed => Err(StateManagerError::Poisoned),
            _ => Err(StateManagerError::NotInitialized),
        }
    }

    fn ensure_usable(&self) -> StateManagerResult<()> {
        match self.state {
            ManagerState::Failed => Err(StateManagerError::Poisoned),
            _ => Ok(()),
        }
    }
}

impl<S> StorageBacked for L2StateManager<S>
where
    S: StorageWriter + TransactionalStorage,
{
    fn get_storage(&self, address: &Address, key: &B256) -> StateManagerResult<Bytes> {
        self.ensure_usable()?;
        self.accounts.get_storage(address, key)
    }

    fn put_storage(
        &mut self,
        address: &Address,
        key: &B256,
        value: &[u8],
    ) -> StateManagerResult<()> {
        self.ensure_usable()?;
        self.accounts.put_storage(address, key, value)
    }

    fn get_code(&self, address: &Address) -> StateManagerResult<Bytes> {
        self.ensure_usable()?;
        self.accounts.get_code(address)
    }

    fn put_code(&mut self, address: &Address, code: &[u8]) -> StateManagerResult<()> {
        self.ensure_usable()?;
        self.accounts.put_code(address, code)
    }

    fn flush(&mut self) -> StateManagerResult<()> {
        self.ensure_usable()?;
        self.accounts.flush()
    }
}

fn check_capacity(address: &Address, count: usize) -> StateManagerResult<()> {
    if count > MAX_MT_LEAVES {
        return Err(StateManagerError::TooManyKeys {
            address: *address,
            got: count,
            capacity: MAX_MT_LEAVES,
        });
    }
    Ok(())
}

fn check_unique(
    address: &Address,
    layer: Layer,
    keys: impl IntoIterator<Item = B256>,
) -> StateManagerResult<()> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            return Err(StateManagerError::DuplicateKey {
                address: *address,
                layer,
                key,
            });
        }
    }
    Ok(())
}

/// `permuted[new] = keys[permutation[new]]`, `permutation` being a bijection over the key indices.
fn apply_permutation(
    registered: &RegisteredKeysForAddress,
    permutation: &[usize],
) -> StateManagerResult<Vec<B256>> {
    let invalid = |reason: String| StateManagerError::InvalidPermutation {
        address: registered.address,
        reason,
    };

    let count = registered.keys.len();
    if permutation.len() != count {
        return Err(invalid(format!(
            "expected {count} indices, got {}",
            permutation.len()
        )));
    }

    let mut seen = HashSet::with_capacity(count);
    for &old in permutation {
        if old >= count {
            return Err(invalid(format!("index {old} is out of range")));
        }
        if !seen.insert(old) {
            return Err(invalid(format!("index {old} is repeated")));
        }
    }

    Ok(permutation.iter().map(|&old| registered.keys[old]).collect())
}

fn verify_roots(
    snapshot: &StateSnapshot,
    forest: &MerkleForest<Address>,
) -> StateManagerResult<()> {
    if snapshot.state_roots.len() != forest.len() {
        return Err(StateManagerError::SnapshotShapeMismatch(format!(
            "stateRoots has {} entries, {} trees were built",
            snapshot.state_roots.len(),
            forest.len()
        )));
    }

    for (index, (declared, root)) in snapshot.state_roots.iter().zip(forest.roots()).enumerate() {
        if !root_matches(declared, &root)? {
            return Err(StateManagerError::RootMismatch {
                index,
                declared: declared.clone(),
                actual: format_root(&root),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};
    use tokamak_crypto::{Chain, CryptoBackend, PoseidonBackend};
    use tokamak_merkle::{MerkleError, MerkleTree};

    use super::*;
    use crate::{config::StorageKeyPair, source::MemorySource, storage::btree::BTreeStorage};

    const CONTRACT: Address = address!("00000000000000000000000000000000000000cc");
    const ENTRY: Address = address!("00000000000000000000000000000000000000ee");
    const L1_A: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000a1");
    const L1_B: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000b1");
    const L2_A: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000a2");
    const L2_B: B256 = b256!("00000000000000000000000000000000000000000000000000000000000000b2");
    const VALUE_A: B256 = b256!("0000000000000000000000000000000000000000000000000000000000000064");
    const VALUE_B: B256 = b256!("00000000000000000000000000000000000000000000000000000000000003e8");

    fn manager() -> L2StateManager<BTreeStorage> {
        L2StateManager::new(BTreeStorage::new(), Common::tokamak(Chain::Mainnet)).unwrap()
    }

    fn source() -> MemorySource {
        MemorySource::new()
            .with_code(CONTRACT, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]))
            .with_storage(CONTRACT, L1_A, VALUE_A)
            .with_storage(CONTRACT, L1_B, VALUE_B)
    }

    fn opts(key_pairs: Vec<StorageKeyPair>) -> StateManagerOpts {
        StateManagerOpts {
            block_number: Some(100),
            entry_contract_address: ENTRY,
            init_storage_keys: vec![StorageKeysForAddress {
                address: CONTRACT,
                key_pairs,
            }],
            call_code_addresses: vec![CONTRACT],
            ..Default::default()
        }
    }

    fn default_pairs() -> Vec<StorageKeyPair> {
        vec![
            StorageKeyPair { l1: L1_A, l2: L2_A },
            StorageKeyPair { l1: L1_B, l2: L2_B },
        ]
    }

    async fn ready_manager() -> L2StateManager<BTreeStorage> {
        let mut manager = manager();
        manager
            .init_from_source(InitSource::Upstream(&source()), opts(default_pairs()))
            .await
            .unwrap();
        manager
    }

    fn expected_root(entries: &[(B256, &[u8])]) -> FieldElement {
        let mut leaves: Vec<FieldElement> = entries
            .iter()
            .map(|(key, value)| leaf_value(key.as_slice(), value))
            .collect();
        leaves.resize(MAX_MT_LEAVES, leaf_value(&[], &[]));
        MerkleTree::new(leaves).unwrap().root()
    }

    fn prior_snapshot(manager: &L2StateManager<BTreeStorage>) -> StateSnapshot {
        let keys: Vec<String> = manager.registered_keys().unwrap()[0]
            .keys
            .iter()
            .map(format_key)
            .collect();

        StateSnapshot {
            channel_id: "0x01".into(),
            state_roots: vec!["0x".into()],
            storage_addresses: vec![CONTRACT.to_string()],
            registered_keys: vec![keys.clone()],
            storage_entries: vec![vec![KeyValue {
                key: keys[0].clone(),
                value: "0x".into(),
            }]],
            pre_allocated_leaves: vec![vec![KeyValue {
                key: keys[1].clone(),
                value: "0x".into(),
            }]],
            entry_contract_address: ENTRY.to_string(),
        }
    }

    #[test]
    fn test_new_requires_backend() {
        assert!(matches!(
            L2StateManager::new(BTreeStorage::new(), Common::new(Chain::Mainnet)),
            Err(StateManagerError::MissingCryptoBackend)
        ));
    }

    #[tokio::test]
    async fn test_init_from_upstream() {
        let manager = ready_manager().await;

        let registered = manager.registered_keys().unwrap();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].keys, vec![L2_A, L2_B]);

        // Values are stored under the L2 keys, without leading zeros.
        assert_eq!(manager.storage_at(&CONTRACT, &L2_A).unwrap(), Bytes::from_static(&[0x64]));
        assert_eq!(
            manager.storage_at(&CONTRACT, &L2_B).unwrap(),
            Bytes::from_static(&[0x03, 0xe8])
        );
        assert!(manager.storage_at(&CONTRACT, &L1_A).unwrap().is_empty());

        let code = manager.code_at(&CONTRACT).unwrap();
        assert_eq!(code, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]));
        let account = manager.accounts.get_account(&CONTRACT).unwrap().unwrap();
        assert_eq!(account.code_hash, B256::from(PoseidonBackend.keccak256(&code)));

        let root = expected_root(&[(L2_A, &[0x64][..]), (L2_B, &[0x03, 0xe8][..])]);
        assert_eq!(manager.initial_forest().unwrap().roots(), vec![root]);
        assert_eq!(manager.opts().unwrap().entry_contract_address, ENTRY);
    }

    #[tokio::test]
    async fn test_init_only_once() {
        let mut manager = ready_manager().await;
        let err = manager
            .init_from_source(InitSource::Upstream(&source()), opts(default_pairs()))
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::AlreadyInitialized));
    }

    #[tokio::test]
    async fn test_duplicate_key_poisons_manager() {
        let mut manager = manager();
        let pairs = vec![
            StorageKeyPair { l1: L1_A, l2: L2_A },
            StorageKeyPair { l1: L1_B, l2: L2_A },
        ];
        let err = manager
            .init_from_source(InitSource::Upstream(&source()), opts(pairs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateManagerError::DuplicateKey {
                layer: Layer::L2,
                key,
                ..
            } if key == L2_A
        ));

        assert!(matches!(
            manager
                .init_from_source(InitSource::Upstream(&source()), opts(default_pairs()))
                .await,
            Err(StateManagerError::Poisoned)
        ));
        assert!(matches!(
            manager.storage_at(&CONTRACT, &L2_A),
            Err(StateManagerError::Poisoned)
        ));
        assert!(matches!(manager.permute(&[]), Err(StateManagerError::Poisoned)));
    }

    #[tokio::test]
    async fn test_duplicate_l1_key() {
        let mut manager = manager();
        let pairs = vec![
            StorageKeyPair { l1: L1_A, l2: L2_A },
            StorageKeyPair { l1: L1_A, l2: L2_B },
        ];
        let err = manager
            .init_from_source(InitSource::Upstream(&source()), opts(pairs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateManagerError::DuplicateKey {
                layer: Layer::L1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_upstream_requirements() {
        let mut missing_block = opts(default_pairs());
        missing_block.block_number = None;
        let err = manager()
            .init_from_source(InitSource::Upstream(&source()), missing_block)
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::MissingBlockNumber));

        let err = manager()
            .init_from_source(InitSource::Upstream(&source()), StateManagerOpts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::MissingStorageAddresses));

        let no_keys = StateManagerOpts {
            block_number: Some(1),
            storage_addresses: vec![CONTRACT],
            ..Default::default()
        };
        let err = manager()
            .init_from_source(InitSource::Upstream(&source()), no_keys)
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::MissingKeyPairs));
    }

    #[tokio::test]
    async fn test_too_many_keys() {
        let pairs = (0..=MAX_MT_LEAVES as u8)
            .map(|i| StorageKeyPair {
                l1: B256::with_last_byte(i),
                l2: B256::with_last_byte(i),
            })
            .collect();
        let err = manager()
            .init_from_source(InitSource::Upstream(&source()), opts(pairs))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StateManagerError::TooManyKeys { got: 17, capacity: 16, .. }
        ));
    }

    #[test]
    fn test_operations_require_init() {
        let mut manager = manager();
        assert!(matches!(manager.permute(&[]), Err(StateManagerError::NotInitialized)));
        assert!(matches!(
            manager.updated_roots(None),
            Err(StateManagerError::NotInitialized)
        ));
        assert!(matches!(
            manager.merkle_proof(0, 0),
            Err(StateManagerError::NotInitialized)
        ));
        assert_eq!(manager.leaf_index_of(&CONTRACT, &L2_A), None);
    }

    #[tokio::test]
    async fn test_updated_roots_are_stable() {
        let mut manager = ready_manager().await;
        let initial = manager.initial_forest().unwrap().roots();

        assert_eq!(manager.updated_roots(None).unwrap(), initial);
        assert_eq!(manager.updated_roots(None).unwrap(), initial);
    }

    #[tokio::test]
    async fn test_updated_roots_track_writes() {
        let mut manager = ready_manager().await;
        let initial = manager.initial_forest().unwrap().roots();

        manager.put_storage(&CONTRACT, &L2_A, &[0x01]).unwrap();
        let updated = manager.updated_roots(None).unwrap();
        assert_ne!(updated, initial);
        assert_eq!(
            updated,
            vec![expected_root(&[(L2_A, &[0x01][..]), (L2_B, &[0x03, 0xe8][..])])]
        );
        // The initial forest is left untouched.
        assert_eq!(manager.initial_forest().unwrap().roots(), initial);
    }

    #[tokio::test]
    async fn test_permute() {
        let mut manager = ready_manager().await;
        let initial = manager.initial_forest().unwrap().roots();
        assert_eq!(manager.leaf_index_of(&CONTRACT, &L2_A), Some((0, 0)));

        let swap = PermutationForAddress {
            address: CONTRACT,
            permutation: vec![1, 0],
        };
        let roots = manager.updated_roots(Some(&[swap][..])).unwrap();
        assert_ne!(roots, initial);
        assert_eq!(
            roots,
            vec![expected_root(&[(L2_B, &[0x03, 0xe8][..]), (L2_A, &[0x64][..])])]
        );
        assert_eq!(manager.registered_keys().unwrap()[0].keys, vec![L2_B, L2_A]);
        assert_eq!(manager.leaf_index_of(&CONTRACT, &L2_A), Some((0, 1)));
        assert_eq!(manager.leaf_index_of(&CONTRACT, &L1_A), None);
        assert_eq!(manager.leaf_index_of(&ENTRY, &L2_A), None);
    }

    #[tokio::test]
    async fn test_invalid_permutations() {
        let mut manager = ready_manager().await;

        for permutation in [vec![0, 0], vec![0], vec![0, 2]] {
            let err = manager
                .permute(&[PermutationForAddress {
                    address: CONTRACT,
                    permutation,
                }])
                .unwrap_err();
            assert!(matches!(err, StateManagerError::InvalidPermutation { .. }));
        }
        assert!(matches!(
            manager.permute(&[PermutationForAddress {
                address: ENTRY,
                permutation: vec![],
            }]),
            Err(StateManagerError::UnregisteredAddress(_))
        ));

        // Failed permutations leave the keys untouched.
        assert_eq!(manager.registered_keys().unwrap()[0].keys, vec![L2_A, L2_B]);
    }

    #[tokio::test]
    async fn test_merkle_proofs() {
        let manager = ready_manager().await;
        for leaf in 0..MAX_MT_LEAVES {
            manager.merkle_proof(0, leaf).unwrap().verify().unwrap();
        }
        assert!(matches!(
            manager.merkle_proof(0, MAX_MT_LEAVES),
            Err(StateManagerError::Merkle(MerkleError::IndexOutOfRange { .. }))
        ));
        assert!(matches!(
            manager.merkle_proof(1, 0),
            Err(StateManagerError::Merkle(MerkleError::TreeIndexOutOfRange(1)))
        ));
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let mut original = ready_manager().await;
        let snapshot = original.capture_snapshot(&prior_snapshot(&original)).unwrap();

        assert_eq!(snapshot.channel_id, "0x01");
        assert_eq!(
            snapshot.state_roots,
            vec![format_root(&original.initial_forest().unwrap().roots()[0])]
        );
        assert_eq!(snapshot.storage_entries[0][0].value, "0x64");
        assert_eq!(snapshot.pre_allocated_leaves[0][0].value, "0x03e8");
        assert!(snapshot.validate().is_ok());

        let json = snapshot.to_json().unwrap();
        let restored_snapshot = StateSnapshot::from_json(&json).unwrap();

        let mut restored = manager();
        let opts = StateManagerOpts {
            entry_contract_address: ENTRY,
            storage_addresses: vec![CONTRACT],
            contract_codes: vec![ContractCode {
                address: CONTRACT,
                code: Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]),
            }],
            ..Default::default()
        };
        restored
            .init_from_source(InitSource::Snapshot(&restored_snapshot), opts)
            .await
            .unwrap();

        assert_eq!(
            restored.initial_forest().unwrap().roots(),
            original.initial_forest().unwrap().roots()
        );
        assert_eq!(
            restored.registered_keys().unwrap(),
            original.registered_keys().unwrap()
        );
        assert_eq!(
            restored.storage_at(&CONTRACT, &L2_B).unwrap(),
            Bytes::from_static(&[0x03, 0xe8])
        );
        assert_eq!(restored.code_at(&CONTRACT).unwrap(), original.code_at(&CONTRACT).unwrap());
        assert_eq!(restored.capture_snapshot(&snapshot).unwrap(), snapshot);
    }

    #[tokio::test]
    async fn test_snapshot_root_mismatch() {
        let mut original = ready_manager().await;
        let mut snapshot = original.capture_snapshot(&prior_snapshot(&original)).unwrap();
        snapshot.state_roots[0] = "0x1234".into();

        let opts = StateManagerOpts {
            storage_addresses: vec![CONTRACT],
            ..Default::default()
        };
        let err = manager()
            .init_from_source(InitSource::Snapshot(&snapshot), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::RootMismatch { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_snapshot_shape_mismatch() {
        let mut original = ready_manager().await;
        let mut snapshot = original.capture_snapshot(&prior_snapshot(&original)).unwrap();
        snapshot.registered_keys.push(vec![]);

        let opts = StateManagerOpts {
            storage_addresses: vec![CONTRACT],
            ..Default::default()
        };
        let err = manager()
            .init_from_source(InitSource::Snapshot(&snapshot), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, StateManagerError::SnapshotShapeMismatch(_)));
    }

    #[tokio::test]
    async fn test_capture_checks_prior_snapshot() {
        let mut manager = ready_manager().await;

        let mut wrong_entry = prior_snapshot(&manager);
        wrong_entry.entry_contract_address = CONTRACT.to_string();
        assert!(matches!(
            manager.capture_snapshot(&wrong_entry),
            Err(StateManagerError::ContractAddressMismatch { .. })
        ));

        let mut unknown = prior_snapshot(&manager);
        unknown.storage_addresses = vec![ENTRY.to_string()];
        assert!(matches!(
            manager.capture_snapshot(&unknown),
            Err(StateManagerError::UnregisteredAddress(_))
        ));

        let mut misshaped = prior_snapshot(&manager);
        misshaped.storage_entries.clear();
        assert!(matches!(
            manager.capture_snapshot(&misshaped),
            Err(StateManagerError::SnapshotShapeMismatch(_))
        ));
    }
}
