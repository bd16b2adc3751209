use tokamak_crypto::FieldElement;
use tracing::debug;

use crate::{
    proof::MerkleProof,
    tree::{MerkleError, MerkleResult, MerkleTree},
};

/// An ordered list of `(key, tree)` entries, one tree per registered storage address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleForest<K> {
    entries: Vec<(K, MerkleTree)>,
}

impl<K> MerkleForest<K>
where
    K: PartialEq + std::fmt::Debug,
{
    /// Builds one tree per entry, keeping the entries order.
    pub fn build(leaves: Vec<(K, Vec<FieldElement>)>) -> MerkleResult<Self> {
        let entries = leaves
            .into_iter()
            .map(|(key, leaves)| {
                let tree = MerkleTree::new(leaves)?;
                debug!(?key, root = ?tree.root(), "Merkle tree built");
                Ok((key, tree))
            })
            .collect::<MerkleResult<Vec<_>>>()?;

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// The roots of every tree, in entry order.
    pub fn roots(&self) -> Vec<FieldElement> {
        self.entries.iter().map(|(_, tree)| tree.root()).collect()
    }

    pub fn tree(&self, index: usize) -> Option<&MerkleTree> {
        self.entries.get(index).map(|(_, tree)| tree)
    }

    pub fn root_of(&self, key: &K) -> Option<FieldElement> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, tree)| tree.root())
    }

    /// Generates the proof of leaf `leaf_index` in tree `tree_index`.
    pub fn proof(&self, tree_index: usize, leaf_index: usize) -> MerkleResult<MerkleProof> {
        self.tree(tree_index)
            .ok_or(MerkleError::TreeIndexOutOfRange(tree_index))?
            .proof(leaf_index)
    }
}
