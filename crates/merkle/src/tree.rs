use ff::Field;
use thiserror::Error;
use tokamak_crypto::{
    field::field_from_be_bytes, pad32, poseidon, poseidon_raw, CryptoError, FieldElement,
    MAX_MT_LEAVES, MT_DEPTH, POSEIDON_INPUTS,
};

use crate::proof::MerkleProof;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MerkleError {
    #[error("leaf index {index} is out of range (capacity {capacity})")]
    IndexOutOfRange { index: usize, capacity: usize },
    #[error("tree index {0} is out of range")]
    TreeIndexOutOfRange(usize),
    #[error("{got} leaves exceed the tree capacity of {capacity}")]
    TooManyLeaves { got: usize, capacity: usize },
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type MerkleResult<T> = Result<T, MerkleError>;

/// The leaf committing to a storage `key` holding `value`: `poseidon(pad32(key) ‖ pad32(value))`.
///
/// Slots without a registered key use `leaf_value(&[], &[])`.
pub fn leaf_value(key: &[u8], value: &[u8]) -> FieldElement {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(&pad32(key));
    data[32..].copy_from_slice(&pad32(value));
    field_from_be_bytes(&poseidon(&data))
}

/// A Merkle tree of depth [MT_DEPTH] and arity [POSEIDON_INPUTS] hashed with [poseidon_raw].
///
/// All levels are kept in memory: `levels[0]` holds the (padded) leaves and `levels[MT_DEPTH]`
/// the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    levels: Vec<Vec<FieldElement>>,
}

impl MerkleTree {
    /// Builds a tree from its leaves, padding with zeros up to [MAX_MT_LEAVES].
    pub fn new(mut leaves: Vec<FieldElement>) -> MerkleResult<Self> {
        if leaves.len() > MAX_MT_LEAVES {
            return Err(MerkleError::TooManyLeaves {
                got: leaves.len(),
                capacity: MAX_MT_LEAVES,
            });
        }
        leaves.resize(MAX_MT_LEAVES, FieldElement::ZERO);

        let mut levels = Vec::with_capacity(MT_DEPTH + 1);
        levels.push(leaves);
        for level in 0..MT_DEPTH {
            let parents = levels[level]
                .chunks(POSEIDON_INPUTS)
                .map(poseidon_raw)
                .collect::<Result<Vec<_>, _>>()?;
            levels.push(parents);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> FieldElement {
        self.levels[MT_DEPTH][0]
    }

    pub fn leaves(&self) -> &[FieldElement] {
        &self.levels[0]
    }

    pub fn depth(&self) -> usize {
        MT_DEPTH
    }

    /// Generates the [MerkleProof] of the leaf at `leaf_index`.
    pub fn proof(&self, leaf_index: usize) -> MerkleResult<MerkleProof> {
        if leaf_index >= MAX_MT_LEAVES {
            return Err(MerkleError::IndexOutOfRange {
                index: leaf_index,
                capacity: MAX_MT_LEAVES,
            });
        }

        let mut siblings = Vec::with_capacity(MT_DEPTH);
        let mut path_indices = Vec::with_capacity(MT_DEPTH);

        let mut index = leaf_index;
        for level in &self.levels[..MT_DEPTH] {
            let position = index % POSEIDON_INPUTS;
            let start = index - position;

            siblings.push(
                level[start..start + POSEIDON_INPUTS]
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != position)
                    .map(|(_, node)| *node)
                    .collect(),
            );
            path_indices.push(position);

            index /= POSEIDON_INPUTS;
        }

        Ok(MerkleProof {
            root: self.root(),
            leaf: self.levels[0][leaf_index],
            leaf_index,
            siblings,
            path_indices,
        })
    }
}
