use anyhow::{ensure, Result};
use tokamak_crypto::{poseidon_raw, FieldElement, POSEIDON_INPUTS};

/// Membership proof of a leaf in a [crate::MerkleTree].
///
/// `siblings[level]` holds the `POSEIDON_INPUTS - 1` other children of the node on the path at
/// that level, and `path_indices[level]` the position of the path node among its siblings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub root: FieldElement,
    pub leaf: FieldElement,
    pub leaf_index: usize,
    pub siblings: Vec<Vec<FieldElement>>,
    pub path_indices: Vec<usize>,
}

impl MerkleProof {
    /// Recomputes the root from the leaf and its siblings and checks it against [Self::root].
    pub fn verify(&self) -> Result<()> {
        ensure!(
            self.siblings.len() == self.path_indices.len(),
            "MerkleProof.siblings and MerkleProof.path_indices lengths differ"
        );

        let mut node = self.leaf;
        for (siblings, position) in self.siblings.iter().zip(&self.path_indices) {
            ensure!(
                siblings.len() == POSEIDON_INPUTS - 1 && *position < POSEIDON_INPUTS,
                "MerkleProof level is malformed"
            );

            let mut children = siblings.clone();
            children.insert(*position, node);
            node = poseidon_raw(&children)?;
        }

        ensure!(node == self.root, "MerkleProof.root does not match");
        Ok(())
    }
}
