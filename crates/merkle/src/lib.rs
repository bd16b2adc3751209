//! Fixed-depth Poseidon Merkle trees committing to the registered storage slots of an address.

pub mod forest;
pub mod proof;
pub mod tree;

pub use forest::MerkleForest;
pub use proof::MerkleProof;
pub use tree::{leaf_value, MerkleError, MerkleResult, MerkleTree};
