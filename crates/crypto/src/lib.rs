//! Circuit-friendly primitives of the Tokamak L2: the Poseidon hash over the BLS12-381 scalar
//! field, EdDSA over JubJub built on top of it, and the address/key derivations that depend on
//! both.

pub mod address;
pub mod backend;
pub mod eddsa;
pub mod error;
pub mod field;
pub mod keys;
pub mod poseidon;

pub use address::{
    address_from_point, derive_address, l2_storage_key_from_address, user_storage_key, Layer,
};
pub use backend::{Chain, Common, CryptoBackend, PoseidonBackend};
pub use eddsa::{recover_public_key, Signature};
pub use error::{CryptoError, CryptoResult};
pub use field::{pad32, FieldElement};
pub use keys::{seed_signature, L2KeyPair};
pub use poseidon::{poseidon, poseidon_n2x_compress, poseidon_raw};

pub type Hash256 = [u8; 32];

/// Number of field elements absorbed by one Poseidon permutation (the hash arity).
pub const POSEIDON_INPUTS: usize = 2;

/// Depth of every per-address Merkle tree.
pub const MT_DEPTH: usize = 4;

/// Capacity of every per-address Merkle tree (`POSEIDON_INPUTS ^ MT_DEPTH`).
pub const MAX_MT_LEAVES: usize = POSEIDON_INPUTS.pow(MT_DEPTH as u32);

/// Domain tag mixed into the EdDSA nonce derivation, left padded to 32 bytes.
pub const DST_NONCE: Hash256 = dst_nonce();

/// Prefix of the wallet message whose signature seeds the L2 key pair.
pub const L2_PRV_KEY_MESSAGE: &str = "Tokamak-Private-App-Channel-";

const fn dst_nonce() -> Hash256 {
    let tag = "TokamakL2JS\u{2011}EDDSA\u{2011}NONCE\u{2011}v1".as_bytes();
    let mut out = [0u8; 32];
    let mut i = 0;
    while i < tag.len() {
        out[32 - tag.len() + i] = tag[i];
        i += 1;
    }
    out
}
