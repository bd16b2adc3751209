//! L2 addresses and storage keys.

use alloy::primitives::{Address, B256};
use jubjub::ExtendedPoint;
use tiny_keccak::{Hasher, Keccak};

use crate::{
    eddsa::{decompress_point, point_to_xy_bytes},
    error::{CryptoError, CryptoResult},
    field::pad32,
    poseidon::poseidon,
};

/// The layer a storage key is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    /// Keccak-256, the layer 1 mapping slot hash.
    L1,
    /// Poseidon.
    L2,
}

/// Derives the L2 address of a public key given either compressed (32 bytes) or as big-endian
/// affine coordinates (64 bytes).
pub fn derive_address(point_bytes: &[u8]) -> CryptoResult<Address> {
    match point_bytes.len() {
        32 => {
            let point = decompress_point(point_bytes)?;
            Ok(address_from_point(&point))
        }
        64 => Ok(address_from_xy(point_bytes)),
        len => Err(CryptoError::InvalidPointEncoding(format!(
            "expected 32 or 64 bytes, got {len}"
        ))),
    }
}

/// Derives the L2 address of a curve point.
pub fn address_from_point(point: &ExtendedPoint) -> Address {
    address_from_xy(&point_to_xy_bytes(point))
}

fn address_from_xy(xy: &[u8]) -> Address {
    let digest = poseidon(xy);
    Address::from_slice(&digest[12..])
}

/// Storage key of `slot` in a mapping keyed by `address`: `hash(pad32(address) ‖ pad32(slot))`.
pub fn user_storage_key(address: &Address, slot: u64, layer: Layer) -> B256 {
    let mut packed = [0u8; 64];
    packed[..32].copy_from_slice(&pad32(address.as_slice()));
    packed[32..].copy_from_slice(&pad32(&slot.to_be_bytes()));

    match layer {
        Layer::L1 => {
            let mut hasher = Keccak::v256();
            let mut digest = [0u8; 32];
            hasher.update(&packed);
            hasher.finalize(&mut digest);
            B256::from(digest)
        }
        Layer::L2 => B256::from(poseidon(&packed)),
    }
}

pub fn l2_storage_key_from_address(address: &Address, slot: u64) -> B256 {
    user_storage_key(address, slot, Layer::L2)
}
