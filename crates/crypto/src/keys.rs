//! L2 key pairs derived from a wallet signature.

use alloy::{hex, primitives::Address};
use jubjub::Fr;

use crate::{
    address::derive_address,
    eddsa::{compress_point, public_key},
    error::{CryptoError, CryptoResult},
    field::{pad32, scalar_from_be_bytes, scalar_from_be_bytes_reduced, scalar_to_be_bytes},
    poseidon::poseidon,
    Hash256, L2_PRV_KEY_MESSAGE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct L2KeyPair {
    /// Big-endian private scalar.
    pub private_key: Hash256,
    /// Compressed public key.
    pub public_key: Hash256,
}

impl L2KeyPair {
    /// Derives the key pair from the hex signature of [Self::message_to_sign]:
    /// `sk = poseidon(utf8(signature)) mod ORDER`.
    pub fn from_signature(signature: &str) -> Self {
        let sk = scalar_from_be_bytes_reduced(&poseidon(signature.as_bytes()));
        Self::from_scalar(&sk)
    }

    /// Derives a key pair from a plain seed, standing in for a wallet signature in tests and
    /// local tooling.
    pub fn from_seed(seed: &str) -> Self {
        Self::from_signature(&seed_signature(seed))
    }

    /// Builds the key pair of a big-endian private key.
    pub fn from_private_key(private_key: &[u8]) -> CryptoResult<Self> {
        let sk = scalar_from_be_bytes(private_key).ok_or(CryptoError::PrivateKeyOutOfRange)?;
        Ok(Self::from_scalar(&sk))
    }

    fn from_scalar(sk: &Fr) -> Self {
        Self {
            private_key: scalar_to_be_bytes(sk),
            public_key: compress_point(&public_key(sk)),
        }
    }

    /// The message a wallet signs to derive the L2 key pair of a channel.
    pub fn message_to_sign(channel_id: &str) -> String {
        format!("{L2_PRV_KEY_MESSAGE}{channel_id}")
    }

    pub fn address(&self) -> CryptoResult<Address> {
        derive_address(&self.public_key)
    }
}

/// The stand-in signature of a seed: `0x ‖ hex(pad32(utf8(seed)))`.
pub fn seed_signature(seed: &str) -> String {
    format!("0x{}", hex::encode(pad32(seed.as_bytes())))
}
