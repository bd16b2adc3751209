//! The hashing/signature backend transactions and state managers are configured with.

use std::{fmt, sync::Arc};

use tracing::debug;

use crate::{eddsa::recover_public_key, error::CryptoResult, poseidon::poseidon, Hash256};

/// Hash and public key recovery functions used in place of Keccak-256 and ECDSA.
pub trait CryptoBackend: Send + Sync + fmt::Debug {
    /// The chain's general purpose hash.
    fn keccak256(&self, data: &[u8]) -> Hash256;

    /// Recovers the public key that signed `message`.
    fn ecrecover(
        &self,
        message: &[u8],
        v: u64,
        r: &[u8],
        s: &[u8],
        chain_id: Option<u64>,
    ) -> CryptoResult<Hash256>;
}

/// Poseidon hashing and EdDSA public key recovery.
#[derive(Debug, Default, Clone, Copy)]
pub struct PoseidonBackend;

impl CryptoBackend for PoseidonBackend {
    fn keccak256(&self, data: &[u8]) -> Hash256 {
        poseidon(data)
    }

    fn ecrecover(
        &self,
        message: &[u8],
        // `v` carries no information for EdDSA.
        _v: u64,
        r: &[u8],
        s: &[u8],
        chain_id: Option<u64>,
    ) -> CryptoResult<Hash256> {
        recover_public_key(message, r, s, chain_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Chain {
    #[default]
    Mainnet,
    Sepolia,
}

impl Chain {
    pub fn chain_id(&self) -> u64 {
        match self {
            Chain::Mainnet => 1,
            Chain::Sepolia => 11_155_111,
        }
    }

    /// Parses a network name as used in channel configuration files. Unknown names fall back
    /// to mainnet.
    pub fn from_network(network: &str) -> Self {
        if network.eq_ignore_ascii_case("sepolia") {
            Chain::Sepolia
        } else {
            Chain::Mainnet
        }
    }
}

/// Chain configuration shared by transactions and state managers.
#[derive(Debug, Clone)]
pub struct Common {
    pub chain: Chain,
    pub custom_crypto: Option<Arc<dyn CryptoBackend>>,
}

impl Common {
    /// A configuration without a crypto backend.
    pub fn new(chain: Chain) -> Self {
        Self {
            chain,
            custom_crypto: None,
        }
    }

    /// A configuration with the [PoseidonBackend] installed.
    pub fn tokamak(chain: Chain) -> Self {
        debug!(?chain, "installing poseidon crypto backend");
        Self {
            chain,
            custom_crypto: Some(Arc::new(PoseidonBackend)),
        }
    }

    pub fn backend(&self) -> Option<&Arc<dyn CryptoBackend>> {
        self.custom_crypto.as_ref()
    }
}
