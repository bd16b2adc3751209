//! Read-only sources of pre-existing contract state.

use std::collections::HashMap;

use alloy::{
    eips::BlockId,
    primitives::{Address, Bytes, B256, U256},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::http::{Client, Http},
};
use anyhow::Result;
use futures::{future::BoxFuture, FutureExt};
use tracing::debug;

/// A source of contract code and storage at a given block.
///
/// Errors are returned as they come: no retries are attempted.
pub trait UpstreamSource: Send + Sync {
    fn get_code(&self, address: Address, block_number: u64) -> BoxFuture<'_, Result<Bytes>>;

    fn get_storage_at(
        &self,
        address: Address,
        key: B256,
        block_number: u64,
    ) -> BoxFuture<'_, Result<B256>>;
}

/// Fetches state from an Ethereum JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct RpcSource {
    provider: RootProvider<Http<Client>>,
}

impl RpcSource {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().on_http(url);
        Ok(Self { provider })
    }
}

impl UpstreamSource for RpcSource {
    fn get_code(&self, address: Address, block_number: u64) -> BoxFuture<'_, Result<Bytes>> {
        async move {
            let code = self
                .provider
                .get_code_at(address)
                .block_id(BlockId::number(block_number))
                .await?;
            debug!(%address, block_number, len = code.len(), "code fetched");
            Ok(code)
        }
        .boxed()
    }

    fn get_storage_at(
        &self,
        address: Address,
        key: B256,
        block_number: u64,
    ) -> BoxFuture<'_, Result<B256>> {
        async move {
            let value = self
                .provider
                .get_storage_at(address, U256::from_be_bytes(key.0))
                .block_id(BlockId::number(block_number))
                .await?;
            Ok(B256::from(value.to_be_bytes::<32>()))
        }
        .boxed()
    }
}

/// An in-memory source. Unknown code reads as empty and unknown slots as zero, whatever the block.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    code: HashMap<Address, Bytes>,
    storage: HashMap<(Address, B256), B256>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_code(mut self, address: Address, code: Bytes) -> Self {
        self.code.insert(address, code);
        self
    }

    pub fn with_storage(mut self, address: Address, key: B256, value: B256) -> Self {
        self.storage.insert((address, key), value);
        self
    }
}

impl UpstreamSource for MemorySource {
    fn get_code(&self, address: Address, _block_number: u64) -> BoxFuture<'_, Result<Bytes>> {
        let code = self.code.get(&address).cloned().unwrap_or_default();
        futures::future::ready(Ok(code)).boxed()
    }

    fn get_storage_at(
        &self,
        address: Address,
        key: B256,
        _block_number: u64,
    ) -> BoxFuture<'_, Result<B256>> {
        let value = self
            .storage
            .get(&(address, key))
            .copied()
            .unwrap_or_default();
        futures::future::ready(Ok(value)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, b256};

    use super::*;

    #[tokio::test]
    async fn test_memory_source() {
        let contract = address!("00000000000000000000000000000000000000cc");
        let key = b256!("0000000000000000000000000000000000000000000000000000000000000003");
        let value = b256!("00000000000000000000000000000000000000000000000000000000000000ff");

        let source = MemorySource::new()
            .with_code(contract, Bytes::from_static(&[0x60, 0x80]))
            .with_storage(contract, key, value);

        assert_eq!(
            source.get_code(contract, 1).await.unwrap(),
            Bytes::from_static(&[0x60, 0x80])
        );
        assert!(source.get_code(Address::ZERO, 1).await.unwrap().is_empty());
        assert_eq!(source.get_storage_at(contract, key, 1).await.unwrap(), value);
        assert_eq!(
            source.get_storage_at(contract, B256::ZERO, 1).await.unwrap(),
            B256::ZERO
        );
    }

    #[test]
    fn test_rpc_source_rejects_bad_url() {
        assert!(RpcSource::new("not a url").is_err());
    }
}
