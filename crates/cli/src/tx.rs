use alloy::primitives::{hex, Address, Bytes};
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tokamak_crypto::{pad32, Chain, Common, L2KeyPair};
use tokamak_transaction::{L2Transaction, L2TxData, Signable};

/// An ERC-20 like transfer between two participants identified by their key seeds.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxConfig {
    pub sender_seed: String,
    pub recipient_seed: String,
    pub tx_nonce: u64,
    pub contract_address: Address,
    pub transfer_selector: String,
    pub amount: String,
}

impl TxConfig {
    /// `selector ‖ pad32(recipient) ‖ pad32(amount)`.
    pub fn calldata(&self) -> Result<Bytes> {
        let recipient = L2KeyPair::from_seed(&self.recipient_seed).address()?;

        let selector = decode_hex("transferSelector", &self.transfer_selector)?;
        ensure!(selector.len() <= 4, "transferSelector is longer than 4 bytes");
        let amount = decode_hex("amount", &self.amount)?;
        ensure!(amount.len() <= 32, "amount is longer than 32 bytes");

        let mut data = vec![0u8; 4 - selector.len()];
        data.extend_from_slice(&selector);
        data.extend_from_slice(&pad32(recipient.as_slice()));
        data.extend_from_slice(&pad32(&amount));
        Ok(Bytes::from(data))
    }

    /// Builds the transfer and signs it with the sender key.
    pub fn signed_transaction(&self) -> Result<L2Transaction> {
        let sender = L2KeyPair::from_seed(&self.sender_seed);
        let data = L2TxData {
            nonce: self.tx_nonce,
            to: self.contract_address,
            data: self.calldata()?,
            sender_public_key: Bytes::copy_from_slice(&sender.public_key),
            ..Default::default()
        };

        let tx = L2Transaction::new(data, Common::tokamak(Chain::Mainnet))?;
        Ok(tx.sign(&sender.private_key)?)
    }
}

/// Decodes a `0x`-prefixed hex string, accepting an odd digit count.
pub fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    let digits = value
        .strip_prefix("0x")
        .with_context(|| format!("{field} must be a hex string with 0x prefix"))?;
    let digits = if digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_owned()
    };
    hex::decode(digits).with_context(|| format!("{field} is not valid hex"))
}
