use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};
use tokamak_crypto::{
    derive_address,
    eddsa::{self, decompress_point},
    field::{scalar_from_be_bytes, unpad},
    pad32, Common, CryptoBackend, Hash256,
};
use tracing::debug;

use crate::{
    codec::{decode_list, encode_list},
    error::{TransactionError, TransactionResult},
    TX_MESSAGE_INPUT_WORDS, TX_RLP_FIELDS, TX_SIGNATURE_V,
};

/// A value that can produce the message it is signed over and be signed.
pub trait Signable: Sized {
    /// The 32-byte words covered by the signature.
    fn message_to_sign(&self) -> TransactionResult<Vec<Hash256>>;

    fn is_signed(&self) -> bool;

    /// Returns a signed copy of `self`.
    fn sign(&self, private_key: &[u8]) -> TransactionResult<Self>;
}

/// A value with a byte-level wire format.
pub trait Serializable {
    /// The list of byte strings making up the wire format.
    fn raw(&self) -> Vec<Bytes>;

    fn serialize(&self) -> Bytes;
}

/// Construction input of an [L2Transaction].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct L2TxData {
    pub nonce: u64,
    pub to: Address,
    pub data: Bytes,
    /// Compressed JubJub public key of the sender.
    pub sender_public_key: Bytes,
    pub v: Option<u64>,
    /// Compressed EdDSA commitment `R`, read as a big-endian integer.
    pub r: Option<U256>,
    /// EdDSA response `S`.
    pub s: Option<U256>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxSignature {
    pub v: u64,
    pub r: U256,
    pub s: U256,
}

/// An L2 transaction.
///
/// Values are immutable: [Signable::sign] returns a new signed transaction.
#[derive(Debug, Clone)]
pub struct L2Transaction {
    nonce: u64,
    to: Address,
    data: Bytes,
    sender_public_key: Bytes,
    signature: Option<TxSignature>,
    common: Common,
    backend: Arc<dyn CryptoBackend>,
}

impl L2Transaction {
    /// Creates a transaction from its fields.
    ///
    /// `common` must carry a crypto backend, and the signature fields must be all present or all
    /// absent.
    pub fn new(data: L2TxData, common: Common) -> TransactionResult<Self> {
        let backend = common
            .custom_crypto
            .clone()
            .ok_or(TransactionError::MissingCryptoBackend)?;

        let signature = match (data.v, data.r, data.s) {
            (Some(v), Some(r), Some(s)) => Some(TxSignature { v, r, s }),
            (None, None, None) => None,
            _ => return Err(TransactionError::PartialSignature),
        };

        Ok(Self {
            nonce: data.nonce,
            to: data.to,
            data: data.data,
            sender_public_key: data.sender_public_key,
            signature,
            common,
            backend,
        })
    }

    /// Decodes a transaction from its RLP serialization. The signature is not verified.
    pub fn from_rlp(serialized: &[u8], common: Common) -> TransactionResult<Self> {
        let values = decode_list(serialized)?;
        Self::from_values(&values, common)
    }

    /// Builds a transaction from the 7 wire format fields
    /// `[nonce, to, data, senderPublicKey, v, r, s]`.
    pub fn from_values(values: &[&[u8]], common: Common) -> TransactionResult<Self> {
        let [nonce, to, data, sender_public_key, v, r, s] = values else {
            return Err(TransactionError::InvalidFieldCount {
                expected: TX_RLP_FIELDS,
                got: values.len(),
            });
        };

        for (field, bytes) in [("nonce", nonce), ("v", v), ("r", r), ("s", s)] {
            if bytes.first() == Some(&0) {
                return Err(TransactionError::LeadingZero(field));
            }
        }

        let to = Address::try_from(*to).map_err(|_| TransactionError::InvalidField {
            field: "to",
            reason: format!("expected 20 bytes, got {}", to.len()),
        })?;

        let data = L2TxData {
            nonce: decode_u64("nonce", nonce)?,
            to,
            data: Bytes::copy_from_slice(data),
            sender_public_key: Bytes::copy_from_slice(sender_public_key),
            v: optional(v, |bytes| decode_u64("v", bytes))?,
            r: optional(r, |bytes| decode_u256("r", bytes))?,
            s: optional(s, |bytes| decode_u256("s", bytes))?,
        };

        Self::new(data, common)
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn to(&self) -> Address {
        self.to
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn signature(&self) -> Option<&TxSignature> {
        self.signature.as_ref()
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    /// The public key the transaction was created with. It is not checked against the
    /// signature; use [Self::sender_public_key] for that.
    pub fn stored_sender_public_key(&self) -> &Bytes {
        &self.sender_public_key
    }

    /// The first 4 bytes of the calldata.
    pub fn function_selector(&self) -> TransactionResult<&[u8]> {
        if self.data.len() < 4 {
            return Err(TransactionError::InsufficientCallData(self.data.len()));
        }
        Ok(&self.data[..4])
    }

    /// The 32-byte calldata word `index` after the selector, empty if the calldata is too short.
    pub fn function_input(&self, index: usize) -> &[u8] {
        let offset = 4 + 32 * index;
        self.data.get(offset..offset + 32).unwrap_or_default()
    }

    /// Recovers the sender public key through the configured backend and checks it against the
    /// stored one.
    pub fn sender_public_key(&self) -> TransactionResult<Hash256> {
        let signature = self.signature.ok_or(TransactionError::NotSigned)?;

        let mut message = self.message_to_sign()?.concat();
        message.extend_from_slice(&pad32(&self.sender_public_key));

        let recovered = self.backend.ecrecover(
            &message,
            signature.v,
            &signature.r.to_be_bytes_trimmed_vec(),
            &signature.s.to_be_bytes::<32>(),
            None,
        )?;

        if recovered.as_slice() != self.sender_public_key.as_ref() {
            return Err(TransactionError::RecoveredKeyMismatch);
        }
        Ok(recovered)
    }

    /// Returns `true` if the signature is valid for the stored sender public key.
    pub fn verify_signature(&self) -> bool {
        self.sender_public_key()
            .map(|public_key| !unpad(&public_key).is_empty())
            .unwrap_or(false)
    }

    /// The L2 address of the recovered sender.
    pub fn sender_address(&self) -> TransactionResult<Address> {
        let public_key = self.sender_public_key()?;
        Ok(derive_address(&public_key)?)
    }

    /// The backend hash of the serialized transaction.
    pub fn hash(&self) -> B256 {
        B256::from(self.backend.keccak256(&self.serialize()))
    }

    fn with_signature(&self, signature: TxSignature) -> Self {
        Self {
            signature: Some(signature),
            ..self.clone()
        }
    }
}

impl Signable for L2Transaction {
    /// `[nonce, to, selector, input_0 .. input_8]`, each left padded to 32 bytes.
    fn message_to_sign(&self) -> TransactionResult<Vec<Hash256>> {
        let mut message = Vec::with_capacity(3 + TX_MESSAGE_INPUT_WORDS);
        message.push(pad32(&self.nonce.to_be_bytes()));
        message.push(pad32(self.to.as_slice()));
        message.push(pad32(self.function_selector()?));
        for index in 0..TX_MESSAGE_INPUT_WORDS {
            message.push(pad32(self.function_input(index)));
        }
        Ok(message)
    }

    fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    fn sign(&self, private_key: &[u8]) -> TransactionResult<Self> {
        let sk = scalar_from_be_bytes(private_key).ok_or_else(|| {
            TransactionError::SignatureInvalid(
                "private key must be in the JubJub scalar field".into(),
            )
        })?;

        let message = self.message_to_sign()?;
        let parts: Vec<&[u8]> = message.iter().map(|word| word.as_slice()).collect();
        let signature = eddsa::sign(&sk, &parts);

        let public_key = eddsa::public_key(&sk);
        let stored = decompress_point(&self.sender_public_key)
            .map_err(|_| TransactionError::PublicKeyMismatch)?;
        if public_key != stored {
            return Err(TransactionError::PublicKeyMismatch);
        }

        if !eddsa::verify(&parts, &public_key, &signature.r, &signature.s_bytes()) {
            return Err(TransactionError::SignatureInvalid(
                "signature does not verify".into(),
            ));
        }

        debug!(nonce = self.nonce, to = %self.to, "transaction signed");

        Ok(self.with_signature(TxSignature {
            v: TX_SIGNATURE_V,
            r: U256::from_be_bytes(signature.r_bytes()),
            s: U256::from_be_bytes(signature.s_bytes()),
        }))
    }
}

impl Serializable for L2Transaction {
    /// `[nonce, to, data, senderPublicKey, v, r, s]` with minimal numeric fields, the signature
    /// fields being empty when unsigned.
    fn raw(&self) -> Vec<Bytes> {
        let (v, r, s) = match &self.signature {
            Some(signature) => (
                unpadded(&signature.v.to_be_bytes()),
                Bytes::from(signature.r.to_be_bytes_trimmed_vec()),
                Bytes::from(signature.s.to_be_bytes_trimmed_vec()),
            ),
            None => (Bytes::new(), Bytes::new(), Bytes::new()),
        };

        vec![
            unpadded(&self.nonce.to_be_bytes()),
            Bytes::copy_from_slice(self.to.as_slice()),
            self.data.clone(),
            self.sender_public_key.clone(),
            v,
            r,
            s,
        ]
    }

    fn serialize(&self) -> Bytes {
        let raw = self.raw();
        let fields: Vec<&[u8]> = raw.iter().map(|field| field.as_ref()).collect();
        Bytes::from(encode_list(&fields))
    }
}

fn unpadded(bytes: &[u8]) -> Bytes {
    Bytes::copy_from_slice(unpad(bytes))
}

fn optional<T>(
    bytes: &[u8],
    decode: impl FnOnce(&[u8]) -> TransactionResult<T>,
) -> TransactionResult<Option<T>> {
    if bytes.is_empty() {
        Ok(None)
    } else {
        decode(bytes).map(Some)
    }
}

fn decode_u64(field: &'static str, bytes: &[u8]) -> TransactionResult<u64> {
    if bytes.len() > 8 {
        return Err(TransactionError::InvalidField {
            field,
            reason: format!("{} bytes overflow a u64", bytes.len()),
        });
    }
    let mut be = [0u8; 8];
    be[8 - bytes.len()..].copy_from_slice(bytes);
    Ok(u64::from_be_bytes(be))
}

fn decode_u256(field: &'static str, bytes: &[u8]) -> TransactionResult<U256> {
    U256::try_from_be_slice(bytes).ok_or_else(|| TransactionError::InvalidField {
        field,
        reason: format!("{} bytes overflow a 256-bit integer", bytes.len()),
    })
}
