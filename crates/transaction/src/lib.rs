//! The Tokamak L2 transaction: a legacy-shaped transaction signed with EdDSA over JubJub and
//! serialized as a 7 element RLP list.

pub mod codec;
pub mod error;
pub mod transaction;

pub use error::{TransactionError, TransactionResult};
pub use transaction::{L2Transaction, L2TxData, Serializable, Signable, TxSignature};

/// The only `v` value a signed transaction carries.
pub const TX_SIGNATURE_V: u64 = 27;

/// Number of 32-byte calldata words after the selector covered by the signature.
pub const TX_MESSAGE_INPUT_WORDS: usize = 9;

/// Number of fields of the RLP wire format.
pub const TX_RLP_FIELDS: usize = 7;
