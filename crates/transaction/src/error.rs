use thiserror::Error;
use tokamak_crypto::CryptoError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransactionError {
    #[error("a crypto backend must be configured in `Common`")]
    MissingCryptoBackend,
    #[error("insufficient transaction data: {0} bytes, a function selector needs 4")]
    InsufficientCallData(usize),
    #[error("the public key can only be recovered from a signed transaction")]
    NotSigned,
    #[error("signature fields must be all present or all absent")]
    PartialSignature,
    #[error("signature is invalid: {0}")]
    SignatureInvalid(String),
    #[error("the stored sender public key is not derived from the signing key")]
    PublicKeyMismatch,
    #[error("the recovered public key differs from the stored sender public key")]
    RecoveredKeyMismatch,
    #[error("expected {expected} RLP fields, got {got}")]
    InvalidFieldCount { expected: usize, got: usize },
    #[error("`{0}` has leading zero bytes")]
    LeadingZero(&'static str),
    #[error("invalid `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub type TransactionResult<T> = Result<T, TransactionError>;
