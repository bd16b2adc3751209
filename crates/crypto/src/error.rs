use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("expected {expected} field elements, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("invalid signature: {0}")]
    SignatureInvalid(String),
    #[error("invalid curve point encoding: {0}")]
    InvalidPointEncoding(String),
    #[error("EdDSA does not use a chain id to recover a public key")]
    ChainIdUnsupported,
    #[error("private key is not in the JubJub scalar field")]
    PrivateKeyOutOfRange,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
