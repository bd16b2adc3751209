//! Conversions between 32-byte big-endian words and the two fields in use: the hash field
//! ([FieldElement], the BLS12-381 scalar field, which is also the JubJub base field) and the
//! JubJub scalar field ([Fr]).

use jubjub::Fr;

use crate::Hash256;

/// An element of the Poseidon hash field.
pub type FieldElement = jubjub::Base;

/// Left pads `bytes` with zeros to 32 bytes. Longer inputs keep their last 32 bytes.
pub fn pad32(bytes: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    if bytes.len() >= 32 {
        out.copy_from_slice(&bytes[bytes.len() - 32..]);
    } else {
        out[32 - bytes.len()..].copy_from_slice(bytes);
    }
    out
}

/// Strips the leading zero bytes of a big-endian integer.
pub fn unpad(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

/// Reads up to 32 big-endian bytes as a field element, reducing modulo the field order.
pub fn field_from_be_bytes(bytes: &[u8]) -> FieldElement {
    FieldElement::from_bytes_wide(&wide_le(bytes))
}

/// Big-endian 32-byte representation of a field element.
pub fn field_to_be_bytes(value: &FieldElement) -> Hash256 {
    let mut out = value.to_bytes();
    out.reverse();
    out
}

/// Reads up to 32 big-endian bytes as a JubJub scalar, reducing modulo the subgroup order.
pub fn scalar_from_be_bytes_reduced(bytes: &[u8]) -> Fr {
    Fr::from_bytes_wide(&wide_le(bytes))
}

/// Reads up to 32 big-endian bytes as a JubJub scalar, returning `None` if the value is not
/// strictly below the subgroup order.
pub fn scalar_from_be_bytes(bytes: &[u8]) -> Option<Fr> {
    if unpad(bytes).len() > 32 {
        return None;
    }
    let mut le = pad32(bytes);
    le.reverse();
    Fr::from_bytes(&le).into()
}

/// Big-endian 32-byte representation of a JubJub scalar.
pub fn scalar_to_be_bytes(value: &Fr) -> Hash256 {
    let mut out = value.to_bytes();
    out.reverse();
    out
}

/// Little-endian 64-byte buffer holding the (at most 32 significant bytes) big-endian input.
fn wide_le(bytes: &[u8]) -> [u8; 64] {
    let mut wide = [0u8; 64];
    for (i, b) in pad32(bytes).iter().rev().enumerate() {
        wide[i] = *b;
    }
    wide
}
