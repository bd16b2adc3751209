//! RLP encoding of a flat list of byte strings.

use alloy_rlp::{Encodable, Header};

use crate::error::{TransactionError, TransactionResult};

/// Encodes `fields` as an RLP list of byte strings.
pub fn encode_list(fields: &[&[u8]]) -> Vec<u8> {
    let payload_length = fields.iter().map(|field| field.length()).sum();
    let header = Header {
        list: true,
        payload_length,
    };

    let mut out = Vec::with_capacity(header.length() + payload_length);
    header.encode(&mut out);
    for field in fields {
        field.encode(&mut out);
    }
    out
}

/// Decodes an RLP list of byte strings. The whole input must be consumed and nested lists are
/// rejected.
pub fn decode_list(mut buf: &[u8]) -> TransactionResult<Vec<&[u8]>> {
    let header = Header::decode(&mut buf)?;
    if !header.list {
        return Err(alloy_rlp::Error::UnexpectedString.into());
    }
    if buf.len() != header.payload_length {
        return Err(TransactionError::InvalidField {
            field: "rlp",
            reason: format!(
                "list payload is {} bytes, {} available",
                header.payload_length,
                buf.len()
            ),
        });
    }

    let mut fields = Vec::new();
    while !buf.is_empty() {
        let header = Header::decode(&mut buf)?;
        if header.list {
            return Err(alloy_rlp::Error::UnexpectedList.into());
        }
        if buf.len() < header.payload_length {
            return Err(alloy_rlp::Error::InputTooShort.into());
        }
        let (field, rest) = buf.split_at(header.payload_length);
        fields.push(field);
        buf = rest;
    }

    Ok(fields)
}
