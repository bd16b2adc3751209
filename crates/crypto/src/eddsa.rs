//! Deterministic EdDSA over JubJub using [poseidon] as the only hash function.
//!
//! Nonces are derived from the private key and the message, so signing the same message twice
//! with the same key yields the same signature.

use jubjub::{AffinePoint, ExtendedPoint, Fr};

use crate::{
    error::{CryptoError, CryptoResult},
    field::{
        field_to_be_bytes, pad32, scalar_from_be_bytes, scalar_from_be_bytes_reduced,
        scalar_to_be_bytes,
    },
    poseidon::poseidon,
    FieldElement, Hash256, DST_NONCE,
};

/// The base point `BASE`, a generator of the prime order subgroup.
const BASE: AffinePoint = AffinePoint::from_raw_unchecked(
    FieldElement::from_raw([
        0x3e6b_0714_92d1_122b,
        0xe72f_6afd_7d1f_7262,
        0x86a3_65b9_9fbf_3d3b,
        0x11da_fe5d_23e1_2180,
    ]),
    FieldElement::from_raw([
        0xcc3f_870e_59d2_92aa,
        0x3e26_ba5c_c220_fed7,
        0x9313_2e78_c866_c0c3,
        0x1d52_3cf1_ddab_1a17,
    ]),
);

/// An EdDSA signature: the commitment point `R` and the response scalar `S`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signature {
    pub r: ExtendedPoint,
    pub s: Fr,
}

impl Signature {
    /// Compressed encoding of `R`.
    pub fn r_bytes(&self) -> Hash256 {
        compress_point(&self.r)
    }

    /// Big-endian encoding of `S`.
    pub fn s_bytes(&self) -> Hash256 {
        scalar_to_be_bytes(&self.s)
    }
}

pub fn base_point() -> ExtendedPoint {
    ExtendedPoint::from(BASE)
}

/// Derives the public key of `private_key`.
pub fn public_key(private_key: &Fr) -> ExtendedPoint {
    base_point() * private_key
}

/// 32-byte compressed point encoding.
pub fn compress_point(point: &ExtendedPoint) -> Hash256 {
    AffinePoint::from(point).to_bytes()
}

/// Decodes a 32-byte compressed point.
pub fn decompress_point(bytes: &[u8]) -> CryptoResult<ExtendedPoint> {
    let encoded: Hash256 = bytes.try_into().map_err(|_| {
        CryptoError::InvalidPointEncoding(format!("expected 32 bytes, got {}", bytes.len()))
    })?;

    Option::<AffinePoint>::from(AffinePoint::from_bytes(encoded))
        .map(ExtendedPoint::from)
        .ok_or_else(|| CryptoError::InvalidPointEncoding("point is not on the curve".into()))
}

/// Big-endian affine coordinates `(x ‖ y)` of a point.
pub fn point_to_xy_bytes(point: &ExtendedPoint) -> [u8; 64] {
    let affine = AffinePoint::from(point);
    let mut out = [0u8; 64];
    out[..32].copy_from_slice(&field_to_be_bytes(&affine.get_u()));
    out[32..].copy_from_slice(&field_to_be_bytes(&affine.get_v()));
    out
}

/// Signs the concatenation of the `message` parts.
pub fn sign(private_key: &Fr, message: &[&[u8]]) -> Signature {
    let public_key = public_key(private_key);
    let public_xy = point_to_xy_bytes(&public_key);

    let nonce_key = poseidon(&concat(&[&DST_NONCE[..], &scalar_to_be_bytes(private_key)[..]]));

    let mut nonce_input: Vec<&[u8]> = vec![&DST_NONCE[..], &nonce_key[..], &public_xy[..]];
    nonce_input.extend_from_slice(message);
    let r = scalar_from_be_bytes_reduced(&poseidon(&concat(&nonce_input)));

    let commitment = base_point() * r;
    let e = challenge(&commitment, &public_key, message);

    Signature {
        r: commitment,
        s: r + e * private_key,
    }
}

/// Verifies a signature over the concatenation of the `message` parts.
///
/// `s` is the big-endian encoding of `S`. Malformed inputs make the verification fail instead
/// of returning an error.
pub fn verify(message: &[&[u8]], public_key: &ExtendedPoint, r: &ExtendedPoint, s: &[u8]) -> bool {
    let Some(s) = scalar_from_be_bytes(s) else {
        return false;
    };
    if bool::from(public_key.is_identity()) || bool::from(r.is_identity()) {
        return false;
    }
    if message.is_empty() {
        return false;
    }

    let e = challenge(r, public_key, message);
    base_point() * s == public_key * e + r
}

/// Recovers the signer public key from `full_message`.
///
/// The last 32 bytes of `full_message` hold the claimed compressed public key, the bytes before
/// them are the signed payload. `r` is the compressed `R` (leading zeros may be stripped) and `s`
/// the big-endian `S`.
pub fn recover_public_key(
    full_message: &[u8],
    r: &[u8],
    s: &[u8],
    chain_id: Option<u64>,
) -> CryptoResult<Hash256> {
    if chain_id.is_some() {
        return Err(CryptoError::ChainIdUnsupported);
    }
    if full_message.len() < 32 || r.len() > 32 {
        return Err(CryptoError::SignatureInvalid(
            "malformed signature or message".into(),
        ));
    }

    let (payload, public_key_bytes) = full_message.split_at(full_message.len() - 32);
    let public_key = decompress_point(public_key_bytes)
        .map_err(|e| CryptoError::SignatureInvalid(e.to_string()))?;
    let commitment =
        decompress_point(&pad32(r)).map_err(|e| CryptoError::SignatureInvalid(e.to_string()))?;

    if !verify(&[payload], &public_key, &commitment, s) {
        return Err(CryptoError::SignatureInvalid(
            "signature verification failed".into(),
        ));
    }

    Ok(pad32(public_key_bytes))
}

fn challenge(r: &ExtendedPoint, public_key: &ExtendedPoint, message: &[&[u8]]) -> Fr {
    let r_xy = point_to_xy_bytes(r);
    let public_xy = point_to_xy_bytes(public_key);

    let mut input: Vec<&[u8]> = vec![&r_xy[..], &public_xy[..]];
    input.extend_from_slice(message);
    scalar_from_be_bytes_reduced(&poseidon(&concat(&input)))
}

fn concat(parts: &[&[u8]]) -> Vec<u8> {
    parts.concat()
}
