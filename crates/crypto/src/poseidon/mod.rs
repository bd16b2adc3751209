//! Fixed-arity Poseidon compression and its extension to byte strings of any length.
//!
//! [poseidon] splits a message into 32-byte big-endian words and repeatedly folds the sequence
//! into chunks of [POSEIDON_INPUTS] words until a single element remains. When a folding round
//! covers a multiple of `POSEIDON_INPUTS²` padded children, it compresses groups of
//! `POSEIDON_INPUTS²` at once with [poseidon_n2x_compress], which is equivalent to two
//! plain rounds over the same group.

mod params;

use ff::Field;
use poseidon_primitives::poseidon::primitives::{ConstantLengthIden3, Hash};

use crate::{
    error::{CryptoError, CryptoResult},
    field::{field_from_be_bytes, field_to_be_bytes},
    FieldElement, Hash256, POSEIDON_INPUTS,
};

use params::{Bls12T3, PoseidonField, RATE, WIDTH};

const N2X_INPUTS: usize = POSEIDON_INPUTS * POSEIDON_INPUTS;

/// Capacity element in `state[0]`, inputs in the rest, output read from `state[0]`.
type Hasher = Hash<PoseidonField, Bls12T3, ConstantLengthIden3<POSEIDON_INPUTS>, WIDTH, RATE>;

/// Applies the Poseidon permutation to exactly [POSEIDON_INPUTS] field elements.
pub fn poseidon_raw(inputs: &[FieldElement]) -> CryptoResult<FieldElement> {
    if inputs.len() != POSEIDON_INPUTS {
        return Err(CryptoError::Arity {
            expected: POSEIDON_INPUTS,
            got: inputs.len(),
        });
    }
    Ok(compress(inputs))
}

/// Compresses `POSEIDON_INPUTS²` elements through a two level tree of [poseidon_raw] calls.
pub fn poseidon_n2x_compress(inputs: &[FieldElement]) -> CryptoResult<FieldElement> {
    if inputs.len() != N2X_INPUTS {
        return Err(CryptoError::Arity {
            expected: N2X_INPUTS,
            got: inputs.len(),
        });
    }
    Ok(compress_n2x(inputs))
}

/// Hashes an arbitrary byte string into a 32-byte big-endian digest.
pub fn poseidon(message: &[u8]) -> Hash256 {
    if message.is_empty() {
        return field_to_be_bytes(&compress(&[FieldElement::ZERO; POSEIDON_INPUTS]));
    }

    let words: Vec<FieldElement> = message.chunks(32).map(field_from_be_bytes).collect();
    field_to_be_bytes(&poseidon_words(&words))
}

/// Folds a non-empty sequence of field elements down to a single element.
///
/// An empty sequence folds to the digest of [POSEIDON_INPUTS] zeros, like the empty message.
pub fn poseidon_words(words: &[FieldElement]) -> FieldElement {
    let mut acc = fold(words);
    while acc.len() > 1 {
        acc = fold(&acc);
    }
    acc.first()
        .copied()
        .unwrap_or_else(|| compress(&[FieldElement::ZERO; POSEIDON_INPUTS]))
}

/// Runs a single folding round.
pub(crate) fn fold(words: &[FieldElement]) -> Vec<FieldElement> {
    let n1x_chunks = words.len().div_ceil(POSEIDON_INPUTS);
    let padded_children = n1x_chunks * POSEIDON_INPUTS;
    let mode_2x = padded_children % N2X_INPUTS == 0;
    let chunk_size = if mode_2x { N2X_INPUTS } else { POSEIDON_INPUTS };

    (0..padded_children)
        .step_by(chunk_size)
        .map(|start| {
            let chunk: Vec<FieldElement> = (start..start + chunk_size)
                .map(|i| words.get(i).copied().unwrap_or(FieldElement::ZERO))
                .collect();
            if mode_2x {
                compress_n2x(&chunk)
            } else {
                compress(&chunk)
            }
        })
        .collect()
}

fn compress_n2x(inputs: &[FieldElement]) -> FieldElement {
    let interim: Vec<FieldElement> = inputs.chunks(POSEIDON_INPUTS).map(compress).collect();
    compress(&interim)
}

/// Arity is checked by the callers.
fn compress(inputs: &[FieldElement]) -> FieldElement {
    let message: [PoseidonField; POSEIDON_INPUTS] =
        std::array::from_fn(|i| PoseidonField(inputs[i]));
    Hasher::init().hash(message, PoseidonField::ZERO).0
}

#[cfg(test)]
mod tests {
    use alloy::primitives::b256;
    use proptest::prelude::*;

    use super::*;

    fn fe(v: u64) -> FieldElement {
        FieldElement::from(v)
    }

    fn felt() -> impl Strategy<Value = FieldElement> {
        any::<[u8; 32]>().prop_map(|bytes| field_from_be_bytes(&bytes))
    }

    /// One folding round that always compresses pairs.
    fn fold_1x(words: &[FieldElement]) -> Vec<FieldElement> {
        words
            .chunks(POSEIDON_INPUTS)
            .map(|chunk| {
                let mut padded = [FieldElement::ZERO; POSEIDON_INPUTS];
                padded[..chunk.len()].copy_from_slice(chunk);
                poseidon_raw(&padded).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_known_answers() {
        assert_eq!(
            field_to_be_bytes(&poseidon_raw(&[fe(1), fe(2)]).unwrap()),
            b256!("3fb8310b0e962b75bffec5f9cfcbf3f965a7b1d2dcac8d95ccb13d434e08e5fa").0
        );
        assert_eq!(
            poseidon(&[]),
            b256!("720772992425c4618eaf8a7ff4b6ad5333a76fe17dd3624e2329a57dfaaa505e").0
        );
        assert_eq!(
            poseidon(b"tokamak"),
            b256!("4b1c067f6782ce4b8b7af7464e0bbcb30e736d79f0dc11aedd228e0b53ef579f").0
        );

        // Four words, one 2x chunk.
        let message: Vec<u8> = (0..100).collect();
        assert_eq!(
            poseidon(&message),
            b256!("4f31bb4e240c49c8c32d8e32f5b9a47df8cb309efacdfe1d15887f681ab46a95").0
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn proptest_n2x_compress_is_two_rounds(inputs in prop::array::uniform4(felt())) {
            let expected = fold_1x(&fold_1x(&inputs));
            prop_assert_eq!(poseidon_n2x_compress(&inputs).unwrap(), expected[0]);
        }

        #[test]
        fn proptest_2x_round_matches_two_1x_rounds(words in prop::collection::vec(felt(), 4..=24)) {
            let words = &words[..words.len() / N2X_INPUTS * N2X_INPUTS];
            prop_assert_eq!(fold(words), fold_1x(&fold_1x(words)));
        }

        #[test]
        fn proptest_bit_flip_changes_digest(
            message in prop::collection::vec(any::<u8>(), 1..160),
            index in any::<prop::sample::Index>(),
            bit in 0u8..8,
        ) {
            let mut mutated = message.clone();
            mutated[index.index(message.len())] ^= 1 << bit;
            prop_assert_ne!(poseidon(&mutated), poseidon(&message));
        }
    }

    #[test]
    fn test_poseidon_raw_arity() {
        assert_eq!(
            poseidon_raw(&[fe(1)]),
            Err(CryptoError::Arity {
                expected: POSEIDON_INPUTS,
                got: 1
            })
        );
        assert_eq!(
            poseidon_raw(&[fe(1), fe(2), fe(3)]),
            Err(CryptoError::Arity {
                expected: POSEIDON_INPUTS,
                got: 3
            })
        );
        assert!(poseidon_raw(&[fe(1), fe(2)]).is_ok());
    }

    #[test]
    fn test_poseidon_raw_is_pure() {
        let first = poseidon_raw(&[fe(1), fe(2)]).unwrap();
        let second = poseidon_raw(&[fe(1), fe(2)]).unwrap();
        assert_eq!(first, second);
        assert_ne!(first, poseidon_raw(&[fe(2), fe(1)]).unwrap());
    }

    #[test]
    fn test_n2x_compress_arity() {
        assert!(matches!(
            poseidon_n2x_compress(&[fe(1); 3]),
            Err(CryptoError::Arity { expected: 4, got: 3 })
        ));
        assert!(poseidon_n2x_compress(&[fe(1); 4]).is_ok());
    }

    #[test]
    fn test_n2x_compress_matches_two_rounds() {
        let inputs = [fe(11), fe(22), fe(33), fe(44)];
        let left = poseidon_raw(&inputs[..2]).unwrap();
        let right = poseidon_raw(&inputs[2..]).unwrap();
        let expected = poseidon_raw(&[left, right]).unwrap();
        assert_eq!(poseidon_n2x_compress(&inputs).unwrap(), expected);

        // Same inputs as raw field elements with the top bits set.
        let big = [-fe(1), -fe(2), fe(0), -fe(3)];
        let left = poseidon_raw(&big[..2]).unwrap();
        let right = poseidon_raw(&big[2..]).unwrap();
        assert_eq!(
            poseidon_n2x_compress(&big).unwrap(),
            poseidon_raw(&[left, right]).unwrap()
        );
    }

    #[test]
    fn test_empty_message() {
        let expected = field_to_be_bytes(&poseidon_raw(&[fe(0), fe(0)]).unwrap());
        assert_eq!(poseidon(&[]), expected);
        assert_eq!(poseidon(&[]), poseidon(&[]));
    }

    #[test]
    fn test_single_word_message() {
        // A single word pads to one chunk of two and takes the 1x path.
        let mut word = [0u8; 32];
        word[31] = 5;
        let expected = poseidon_raw(&[fe(5), fe(0)]).unwrap();
        assert_eq!(poseidon(&word), field_to_be_bytes(&expected));
    }

    #[test]
    fn test_short_word_keeps_value() {
        // A short final word is read as a number, so left padding does not change the digest.
        let mut padded = [0u8; 32];
        padded[30..].copy_from_slice(&[0xab, 0xcd]);
        assert_eq!(poseidon(&[0xab, 0xcd]), poseidon(&padded));
    }

    #[test]
    fn test_four_words_take_the_2x_path() {
        let words: Vec<FieldElement> = (1..=4).map(fe).collect();
        let message: Vec<u8> = words.iter().flat_map(field_to_be_bytes).collect();

        let expected = poseidon_n2x_compress(&words).unwrap();
        assert_eq!(poseidon(&message), field_to_be_bytes(&expected));
    }

    #[test]
    fn test_three_words_pad_into_one_2x_chunk() {
        let words: Vec<FieldElement> = (1..=3).map(fe).collect();
        let message: Vec<u8> = words.iter().flat_map(field_to_be_bytes).collect();

        // Three words pad to four children, which is one 2x chunk.
        let expected = poseidon_n2x_compress(&[fe(1), fe(2), fe(3), fe(0)]).unwrap();
        assert_eq!(poseidon(&message), field_to_be_bytes(&expected));
    }

    #[test]
    fn test_fold_round_lengths() {
        let words: Vec<FieldElement> = (0..12).map(fe).collect();
        // 12 children are a multiple of 4, so the round emits 3 elements.
        assert_eq!(fold(&words).len(), 3);
        // 6 children are not, so the round emits 3 elements through the 1x path.
        assert_eq!(fold(&words[..6]).len(), 3);
        assert_eq!(fold(&words[..5]).len(), 3);
    }

    #[test]
    fn test_mutation_changes_digest() {
        let message = b"tokamak l2 poseidon folding over several words of input data".to_vec();
        let digest = poseidon(&message);
        for i in [0, 31, 32, message.len() - 1] {
            let mut mutated = message.clone();
            mutated[i] ^= 1;
            assert_ne!(poseidon(&mutated), digest);
        }
    }
}
