//! The Poseidon instance over the BLS12-381 scalar field: width `POSEIDON_INPUTS + 1`, S-box
//! `x^5`, 8 full and 56 partial rounds.
//!
//! Round constants and the Cauchy MDS matrix come from the Grain LFSR of the reference parameter
//! script (prime field, 255-bit modulus, first MDS candidate). `poseidon_primitives` runs the
//! generator and the permutation; [PoseidonField] gives [FieldElement] the ordering and wide
//! reduction its generator asks for.

use std::{
    cmp::Ordering,
    iter::{Product, Sum},
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
    sync::OnceLock,
};

use ff::{Field, FromUniformBytes, PrimeField};
use poseidon_primitives::poseidon::primitives::Spec;
use rand_core::RngCore;
use subtle::{Choice, ConditionallySelectable, ConstantTimeEq, CtOption};

use crate::{FieldElement, POSEIDON_INPUTS};

/// State width (rate + one capacity element).
pub(crate) const WIDTH: usize = POSEIDON_INPUTS + 1;
pub(crate) const RATE: usize = POSEIDON_INPUTS;

pub(crate) const FULL_ROUNDS: usize = 8;
pub(crate) const PARTIAL_ROUNDS: usize = 56;

type Mds = [[PoseidonField; WIDTH]; WIDTH];
type Constants = (Vec<[PoseidonField; WIDTH]>, Mds, Mds);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct PoseidonField(pub(crate) FieldElement);

/// Numeric order of the canonical values.
impl Ord for PoseidonField {
    fn cmp(&self, other: &Self) -> Ordering {
        let (lhs, rhs) = (self.0.to_bytes(), other.0.to_bytes());
        lhs.iter().rev().cmp(rhs.iter().rev())
    }
}

impl PartialOrd for PoseidonField {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident) => {
        impl $trait for PoseidonField {
            type Output = PoseidonField;

            fn $method(self, rhs: PoseidonField) -> PoseidonField {
                PoseidonField($trait::$method(self.0, rhs.0))
            }
        }

        impl<'a> $trait<&'a PoseidonField> for PoseidonField {
            type Output = PoseidonField;

            fn $method(self, rhs: &'a PoseidonField) -> PoseidonField {
                PoseidonField($trait::$method(self.0, rhs.0))
            }
        }

        impl $assign_trait for PoseidonField {
            fn $assign_method(&mut self, rhs: PoseidonField) {
                $assign_trait::$assign_method(&mut self.0, rhs.0);
            }
        }

        impl<'a> $assign_trait<&'a PoseidonField> for PoseidonField {
            fn $assign_method(&mut self, rhs: &'a PoseidonField) {
                $assign_trait::$assign_method(&mut self.0, rhs.0);
            }
        }
    };
}

impl_binop!(Add, add, AddAssign, add_assign);
impl_binop!(Sub, sub, SubAssign, sub_assign);
impl_binop!(Mul, mul, MulAssign, mul_assign);

impl Neg for PoseidonField {
    type Output = PoseidonField;

    fn neg(self) -> PoseidonField {
        PoseidonField(-self.0)
    }
}

impl Sum for PoseidonField {
    fn sum<I: Iterator<Item = PoseidonField>>(iter: I) -> PoseidonField {
        iter.fold(PoseidonField::ZERO, |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a PoseidonField> for PoseidonField {
    fn sum<I: Iterator<Item = &'a PoseidonField>>(iter: I) -> PoseidonField {
        iter.fold(PoseidonField::ZERO, |acc, x| acc + x)
    }
}

impl Product for PoseidonField {
    fn product<I: Iterator<Item = PoseidonField>>(iter: I) -> PoseidonField {
        iter.fold(PoseidonField::ONE, |acc, x| acc * x)
    }
}

impl<'a> Product<&'a PoseidonField> for PoseidonField {
    fn product<I: Iterator<Item = &'a PoseidonField>>(iter: I) -> PoseidonField {
        iter.fold(PoseidonField::ONE, |acc, x| acc * x)
    }
}

impl ConditionallySelectable for PoseidonField {
    fn conditional_select(a: &Self, b: &Self, choice: Choice) -> Self {
        PoseidonField(FieldElement::conditional_select(&a.0, &b.0, choice))
    }
}

impl ConstantTimeEq for PoseidonField {
    fn ct_eq(&self, other: &Self) -> Choice {
        self.0.ct_eq(&other.0)
    }
}

impl From<u64> for PoseidonField {
    fn from(value: u64) -> Self {
        PoseidonField(FieldElement::from(value))
    }
}

impl Field for PoseidonField {
    const ZERO: Self = PoseidonField(<FieldElement as Field>::ZERO);
    const ONE: Self = PoseidonField(<FieldElement as Field>::ONE);

    fn random(rng: impl RngCore) -> Self {
        PoseidonField(<FieldElement as Field>::random(rng))
    }

    fn square(&self) -> Self {
        PoseidonField(<FieldElement as Field>::square(&self.0))
    }

    fn double(&self) -> Self {
        PoseidonField(<FieldElement as Field>::double(&self.0))
    }

    fn invert(&self) -> CtOption<Self> {
        <FieldElement as Field>::invert(&self.0).map(PoseidonField)
    }

    fn sqrt_ratio(num: &Self, div: &Self) -> (Choice, Self) {
        let (is_square, root) = <FieldElement as Field>::sqrt_ratio(&num.0, &div.0);
        (is_square, PoseidonField(root))
    }

    fn sqrt(&self) -> CtOption<Self> {
        <FieldElement as Field>::sqrt(&self.0).map(PoseidonField)
    }
}

impl PrimeField for PoseidonField {
    type Repr = [u8; 32];

    fn from_repr(repr: Self::Repr) -> CtOption<Self> {
        <FieldElement as PrimeField>::from_repr(repr).map(PoseidonField)
    }

    fn to_repr(&self) -> Self::Repr {
        <FieldElement as PrimeField>::to_repr(&self.0)
    }

    fn is_odd(&self) -> Choice {
        <FieldElement as PrimeField>::is_odd(&self.0)
    }

    const MODULUS: &'static str = <FieldElement as PrimeField>::MODULUS;
    const NUM_BITS: u32 = <FieldElement as PrimeField>::NUM_BITS;
    const CAPACITY: u32 = <FieldElement as PrimeField>::CAPACITY;
    const TWO_INV: Self = PoseidonField(<FieldElement as PrimeField>::TWO_INV);
    const MULTIPLICATIVE_GENERATOR: Self =
        PoseidonField(<FieldElement as PrimeField>::MULTIPLICATIVE_GENERATOR);
    const S: u32 = <FieldElement as PrimeField>::S;
    const ROOT_OF_UNITY: Self = PoseidonField(<FieldElement as PrimeField>::ROOT_OF_UNITY);
    const ROOT_OF_UNITY_INV: Self =
        PoseidonField(<FieldElement as PrimeField>::ROOT_OF_UNITY_INV);
    const DELTA: Self = PoseidonField(<FieldElement as PrimeField>::DELTA);
}

impl FromUniformBytes<64> for PoseidonField {
    fn from_uniform_bytes(bytes: &[u8; 64]) -> Self {
        PoseidonField(FieldElement::from_bytes_wide(bytes))
    }
}

fn sbox(x: PoseidonField) -> PoseidonField {
    let x2 = x.square();
    x2.square() * x
}

/// Parameters read straight off the Grain LFSR on every call.
#[derive(Debug)]
struct GrainParams;

impl Spec<PoseidonField, WIDTH, RATE> for GrainParams {
    fn full_rounds() -> usize {
        FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        PARTIAL_ROUNDS
    }

    fn sbox(val: PoseidonField) -> PoseidonField {
        sbox(val)
    }

    fn secure_mds() -> usize {
        0
    }
}

/// [GrainParams] with the generated constants kept for the lifetime of the process.
#[derive(Debug)]
pub(crate) struct Bls12T3;

impl Spec<PoseidonField, WIDTH, RATE> for Bls12T3 {
    fn full_rounds() -> usize {
        FULL_ROUNDS
    }

    fn partial_rounds() -> usize {
        PARTIAL_ROUNDS
    }

    fn sbox(val: PoseidonField) -> PoseidonField {
        sbox(val)
    }

    fn secure_mds() -> usize {
        0
    }

    fn constants() -> Constants {
        static CONSTANTS: OnceLock<Constants> = OnceLock::new();
        CONSTANTS
            .get_or_init(<GrainParams as Spec<PoseidonField, WIDTH, RATE>>::constants)
            .clone()
    }
}
