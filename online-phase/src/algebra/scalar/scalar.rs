//! Defines the scalar types that form the basis of the MPC algebra

// ----------------------------
// | Scalar Field Definitions |
// ----------------------------

use std::{
    cmp::Ordering,
    fmt::{Display, Formatter, Result as FmtResult},
    iter::{Product, Sum},
    ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign},
};

use ark_ff::{One, PrimeField, Zero};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::UniformRand;
use num_bigint::BigUint;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::algebra::macros::*;

// -----------
// | Helpers |
// -----------

/// Computes the number of bytes needed to represent a field element
#[inline]
pub const fn n_bytes_field<F: PrimeField>() -> usize {
    let n_bits = F::MODULUS_BIT_SIZE as usize;
    (n_bits + 7) / 8
}

// ---------------------
// | Scalar Definition |
// ---------------------

/// A wrapper around a prime field element that allows us to implement foreign
/// traits for it
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Scalar<F: PrimeField>(pub(crate) F);

impl<F: PrimeField> Scalar<F> {
    /// Construct a scalar from an inner field element
    pub fn new(inner: F) -> Self {
        Scalar(inner)
    }

    /// The field's additive identity
    pub fn zero() -> Self {
        Scalar(F::zero())
    }

    /// The field's multiplicative identity
    pub fn one() -> Self {
        Scalar(F::one())
    }

    /// Get the inner value of the scalar
    pub fn inner(&self) -> F {
        self.0
    }

    /// Get the bit length of the field modulus
    pub fn bit_length() -> usize {
        F::MODULUS_BIT_SIZE as usize
    }

    /// Sample a random field element
    pub fn random<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        Self(UniformRand::rand(rng))
    }

    /// Compute the multiplicative inverse of the scalar, `None` for zero
    pub fn inverse(&self) -> Option<Self> {
        self.0.inverse().map(Scalar)
    }

    /// Compute the exponentiation of the given scalar
    pub fn pow(&self, exp: u64) -> Self {
        Scalar(self.0.pow([exp]))
    }

    /// Construct a scalar from the given bytes and reduce modulo the field's
    /// modulus
    pub fn from_be_bytes_mod_order(bytes: &[u8]) -> Self {
        Scalar(F::from_be_bytes_mod_order(bytes))
    }

    /// Convert to big endian bytes
    ///
    /// Pads to the byte length of the modulus so that the output length is
    /// fixed for a given field
    pub fn to_bytes_be(&self) -> Vec<u8> {
        let mut bytes = self.to_biguint().to_bytes_be();

        let mut padded = vec![0u8; n_bytes_field::<F>().saturating_sub(bytes.len())];
        padded.append(&mut bytes);
        padded
    }

    /// Convert the underlying value to a `BigUint`
    pub fn to_biguint(&self) -> BigUint {
        self.0.into()
    }

    /// Convert from a `BigUint`, reducing modulo the field's modulus
    pub fn from_biguint(val: &BigUint) -> Self {
        Scalar(F::from_le_bytes_mod_order(&val.to_bytes_le()))
    }
}

impl<F: PrimeField> Zero for Scalar<F> {
    fn zero() -> Self {
        Self::zero()
    }

    fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl<F: PrimeField> One for Scalar<F> {
    fn one() -> Self {
        Self::one()
    }
}

impl<F: PrimeField> Display for Scalar<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.to_biguint())
    }
}

impl<F: PrimeField> Serialize for Scalar<F> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut bytes = Vec::with_capacity(n_bytes_field::<F>());
        CanonicalSerialize::serialize_uncompressed(&self.0, &mut bytes)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_bytes(&bytes)
    }
}

impl<'de, F: PrimeField> Deserialize<'de> for Scalar<F> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = <Vec<u8>>::deserialize(deserializer)?;
        let inner = <F as CanonicalDeserialize>::deserialize_uncompressed(bytes.as_slice())
            .map_err(serde::de::Error::custom)?;
        Ok(Scalar(inner))
    }
}

// --------------
// | Arithmetic |
// --------------

// === Addition === //

impl<F: PrimeField> Add<&Scalar<F>> for &Scalar<F> {
    type Output = Scalar<F>;

    fn add(self, rhs: &Scalar<F>) -> Self::Output {
        Scalar(self.0 + rhs.0)
    }
}
impl_owned_variants!(Add, add, Scalar<F>, Scalar<F>, Scalar<F>);

impl<F: PrimeField> AddAssign for Scalar<F> {
    fn add_assign(&mut self, rhs: Scalar<F>) {
        self.0 += rhs.0;
    }
}

// === Subtraction === //

impl<F: PrimeField> Sub<&Scalar<F>> for &Scalar<F> {
    type Output = Scalar<F>;

    fn sub(self, rhs: &Scalar<F>) -> Self::Output {
        Scalar(self.0 - rhs.0)
    }
}
impl_owned_variants!(Sub, sub, Scalar<F>, Scalar<F>, Scalar<F>);

impl<F: PrimeField> SubAssign for Scalar<F> {
    fn sub_assign(&mut self, rhs: Scalar<F>) {
        self.0 -= rhs.0;
    }
}

// === Multiplication === //

impl<F: PrimeField> Mul<&Scalar<F>> for &Scalar<F> {
    type Output = Scalar<F>;

    fn mul(self, rhs: &Scalar<F>) -> Self::Output {
        Scalar(self.0 * rhs.0)
    }
}
impl_owned_variants!(Mul, mul, Scalar<F>, Scalar<F>, Scalar<F>);

impl<F: PrimeField> MulAssign for Scalar<F> {
    fn mul_assign(&mut self, rhs: Scalar<F>) {
        self.0 *= rhs.0;
    }
}

// === Negation === //

impl<F: PrimeField> Neg for &Scalar<F> {
    type Output = Scalar<F>;

    fn neg(self) -> Self::Output {
        Scalar(-self.0)
    }
}
impl_owned_unary!(Neg, neg, Scalar<F>);

// ---------------
// | Conversions |
// ---------------

impl<F: PrimeField> From<bool> for Scalar<F> {
    fn from(value: bool) -> Self {
        Scalar(F::from(value))
    }
}

impl<F: PrimeField> From<u8> for Scalar<F> {
    fn from(value: u8) -> Self {
        Scalar(F::from(value))
    }
}

impl<F: PrimeField> From<u32> for Scalar<F> {
    fn from(value: u32) -> Self {
        Scalar(F::from(value))
    }
}

impl<F: PrimeField> From<u64> for Scalar<F> {
    fn from(value: u64) -> Self {
        Scalar(F::from(value))
    }
}

impl<F: PrimeField> From<u128> for Scalar<F> {
    fn from(value: u128) -> Self {
        Scalar(F::from(value))
    }
}

impl<F: PrimeField> From<usize> for Scalar<F> {
    fn from(value: usize) -> Self {
        Scalar(F::from(value as u64))
    }
}

impl<F: PrimeField> From<BigUint> for Scalar<F> {
    fn from(value: BigUint) -> Self {
        Scalar::from_biguint(&value)
    }
}

impl<F: PrimeField> From<Scalar<F>> for BigUint {
    fn from(value: Scalar<F>) -> Self {
        value.0.into()
    }
}

// -------------------
// | Iterator Traits |
// -------------------

impl<F: PrimeField> Sum for Scalar<F> {
    fn sum<I: Iterator<Item = Scalar<F>>>(iter: I) -> Self {
        iter.fold(Scalar::zero(), |acc, x| acc + x)
    }
}

impl<F: PrimeField> Product for Scalar<F> {
    fn product<I: Iterator<Item = Scalar<F>>>(iter: I) -> Self {
        iter.fold(Scalar::one(), |acc, x| acc * x)
    }
}

impl<F: PrimeField> PartialOrd for Scalar<F> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<F: PrimeField> Ord for Scalar<F> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod test {
    use num_bigint::BigUint;
    use rand::thread_rng;

    use crate::{algebra::Scalar, test_helpers::TestScalar};

    /// Tests serialization and deserialization of scalars
    #[test]
    fn test_scalar_serialization() {
        let mut rng = thread_rng();
        let scalar = TestScalar::random(&mut rng);

        let bytes = serde_json::to_vec(&scalar).unwrap();
        let deserialized: TestScalar = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(scalar, deserialized);
    }

    /// Tests that big endian encoding is padded to the modulus length
    #[test]
    fn test_to_bytes_padding() {
        let one = TestScalar::one();
        let bytes = one.to_bytes_be();

        assert_eq!(bytes.len(), 32);
        assert_eq!(bytes[31], 1);
        assert_eq!(TestScalar::from_be_bytes_mod_order(&bytes), one);
    }

    /// Tests that conversion through `BigUint` reduces modulo the field order
    #[test]
    fn test_biguint_reduction() {
        let modulus = TestScalar::zero() - TestScalar::one();
        let wrapped: BigUint = modulus.to_biguint() + BigUint::from(6u8);

        assert_eq!(Scalar::from_biguint(&wrapped), TestScalar::from(5u8));
    }

    /// Tests inversion, including the zero case
    #[test]
    fn test_inverse() {
        let mut rng = thread_rng();
        let x = TestScalar::random(&mut rng);

        assert_eq!(x * x.inverse().unwrap(), TestScalar::one());
        assert!(TestScalar::zero().inverse().is_none());
    }
}
