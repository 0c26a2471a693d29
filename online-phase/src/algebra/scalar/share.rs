//! Defines the maliciously secure secret sharing primitive for the `Scalar`
//! type

use std::{
    iter::Sum,
    ops::{Add, Mul, Neg, Sub},
};

use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};

use crate::{
    algebra::macros::{impl_flipped_variants, impl_owned_unary, impl_owned_variants},
    network::PartyId,
    PARTY0,
};

use super::Scalar;

// ---------------
// | ScalarShare |
// ---------------

/// A type holding both an additive share and an additive share of its MAC
///
/// Summed over all parties, `mac = value * alpha` where `alpha` is the
/// session's global MAC key
#[derive(Clone, Copy, Default, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct ScalarShare<F: PrimeField> {
    /// The share
    pub(crate) share: Scalar<F>,
    /// The mac
    pub(crate) mac: Scalar<F>,
}

impl<F: PrimeField> ScalarShare<F> {
    /// Constructor
    pub fn new(share: Scalar<F>, mac: Scalar<F>) -> Self {
        Self { share, mac }
    }

    /// The share of zero with a zero mac
    pub fn zero() -> Self {
        Self::new(Scalar::zero(), Scalar::zero())
    }

    /// Get the share
    pub fn share(&self) -> Scalar<F> {
        self.share
    }

    /// Get the mac
    pub fn mac(&self) -> Scalar<F> {
        self.mac
    }

    /// Build a sharing of a public value
    ///
    /// Party 0 holds the value itself, every party holds `value * key_share`
    /// as its mac share
    pub fn from_public(value: Scalar<F>, mac_key: Scalar<F>, party_id: PartyId) -> Self {
        Self::zero().add_public(value, mac_key, party_id)
    }
}

// --------------
// | Arithmetic |
// --------------

// === Addition === //

impl<F: PrimeField> ScalarShare<F> {
    /// Add a public value to a scalar share
    pub fn add_public(&self, rhs: Scalar<F>, mac_key: Scalar<F>, party_id: PartyId) -> Self {
        let share = if party_id == PARTY0 { self.share + rhs } else { self.share };
        ScalarShare::new(share, self.mac + mac_key * rhs)
    }

    /// Subtract a public value from the share
    pub fn sub_public(&self, rhs: Scalar<F>, mac_key: Scalar<F>, party_id: PartyId) -> Self {
        self.add_public(-rhs, mac_key, party_id)
    }
}

impl<F: PrimeField> Add<&ScalarShare<F>> for &ScalarShare<F> {
    type Output = ScalarShare<F>;

    fn add(self, rhs: &ScalarShare<F>) -> Self::Output {
        ScalarShare::new(self.share + rhs.share, self.mac + rhs.mac)
    }
}
impl_owned_variants!(Add, add, ScalarShare<F>, ScalarShare<F>, ScalarShare<F>);

// === Subtraction === //

impl<F: PrimeField> Sub<&ScalarShare<F>> for &ScalarShare<F> {
    type Output = ScalarShare<F>;

    fn sub(self, rhs: &ScalarShare<F>) -> Self::Output {
        ScalarShare::new(self.share - rhs.share, self.mac - rhs.mac)
    }
}
impl_owned_variants!(Sub, sub, ScalarShare<F>, ScalarShare<F>, ScalarShare<F>);

impl<F: PrimeField> Sum for ScalarShare<F> {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ScalarShare::zero(), |acc, x| acc + x)
    }
}

// === Negation === //

impl<F: PrimeField> Neg for &ScalarShare<F> {
    type Output = ScalarShare<F>;

    fn neg(self) -> Self::Output {
        ScalarShare::new(-self.share, -self.mac)
    }
}
impl_owned_unary!(Neg, neg, ScalarShare<F>);

// === Multiplication == //

impl<F: PrimeField> Mul<&Scalar<F>> for &ScalarShare<F> {
    type Output = ScalarShare<F>;

    fn mul(self, rhs: &Scalar<F>) -> Self::Output {
        ScalarShare::new(self.share * rhs, self.mac * rhs)
    }
}
impl_owned_variants!(Mul, mul, ScalarShare<F>, Scalar<F>, ScalarShare<F>);
impl_flipped_variants!(Mul, mul, ScalarShare<F>, Scalar<F>, ScalarShare<F>);

#[cfg(test)]
mod test {
    use rand::thread_rng;

    use crate::{
        algebra::ScalarShare,
        test_helpers::{TestField, TestScalar},
        PARTY0, PARTY1,
    };

    /// Share a value additively between two parties under the given key shares
    fn share_value(
        value: TestScalar,
        keys: [TestScalar; 2],
    ) -> [ScalarShare<TestField>; 2] {
        let mut rng = thread_rng();
        let alpha = keys[0] + keys[1];
        let mac = value * alpha;

        let s0 = TestScalar::random(&mut rng);
        let m0 = TestScalar::random(&mut rng);
        [ScalarShare::new(s0, m0), ScalarShare::new(value - s0, mac - m0)]
    }

    /// Recover the value and check that the mac shares authenticate it
    fn open_and_check(shares: [ScalarShare<TestField>; 2], keys: [TestScalar; 2]) -> TestScalar {
        let value = shares[0].share() + shares[1].share();
        let mac = shares[0].mac() + shares[1].mac();
        assert_eq!(mac, value * (keys[0] + keys[1]));
        value
    }

    /// Tests that public additions keep the mac consistent
    #[test]
    fn test_add_public() {
        let mut rng = thread_rng();
        let keys = [TestScalar::random(&mut rng), TestScalar::random(&mut rng)];
        let value = TestScalar::random(&mut rng);
        let public = TestScalar::random(&mut rng);

        let [s0, s1] = share_value(value, keys);
        let res = [s0.add_public(public, keys[0], PARTY0), s1.add_public(public, keys[1], PARTY1)];

        assert_eq!(open_and_check(res, keys), value + public);
    }

    /// Tests the linear operations on shares
    #[test]
    fn test_linear_ops() {
        let mut rng = thread_rng();
        let keys = [TestScalar::random(&mut rng), TestScalar::random(&mut rng)];
        let a = TestScalar::random(&mut rng);
        let b = TestScalar::random(&mut rng);
        let c = TestScalar::random(&mut rng);

        let sa = share_value(a, keys);
        let sb = share_value(b, keys);

        let res = [(sa[0] - sb[0]) * c + -sb[0], c * (sa[1] - sb[1]) - sb[1]];
        assert_eq!(open_and_check(res, keys), (a - b) * c - b);
    }
}
