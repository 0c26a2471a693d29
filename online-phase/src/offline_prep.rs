//! Defines the interface to the preprocessing phase that supplies correlated
//! randomness to the online phase, as well as a dummy supplier for testing

use ark_ff::PrimeField;
use itertools::Itertools;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::{
    algebra::{FieldDefinition, Scalar, ScalarShare},
    error::MpcError,
    network::PartyId,
};

/// The default number of powers in an exponentiation pipe, excluding the
/// inverse
pub const DEFAULT_EXP_PIPE_LENGTH: usize = 200;

// ---------
// | Types |
// ---------

/// A Beaver triple, shares of `a`, `b`, and `c = a * b`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct MultiplicationTriple<F: PrimeField> {
    /// The share of the left factor
    pub a: ScalarShare<F>,
    /// The share of the right factor
    pub b: ScalarShare<F>,
    /// The share of the product
    pub c: ScalarShare<F>,
}

/// A share of a random mask used to input a value
///
/// The party the mask is generated toward additionally learns the mask itself
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub struct InputMask<F: PrimeField> {
    /// The local party's share of the mask
    pub share: ScalarShare<F>,
    /// The cleartext mask, present only at the inputting party
    pub real_value: Option<Scalar<F>>,
}

// ---------
// | Trait |
// ---------

/// The interface through which the online phase draws preprocessed material
///
/// Every party must draw from its supplier in the same order; the suppliers of
/// a session jointly hold consistent sharings of each item
pub trait DataSupplier<F: PrimeField>: Send {
    /// The field the supplier produces material over
    fn field_definition(&self) -> FieldDefinition {
        FieldDefinition::of::<F>()
    }

    /// Get the local party's share of the mac key
    fn mac_key_share(&self) -> Scalar<F>;

    // === Multiplication === //

    /// Fetch the next beaver triple
    fn next_triple(&mut self) -> Result<MultiplicationTriple<F>, MpcError>;
    /// Fetch a batch of beaver triples
    fn next_triple_batch(&mut self, n: usize) -> Result<Vec<MultiplicationTriple<F>>, MpcError> {
        (0..n).map(|_| self.next_triple()).collect()
    }

    // === Input Authentication === //

    /// Fetch the next input mask for an input by the given party
    fn next_input_mask(&mut self, toward: PartyId) -> Result<InputMask<F>, MpcError>;

    // === Shared Values === //

    /// Fetch the next shared random bit
    fn next_random_bit(&mut self) -> Result<ScalarShare<F>, MpcError>;

    /// Fetch the next shared random non-zero field element
    fn next_random_element(&mut self) -> Result<ScalarShare<F>, MpcError>;

    /// Fetch the next exponentiation pipe
    ///
    /// That is, shares of `r^-1, r, r^2, ..., r^l` for a random non-zero `r`
    /// where `l` is the supplier's pipe length
    fn next_exp_pipe(&mut self) -> Result<Vec<ScalarShare<F>>, MpcError>;
}

// ------------------
// | Dummy Supplier |
// ------------------

/// A dealer-style supplier for tests and demos
///
/// Every party constructs its supplier from the same seed, so all suppliers
/// draw identical cleartext values and split them identically; each keeps only
/// its own share. The mac share of a value is `value * own key share`, so the
/// mac shares sum to `value * alpha`. This is not secure
#[derive(Clone, Debug)]
pub struct DummyDataSupplier<F: PrimeField> {
    /// The ID of the local party
    party_id: PartyId,
    /// The number of parties in the session
    n_parties: usize,
    /// The local party's share of the mac key
    mac_key_share: Scalar<F>,
    /// The rng shared (by seed) between all parties' suppliers
    rng: StdRng,
    /// The number of powers in an exponentiation pipe
    exp_pipe_length: usize,
    /// The number of items that may still be drawn, unlimited if `None`
    remaining: Option<usize>,
}

impl<F: PrimeField> DummyDataSupplier<F> {
    /// Constructor
    ///
    /// All parties of a session must pass the same `n_parties` and `seed`
    ///
    /// # Panics
    ///
    /// Panics if `party_id` is not below `n_parties`
    pub fn new(party_id: PartyId, n_parties: usize, seed: u64) -> Self {
        assert!((party_id as usize) < n_parties, "party {party_id} outside of {n_parties} parties");

        let mut rng = StdRng::seed_from_u64(seed);
        let key_shares = (0..n_parties).map(|_| Scalar::random(&mut rng)).collect_vec();

        Self {
            party_id,
            n_parties,
            mac_key_share: key_shares[party_id as usize],
            rng,
            exp_pipe_length: DEFAULT_EXP_PIPE_LENGTH,
            remaining: None,
        }
    }

    /// Set the number of powers in each exponentiation pipe
    pub fn with_exp_pipe_length(mut self, length: usize) -> Self {
        self.exp_pipe_length = length;
        self
    }

    /// Limit the number of items the supplier produces before it reports
    /// exhaustion
    ///
    /// Each triple, input mask, bit, and random element counts as one item, an
    /// exponentiation pipe counts as one item
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.remaining = Some(capacity);
        self
    }

    /// The number of powers in each exponentiation pipe
    pub fn exp_pipe_length(&self) -> usize {
        self.exp_pipe_length
    }

    /// Consume one unit of capacity
    fn take(&mut self, kind: &str) -> Result<(), MpcError> {
        match self.remaining.as_mut() {
            Some(0) => Err(MpcError::SupplierExhausted(format!("no {kind} remaining"))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            },
            None => Ok(()),
        }
    }

    /// Draw a random non-zero field element
    fn random_nonzero(&mut self) -> Scalar<F> {
        loop {
            let value = Scalar::random(&mut self.rng);
            if value != Scalar::zero() {
                return value;
            }
        }
    }

    /// Split a cleartext value into additive shares and keep the local share
    fn share_value(&mut self, value: Scalar<F>) -> ScalarShare<F> {
        let mut shares =
            (0..self.n_parties - 1).map(|_| Scalar::random(&mut self.rng)).collect_vec();
        let last = value - shares.iter().copied().sum::<Scalar<F>>();
        shares.push(last);

        // Spread the mac over the parties' key shares; each party's mac share
        // is its own key share times the value
        ScalarShare::new(shares[self.party_id as usize], value * self.mac_key_share)
    }
}

impl<F: PrimeField> DataSupplier<F> for DummyDataSupplier<F> {
    fn mac_key_share(&self) -> Scalar<F> {
        self.mac_key_share
    }

    fn next_triple(&mut self) -> Result<MultiplicationTriple<F>, MpcError> {
        self.take("triples")?;

        let a = Scalar::random(&mut self.rng);
        let b = Scalar::random(&mut self.rng);
        Ok(MultiplicationTriple {
            a: self.share_value(a),
            b: self.share_value(b),
            c: self.share_value(a * b),
        })
    }

    fn next_input_mask(&mut self, toward: PartyId) -> Result<InputMask<F>, MpcError> {
        self.take("input masks")?;

        let value = Scalar::random(&mut self.rng);
        let share = self.share_value(value);
        let real_value = (toward == self.party_id).then_some(value);
        Ok(InputMask { share, real_value })
    }

    fn next_random_bit(&mut self) -> Result<ScalarShare<F>, MpcError> {
        self.take("random bits")?;

        let bit: bool = self.rng.gen();
        Ok(self.share_value(Scalar::from(bit)))
    }

    fn next_random_element(&mut self) -> Result<ScalarShare<F>, MpcError> {
        self.take("random elements")?;

        let value = self.random_nonzero();
        Ok(self.share_value(value))
    }

    fn next_exp_pipe(&mut self) -> Result<Vec<ScalarShare<F>>, MpcError> {
        self.take("exponentiation pipes")?;

        let r = self.random_nonzero();
        let r_inv = r.inverse().ok_or_else(|| MpcError::Construction("zero pipe base".into()))?;

        let mut pipe = Vec::with_capacity(self.exp_pipe_length + 1);
        pipe.push(self.share_value(r_inv));

        let mut power = r;
        for _ in 0..self.exp_pipe_length {
            pipe.push(self.share_value(power));
            power *= r;
        }

        Ok(pipe)
    }
}

impl<F: PrimeField> Drop for DummyDataSupplier<F> {
    fn drop(&mut self) {
        Zeroize::zeroize(&mut self.mac_key_share.0);
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;

    use crate::{
        algebra::ScalarShare,
        error::ErrorKind,
        offline_prep::{DataSupplier, DummyDataSupplier},
        test_helpers::{mock_suppliers, TestField, TestScalar},
    };

    /// Recombine one share from each party
    fn recombine(shares: &[ScalarShare<TestField>]) -> ScalarShare<TestField> {
        shares.iter().copied().sum()
    }

    /// The global mac key of a set of suppliers
    fn mac_key(suppliers: &[DummyDataSupplier<TestField>]) -> TestScalar {
        suppliers.iter().map(|s| s.mac_key_share()).sum()
    }

    /// Check that a recombined share carries a valid mac
    fn assert_mac_correct(recombined: ScalarShare<TestField>, key: TestScalar) {
        assert_eq!(recombined.mac(), recombined.share() * key);
    }

    /// Tests that triples recombine to `c = a * b` with valid macs
    #[test]
    fn test_triples() {
        for n_parties in [2, 3, 5] {
            let mut suppliers = mock_suppliers(n_parties, 1);
            let key = mac_key(&suppliers);

            let triples = suppliers.iter_mut().map(|s| s.next_triple().unwrap()).collect_vec();
            let a = recombine(&triples.iter().map(|t| t.a).collect_vec());
            let b = recombine(&triples.iter().map(|t| t.b).collect_vec());
            let c = recombine(&triples.iter().map(|t| t.c).collect_vec());

            assert_eq!(c.share(), a.share() * b.share());
            assert_mac_correct(a, key);
            assert_mac_correct(b, key);
            assert_mac_correct(c, key);
        }
    }

    /// Tests that only the designated party learns an input mask's value
    #[test]
    fn test_input_masks() {
        for n_parties in [2, 3, 5] {
            for toward in 0..n_parties as u64 {
                let mut suppliers = mock_suppliers(n_parties, 2);
                let key = mac_key(&suppliers);

                let masks =
                    suppliers.iter_mut().map(|s| s.next_input_mask(toward).unwrap()).collect_vec();
                let recombined = recombine(&masks.iter().map(|m| m.share).collect_vec());
                assert_mac_correct(recombined, key);

                for (party, mask) in masks.iter().enumerate() {
                    if party as u64 == toward {
                        assert_eq!(mask.real_value, Some(recombined.share()));
                    } else {
                        assert_eq!(mask.real_value, None);
                    }
                }
            }
        }
    }

    /// Tests that random bits are bits and random elements are non-zero
    #[test]
    fn test_bits_and_elements() {
        let mut suppliers = mock_suppliers(3, 3);
        let key = mac_key(&suppliers);

        for _ in 0..20 {
            let bits = suppliers.iter_mut().map(|s| s.next_random_bit().unwrap()).collect_vec();
            let bit = recombine(&bits);
            assert_mac_correct(bit, key);
            assert!(bit.share() == TestScalar::zero() || bit.share() == TestScalar::one());

            let elems =
                suppliers.iter_mut().map(|s| s.next_random_element().unwrap()).collect_vec();
            let elem = recombine(&elems);
            assert_mac_correct(elem, key);
            assert_ne!(elem.share(), TestScalar::zero());
        }
    }

    /// Tests that an exponentiation pipe holds `r^-1, r, r^2, ...`
    #[test]
    fn test_exp_pipe() {
        const PIPE_LENGTH: usize = 10;
        let mut suppliers = mock_suppliers(3, 4)
            .into_iter()
            .map(|s| s.with_exp_pipe_length(PIPE_LENGTH))
            .collect_vec();
        let key = mac_key(&suppliers);

        let pipes = suppliers.iter_mut().map(|s| s.next_exp_pipe().unwrap()).collect_vec();
        let recombined = (0..=PIPE_LENGTH)
            .map(|i| recombine(&pipes.iter().map(|p| p[i]).collect_vec()))
            .collect_vec();

        assert_eq!(recombined.len(), PIPE_LENGTH + 1);
        recombined.iter().for_each(|v| assert_mac_correct(*v, key));

        let r = recombined[1].share();
        assert_eq!(recombined[0].share() * r, TestScalar::one());
        for i in 2..=PIPE_LENGTH {
            assert_eq!(recombined[i].share(), r.pow(i as u64));
        }
    }

    /// Tests that a supplier with a capacity reports exhaustion
    #[test]
    fn test_exhaustion() {
        let mut supplier = DummyDataSupplier::<TestField>::new(0, 2, 5).with_capacity(2);

        assert!(supplier.next_triple().is_ok());
        assert!(supplier.next_random_bit().is_ok());

        let err = supplier.next_triple().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    }

    /// Tests that a party outside the session is rejected
    #[test]
    #[should_panic(expected = "party 2 outside of 2 parties")]
    fn test_party_out_of_range() {
        DummyDataSupplier::<TestField>::new(2, 2, 0);
    }
}
