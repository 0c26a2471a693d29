//! Hash commitments and hash based expansion of shared seeds

use ark_ff::PrimeField;
use itertools::Itertools;
use sha3::{Digest, Sha3_256};

use crate::algebra::Scalar;

/// Hash commit to a set of values
pub fn commit_scalars<F: PrimeField>(values: &[Scalar<F>]) -> Scalar<F> {
    let mut hasher = Sha3_256::new();
    for value in values.iter() {
        hasher.update(value.to_bytes_be());
    }
    let hash_output = hasher.finalize();

    Scalar::from_be_bytes_mod_order(&hash_output)
}

/// Check a revealed set of values against an earlier commitment
pub fn verify_commitment<F: PrimeField>(commitment: &Scalar<F>, values: &[Scalar<F>]) -> bool {
    commit_scalars(values) == *commitment
}

/// Expand a jointly generated seed into `n` pseudorandom field elements
///
/// Element `i` is `SHA3-256(seed || i)` reduced into the field
pub fn expand_seed<F: PrimeField>(seed: &Scalar<F>, n: usize) -> Vec<Scalar<F>> {
    let seed_bytes = seed.to_bytes_be();
    (0..n as u64)
        .map(|i| {
            let mut hasher = Sha3_256::new();
            hasher.update(&seed_bytes);
            hasher.update(i.to_be_bytes());
            Scalar::from_be_bytes_mod_order(&hasher.finalize())
        })
        .collect_vec()
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use rand::thread_rng;

    use crate::test_helpers::TestScalar;

    use super::{commit_scalars, expand_seed, verify_commitment};

    /// Tests that a commitment only opens to the committed values
    #[test]
    fn test_commit_verify() {
        let mut rng = thread_rng();
        let values = (0..3).map(|_| TestScalar::random(&mut rng)).collect_vec();
        let comm = commit_scalars(&values);

        assert!(verify_commitment(&comm, &values));

        let mut tampered = values.clone();
        tampered[1] += TestScalar::one();
        assert!(!verify_commitment(&comm, &tampered));
    }

    /// Tests that seed expansion is deterministic and prefix stable
    #[test]
    fn test_expand_seed() {
        let seed = TestScalar::from(42u8);
        let short = expand_seed(&seed, 2);
        let long = expand_seed(&seed, 5);

        assert_eq!(long.len(), 5);
        assert_eq!(short[..], long[..2]);
        assert_ne!(long[0], long[1]);
        assert_ne!(expand_seed(&TestScalar::from(43u8), 1)[0], long[0]);
    }
}
