//! The batched mac check over the session's backlog of opened values
//!
//! The parties jointly sample one random coefficient per opened value, then
//! each party commits to and reveals its share of the combined mac
//! difference. The shares sum to zero exactly when every opened value carried
//! a consistent mac, except with negligible probability

use ark_ff::PrimeField;
use itertools::Itertools;
use rand::thread_rng;
use tracing::log;

use crate::{
    algebra::{Scalar, ScalarShare},
    commitment::{commit_scalars, expand_seed, verify_commitment},
    error::MpcError,
    fabric::{Instruction, ResultHandle, ResultId, RoundContext},
    network::PartyId,
};

/// The rounds of the check
const COMMIT_SEED_ROUND: usize = 0;
/// Reveal the seeds and derive the coefficients
const REVEAL_SEED_ROUND: usize = 1;
/// Commit to the mac difference share
const COMMIT_SIGMA_ROUND: usize = 2;
/// Reveal the mac difference shares
const REVEAL_SIGMA_ROUND: usize = 3;
/// The number of rounds of the check
const N_ROUNDS: usize = 4;

// -----------
// | Helpers |
// -----------

/// Compute the linear combination `sum_j r_j * x_j`
pub fn linear_combination<F: PrimeField>(coeffs: &[Scalar<F>], values: &[Scalar<F>]) -> Scalar<F> {
    coeffs.iter().zip(values.iter()).map(|(r, x)| r * x).sum()
}

/// Compute the local share of the combined mac difference
///
/// `sigma_i = sum_j r_j * mac_ij - alpha_i * sum_j r_j * x_j`
pub fn mac_check_share<F: PrimeField>(
    coeffs: &[Scalar<F>],
    shares: &[ScalarShare<F>],
    values: &[Scalar<F>],
    mac_key_share: Scalar<F>,
) -> Scalar<F> {
    let macs = shares.iter().map(ScalarShare::mac).collect_vec();
    linear_combination(coeffs, &macs) - mac_key_share * linear_combination(coeffs, values)
}

// ------------
// | The Gate |
// ------------

/// The four round mac check instruction
///
/// The backlog is popped from the session's store when the gate starts, the
/// output resolves to the number of values checked
pub struct MacCheckGate<F: PrimeField> {
    /// The popped shares of the values under check
    shares: Vec<ScalarShare<F>>,
    /// The popped opened values under check
    values: Vec<Scalar<F>>,
    /// The local seed contribution
    seed: Scalar<F>,
    /// The peers' commitments to their seeds, in peer order
    seed_commitments: Vec<Scalar<F>>,
    /// The local mac difference share
    sigma: Scalar<F>,
    /// The peers' commitments to their mac difference shares, in peer order
    sigma_commitments: Vec<Scalar<F>>,
    /// The number of values checked
    output: ResultHandle<usize>,
}

impl<F: PrimeField> MacCheckGate<F> {
    /// Constructor
    pub fn new(output: ResultHandle<usize>) -> Self {
        Self {
            shares: Vec::new(),
            values: Vec::new(),
            seed: Scalar::zero(),
            seed_commitments: Vec::new(),
            sigma: Scalar::zero(),
            sigma_commitments: Vec::new(),
            output,
        }
    }

    /// Receive a value from every peer and check it against the peer's
    /// commitment
    fn receive_verified(
        ctx: &mut RoundContext<'_, F>,
        commitments: &[Scalar<F>],
    ) -> Result<Vec<Scalar<F>>, MpcError> {
        let peers: Vec<PartyId> = ctx.peers();
        let revealed: Vec<Scalar<F>> = ctx.receive_from_all()?;

        for ((peer, value), comm) in peers.iter().zip(revealed.iter()).zip(commitments.iter()) {
            if !verify_commitment(comm, &[*value]) {
                return Err(MpcError::InvalidCommitment(*peer));
            }
        }

        Ok(revealed)
    }
}

impl<F: PrimeField> Instruction<F> for MacCheckGate<F> {
    fn name(&self) -> &str {
        "mac-check"
    }

    fn n_rounds(&self) -> usize {
        N_ROUNDS
    }

    fn communicates(&self, _round: usize) -> bool {
        true
    }

    fn outputs(&self) -> Vec<ResultId> {
        vec![self.output.id()]
    }

    fn compute_and_send(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        match round {
            COMMIT_SEED_ROUND => {
                let (shares, values) = ctx.opened_values().pop_values();
                self.shares = shares;
                self.values = values;

                self.seed = Scalar::random(&mut thread_rng());
                ctx.broadcast(commit_scalars(&[self.seed]))
            },
            REVEAL_SEED_ROUND => ctx.broadcast(self.seed),
            COMMIT_SIGMA_ROUND => ctx.broadcast(commit_scalars(&[self.sigma])),
            REVEAL_SIGMA_ROUND => ctx.broadcast(self.sigma),
            _ => Err(MpcError::ProtocolViolation(format!("mac check has no round {round}"))),
        }
    }

    fn receive_and_resolve(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        match round {
            COMMIT_SEED_ROUND => {
                self.seed_commitments = ctx.receive_from_all()?;
                Ok(())
            },
            REVEAL_SEED_ROUND => {
                let peer_seeds = Self::receive_verified(ctx, &self.seed_commitments)?;
                let joint_seed = self.seed + peer_seeds.into_iter().sum::<Scalar<F>>();

                let coeffs = expand_seed(&joint_seed, self.values.len());
                self.sigma =
                    mac_check_share(&coeffs, &self.shares, &self.values, ctx.mac_key_share());
                Ok(())
            },
            COMMIT_SIGMA_ROUND => {
                self.sigma_commitments = ctx.receive_from_all()?;
                Ok(())
            },
            REVEAL_SIGMA_ROUND => {
                let peer_sigmas = Self::receive_verified(ctx, &self.sigma_commitments)?;
                let total = self.sigma + peer_sigmas.into_iter().sum::<Scalar<F>>();

                let n_checked = self.values.len();
                if total != Scalar::zero() {
                    log::error!("mac check over {n_checked} opened values failed");
                    return Err(MpcError::AuthenticationError);
                }

                log::debug!("mac check over {n_checked} opened values passed");
                self.output.resolve(n_checked)
            },
            _ => Err(MpcError::ProtocolViolation(format!("mac check has no round {round}"))),
        }
    }
}

#[cfg(test)]
mod test {
    use itertools::Itertools;
    use rand::thread_rng;

    use crate::{
        algebra::ScalarShare,
        offline_prep::DataSupplier,
        test_helpers::{mock_suppliers, TestField, TestScalar},
    };

    use super::mac_check_share;

    /// Tests that honest mac difference shares sum to zero and a shifted
    /// value does not
    #[test]
    fn test_mac_check_share() {
        let mut rng = thread_rng();
        let mut suppliers = mock_suppliers(3, 11);

        // Open a few random elements locally
        let per_party = suppliers
            .iter_mut()
            .map(|s| (0..4).map(|_| s.next_random_element().unwrap()).collect_vec())
            .collect_vec();
        let values = (0..4)
            .map(|j| per_party.iter().map(|shares| shares[j]).sum::<ScalarShare<TestField>>().share())
            .collect_vec();
        let coeffs = (0..4).map(|_| TestScalar::random(&mut rng)).collect_vec();

        let sigma = |values: &[TestScalar]| -> TestScalar {
            suppliers
                .iter()
                .zip(per_party.iter())
                .map(|(s, shares)| mac_check_share(&coeffs, shares, values, s.mac_key_share()))
                .sum()
        };

        assert_eq!(sigma(&values), TestScalar::zero());

        let mut tampered = values.clone();
        tampered[2] += TestScalar::one();
        assert_ne!(sigma(&tampered), TestScalar::zero());
    }
}
