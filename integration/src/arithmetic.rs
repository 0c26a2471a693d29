//! Integration tests for the authenticated arithmetic suite

use ark_spdz::{algebra::ScalarShare, PARTY0, PARTY1};
use itertools::Itertools;
use rand::thread_rng;

use crate::{
    helpers::{agreed_output, assert_scalar_batches_eq, assert_scalars_eq, map, run_mpc, zip},
    IntegrationTest, IntegrationTestArgs, TestField, TestScalar,
};

/// Tests that every party can input a value
fn test_input(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let mut rng = thread_rng();
    let values = (0..test_args.n_parties).map(|_| TestScalar::random(&mut rng)).collect_vec();

    let res = run_mpc(test_args, |mut executor| {
        let values = values.clone();
        async move {
            let party_id = executor.party_id();
            executor
                .run(move |root| {
                    let shared = values
                        .iter()
                        .enumerate()
                        .map(|(party, value)| {
                            let party = party as u64;
                            root.numeric().input((party == party_id).then_some(*value), party)
                        })
                        .collect_vec();

                    let opened = root.numeric().open_batch(&shared);
                    root.collect(&opened)
                })
                .await
        }
    });

    assert_scalar_batches_eq(agreed_output(res)?, values)
}

/// Tests an inner product between two vectors of shared scalars
///
/// We take the inner product <a, b> where party 0 chooses a, and party 1
/// chooses b
fn test_inner_product(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let n = 50;
    let mut rng = thread_rng();
    let a = (0..n).map(|_| TestScalar::random(&mut rng)).collect_vec();
    let b = (0..n).map(|_| TestScalar::random(&mut rng)).collect_vec();
    let expected: TestScalar = a.iter().zip(b.iter()).map(|(a, b)| a * b).sum();

    let res = run_mpc(test_args, |mut executor| {
        let (a, b) = (a.clone(), b.clone());
        async move {
            let party_id = executor.party_id();
            executor
                .run(move |root| {
                    root.par(move |builder| {
                        let mut numeric = builder.numeric();
                        let mut shared = a
                            .into_iter()
                            .map(|a| numeric.input((party_id == PARTY0).then_some(a), PARTY0))
                            .collect_vec();
                        shared.extend(
                            b.into_iter()
                                .map(|b| numeric.input((party_id == PARTY1).then_some(b), PARTY1)),
                        );

                        builder.collect(&shared)
                    })
                    .seq(|builder, shared| {
                        let shared = shared.into_iter().map(|s| builder.constant(s)).collect_vec();
                        let (a, b) = shared.split_at(shared.len() / 2);

                        let products = builder.numeric().mul_batch(a, b);
                        builder.collect(&products)
                    })
                    .seq(|builder, products| {
                        let sum: ScalarShare<TestField> = products.into_iter().sum();
                        let sum = builder.constant(sum);
                        builder.numeric().open(&sum)
                    })
                    .output()
                })
                .await
        }
    });

    assert_scalars_eq(agreed_output(res)?, expected)
}

/// Tests a mix of linear operations and multiplications
fn test_polynomial(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let mut rng = thread_rng();
    let x = TestScalar::random(&mut rng);
    let c = TestScalar::random(&mut rng);

    // 3x^2 - cx + 1
    let three = TestScalar::from(3u8);
    let expected = three * x * x - c * x + TestScalar::one();

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                let c = root.constant(c);
                let three = root.constant(three);
                let mut numeric = root.numeric();

                let x = numeric.input((party_id == PARTY1).then_some(x), PARTY1);
                let one = numeric.known(TestScalar::one());

                let x_sq = numeric.mul(&x, &x);
                let quad = numeric.mul_public(&x_sq, &three);
                let lin = numeric.mul_public(&x, &c);
                let diff = numeric.sub(&quad, &lin);
                let res = numeric.add(&diff, &one);
                numeric.open(&res)
            })
            .await
    });

    assert_scalars_eq(agreed_output(res)?, expected)
}

/// Tests exponentiating a shared value with an exponentiation pipe
///
/// With a pipe `r^-1, r, ..., r^l` the parties open `c = x * r^-1`, after
/// which `x^k = c^k * r^k` is a local operation
fn test_exp_pipe_power(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let k = 5;
    let x = TestScalar::random(&mut thread_rng());

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                root.seq(|builder| builder.constant(()))
                    .pair_in_par(
                        move |builder, _| {
                            builder.numeric().input((party_id == PARTY0).then_some(x), PARTY0)
                        },
                        |builder, _| builder.numeric().exp_pipe(),
                    )
                    .seq(move |builder, (x, pipe)| {
                        let x = builder.constant(x);
                        let r_inv = builder.constant(pipe[0]);
                        let r_k = builder.constant(pipe[k]);

                        let masked = builder.numeric().mul(&x, &r_inv);
                        let c = builder.numeric().open(&masked);
                        let c_k = map(builder, &c, move |c| c.pow(k as u64));

                        let x_k = builder.numeric().mul_public(&r_k, &c_k);
                        builder.numeric().open(&x_k)
                    })
                    .output()
            })
            .await
    });

    assert_scalars_eq(agreed_output(res)?, x.pow(k as u64))
}

/// Tests opening `c - x` to the last party only, for a secret `x` of party 0
fn test_open_to(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let mut rng = thread_rng();
    let x = TestScalar::random(&mut rng);
    let c = TestScalar::random(&mut rng);
    let recipient = (test_args.n_parties - 1) as u64;

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                let c = root.constant(c);
                let mut numeric = root.numeric();

                let x = numeric.input((party_id == PARTY0).then_some(x), PARTY0);
                let diff = numeric.public_sub(&c, &x);
                numeric.open_to(&diff, recipient)
            })
            .await
    });

    for (party, output) in res.into_iter().enumerate() {
        let output = output.map_err(|err| format!("party {party} failed: {err:?}"))?;
        let expected = (party as u64 == recipient).then_some(c - x);
        if output != expected {
            return Err(format!("party {party} expected {expected:?}, got {output:?}"));
        }
    }

    Ok(())
}

/// Tests the local operations on an opened value: its inverse and its powers
fn test_opened_powers(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let x = TestScalar::random(&mut thread_rng());
    let max_exp = 4;

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                let mut numeric = root.numeric();
                let x = numeric.input((party_id == PARTY1).then_some(x), PARTY1);
                let opened = numeric.open(&x);

                let inverse = numeric.invert(&opened);
                let powers = numeric.exp_from_open(&opened, max_exp);
                zip(root, &inverse, &powers)
            })
            .await
    });

    let (inverse, powers) = agreed_output(res)?;
    assert_scalars_eq(inverse * x, TestScalar::one())?;

    let expected = (1..=max_exp).map(|exp| x.pow(exp as u64)).collect_vec();
    assert_scalar_batches_eq(powers, expected)
}

/// Tests that random bits open to zero or one
fn test_random_bits(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let res = run_mpc(test_args, |mut executor| async move {
        executor
            .run(|root| {
                let mut numeric = root.numeric();
                let bits = (0..20).map(|_| numeric.random_bit()).collect_vec();
                let opened = numeric.open_batch(&bits);
                root.collect(&opened)
            })
            .await
    });

    let bits = agreed_output(res)?;
    if bits.iter().any(|bit| *bit != TestScalar::zero() && *bit != TestScalar::one()) {
        return Err(format!("non-binary value in {bits:?}"));
    }

    Ok(())
}

inventory::submit!(IntegrationTest { name: "arithmetic::test_input", test_fn: test_input });
inventory::submit!(IntegrationTest {
    name: "arithmetic::test_inner_product",
    test_fn: test_inner_product
});
inventory::submit!(IntegrationTest {
    name: "arithmetic::test_polynomial",
    test_fn: test_polynomial
});
inventory::submit!(IntegrationTest {
    name: "arithmetic::test_exp_pipe_power",
    test_fn: test_exp_pipe_power
});
inventory::submit!(IntegrationTest {
    name: "arithmetic::test_random_bits",
    test_fn: test_random_bits
});
inventory::submit!(IntegrationTest { name: "arithmetic::test_open_to", test_fn: test_open_to });
inventory::submit!(IntegrationTest {
    name: "arithmetic::test_opened_powers",
    test_fn: test_opened_powers
});
