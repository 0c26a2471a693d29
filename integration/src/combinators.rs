//! Integration tests for the builder's control flow combinators

use ark_spdz::{algebra::ScalarShare, ProtocolBuilder, ResultHandle, PARTY0, PARTY1};
use itertools::Itertools;
use rand::thread_rng;

use crate::{
    helpers::{agreed_output, assert_scalar_batches_eq, assert_scalars_eq, map, run_mpc, zip},
    IntegrationTest, IntegrationTestArgs, TestField, TestScalar,
};

/// Re-enter a share produced by an earlier fragment
fn reenter(
    builder: &mut ProtocolBuilder<TestField>,
    share: ScalarShare<TestField>,
) -> ResultHandle<ScalarShare<TestField>> {
    builder.constant(share)
}

/// Tests a while loop that squares a shared value a fixed number of times
fn test_repeated_squaring(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let n_squarings = 4u64;
    let x = TestScalar::random(&mut thread_rng());

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                root.seq(move |builder| {
                    let x = builder.numeric().input((party_id == PARTY0).then_some(x), PARTY0);
                    map(builder, &x, |x| (0u64, x))
                })
                .while_loop(
                    move |(i, _)| *i < n_squarings,
                    |builder, (i, x)| {
                        let x = reenter(builder, x);
                        let squared = builder.numeric().mul(&x, &x);
                        map(builder, &squared, move |squared| (i + 1, squared))
                    },
                )
                .seq(|builder, (_, x)| {
                    let x = reenter(builder, x);
                    builder.numeric().open(&x)
                })
                .output()
            })
            .await
    });

    assert_scalars_eq(agreed_output(res)?, x.pow(1 << n_squarings))
}

/// Tests a while loop whose predicate never holds
fn test_empty_loop(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let res = run_mpc(test_args, |mut executor| async move {
        executor
            .run(|root| {
                root.seq(|builder| builder.constant(7u64))
                    .while_loop(|i| *i < 7, |builder, i| builder.constant(i + 1))
                    .output()
            })
            .await
    });

    let iterations = agreed_output(res)?;
    if iterations != 7 {
        return Err(format!("expected loop state 7, got {iterations}"));
    }

    Ok(())
}

/// Tests running two communicating fragments side by side
fn test_pair_in_par(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let mut rng = thread_rng();
    let a = TestScalar::random(&mut rng);
    let b = TestScalar::random(&mut rng);

    let res = run_mpc(test_args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                root.par(move |builder| {
                    let mut numeric = builder.numeric();
                    let a = numeric.input((party_id == PARTY0).then_some(a), PARTY0);
                    let b = numeric.input((party_id == PARTY1).then_some(b), PARTY1);
                    builder.collect(&[a, b])
                })
                .pair_in_par(
                    |builder, shares| {
                        let shares = shares.into_iter().map(|s| reenter(builder, s)).collect_vec();
                        let product = builder.numeric().mul(&shares[0], &shares[1]);
                        builder.numeric().open(&product)
                    },
                    |builder, shares| {
                        let shares = shares.into_iter().map(|s| reenter(builder, s)).collect_vec();
                        let sum = builder.numeric().add(&shares[0], &shares[1]);
                        let squared = builder.numeric().mul(&sum, &sum);
                        builder.numeric().open(&squared)
                    },
                )
                .seq(|builder, (product, squared)| builder.constant(vec![product, squared]))
                .output()
            })
            .await
    });

    let expected = vec![a * b, (a + b) * (a + b)];
    assert_scalar_batches_eq(agreed_output(res)?, expected)
}

/// Tests exiting a chain early on an opened flag
///
/// Party 0 chooses whether the rest of the chain runs, the remaining fragment
/// squares a value input by party 1
fn test_early_out(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let x = TestScalar::random(&mut thread_rng());

    for proceed in [false, true] {
        let flag = if proceed { TestScalar::one() } else { TestScalar::zero() };
        let res = run_mpc(test_args, |mut executor| async move {
            let party_id = executor.party_id();
            executor
                .run(move |root| {
                    root.seq(move |builder| {
                        let mut numeric = builder.numeric();
                        let x = numeric.input((party_id == PARTY1).then_some(x), PARTY1);
                        let flag = numeric.input((party_id == PARTY0).then_some(flag), PARTY0);
                        let flag = numeric.open(&flag);

                        zip(builder, &flag, &x)
                    })
                    .early_out(|builder, (flag, x)| {
                        if flag == TestScalar::zero() {
                            return None;
                        }

                        let x = reenter(builder, x);
                        let squared = builder.numeric().mul(&x, &x);
                        Some(builder.numeric().open(&squared))
                    })
                    .output()
                })
                .await
        });

        let expected = proceed.then(|| x * x);
        let output = agreed_output(res)?;
        if output != expected {
            return Err(format!("expected {expected:?}, got {output:?}"));
        }
    }

    Ok(())
}

inventory::submit!(IntegrationTest {
    name: "combinators::test_repeated_squaring",
    test_fn: test_repeated_squaring
});
inventory::submit!(IntegrationTest {
    name: "combinators::test_empty_loop",
    test_fn: test_empty_loop
});
inventory::submit!(IntegrationTest {
    name: "combinators::test_pair_in_par",
    test_fn: test_pair_in_par
});
inventory::submit!(IntegrationTest {
    name: "combinators::test_early_out",
    test_fn: test_early_out
});
