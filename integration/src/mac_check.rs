//! Integration tests for the mac check over opened values

use ark_spdz::{algebra::ScalarShare, ExecutorConfig, PARTY0};
use itertools::Itertools;

use crate::{
    helpers::{agreed_output, assert_err, map, run_mpc},
    IntegrationTest, IntegrationTestArgs, TestScalar,
};

/// The number of values opened by each test
const N_OPENED: usize = 10;

/// Tests that an explicit check covers every value opened before it, and that
/// nothing is left over for the end of the run
fn test_check_count(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let res = run_mpc(test_args, |mut executor| async move {
        let in_run = executor
            .run(|root| {
                root.seq(|builder| {
                    let mut numeric = builder.numeric();
                    let values = (0..N_OPENED).map(|_| numeric.random_element()).collect_vec();
                    let opened = numeric.open_batch(&values);
                    builder.collect(&opened)
                })
                .seq(|builder, _| builder.numeric().check_macs())
                .output()
            })
            .await?;

        let after_run = executor.check_macs().await?;
        Ok::<_, ark_spdz::error::MpcError>((in_run, after_run))
    });

    let (in_run, after_run) = agreed_output(res)?;
    if in_run != N_OPENED || after_run != 0 {
        return Err(format!("expected ({N_OPENED}, 0) values checked, got ({in_run}, {after_run})"));
    }

    Ok(())
}

/// Tests that a share shifted by party 0 before opening fails the check at
/// every party
fn test_tampered_share(test_args: &IntegrationTestArgs) -> Result<(), String> {
    tampered_run(test_args, test_args.config.clone())
}

/// Tests that a low threshold catches a tampered share mid-run
fn test_tampered_share_periodic(test_args: &IntegrationTestArgs) -> Result<(), String> {
    tampered_run(test_args, test_args.config.clone().with_mac_check_threshold(1))
}

/// Open a set of random values, the first shifted at party 0, and expect
/// every party to fail
fn tampered_run(test_args: &IntegrationTestArgs, config: ExecutorConfig) -> Result<(), String> {
    let args = IntegrationTestArgs { config, ..test_args.clone() };
    let res = run_mpc(&args, |mut executor| async move {
        let party_id = executor.party_id();
        executor
            .run(move |root| {
                root.seq(move |builder| {
                    let mut numeric = builder.numeric();
                    let mut values = (0..N_OPENED).map(|_| numeric.random_element()).collect_vec();

                    if party_id == PARTY0 {
                        values[0] = map(builder, &values[0], |share| {
                            ScalarShare::new(share.share() + TestScalar::one(), share.mac())
                        });
                    }

                    let opened = builder.numeric().open_batch(&values);
                    builder.collect(&opened)
                })
                .seq(|builder, opened| {
                    let sum = opened.into_iter().sum::<TestScalar>();
                    builder.constant(sum)
                })
                .output()
            })
            .await
    });

    for party_res in res {
        assert_err(party_res)?;
    }

    Ok(())
}

/// Tests that a long run of honest openings passes with the periodic check
/// firing after every batch
fn test_periodic_check(test_args: &IntegrationTestArgs) -> Result<(), String> {
    let config = test_args.config.clone().with_mac_check_threshold(1);
    let args = IntegrationTestArgs { config, ..test_args.clone() };

    let res = run_mpc(&args, |mut executor| async move {
        executor
            .run(|root| {
                root.seq(|builder| builder.constant((0usize, TestScalar::zero())))
                    .while_loop(
                        |(i, _)| *i < N_OPENED,
                        |builder, (i, total)| {
                            let value = builder.numeric().random_bit();
                            let opened = builder.numeric().open(&value);
                            map(builder, &opened, move |bit| (i + 1, total + bit))
                        },
                    )
                    .seq(|builder, (i, _)| builder.constant(i))
                    .output()
            })
            .await
    });

    let n_iterations = agreed_output(res)?;
    if n_iterations != N_OPENED {
        return Err(format!("expected {N_OPENED} iterations, got {n_iterations}"));
    }

    Ok(())
}

inventory::submit!(IntegrationTest {
    name: "mac_check::test_check_count",
    test_fn: test_check_count
});
inventory::submit!(IntegrationTest {
    name: "mac_check::test_tampered_share",
    test_fn: test_tampered_share
});
inventory::submit!(IntegrationTest {
    name: "mac_check::test_tampered_share_periodic",
    test_fn: test_tampered_share_periodic
});
inventory::submit!(IntegrationTest {
    name: "mac_check::test_periodic_check",
    test_fn: test_periodic_check
});
