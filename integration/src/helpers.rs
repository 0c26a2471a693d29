//! Defines helpers for integration tests

use std::fmt::Debug;

use ark_spdz::{
    fabric::LocalGate, test_helpers::execute_mock_mpc_with_config, Executor, ProtocolBuilder,
    ResultHandle,
};
use futures::Future;
use tokio::runtime::Handle;

use crate::{IntegrationTestArgs, TestField, TestScalar};

// -----------
// | Helpers |
// -----------

/// Compares two scalars, returning a result that can be propagated up an
/// integration test stack in the case that the scalars are not equal
pub(crate) fn assert_scalars_eq(a: TestScalar, b: TestScalar) -> Result<(), String> {
    if a == b {
        Ok(())
    } else {
        Err(format!("{a:?} != {b:?}"))
    }
}

/// Assert a batch of scalars equal one another
pub(crate) fn assert_scalar_batches_eq(
    a: Vec<TestScalar>,
    b: Vec<TestScalar>,
) -> Result<(), String> {
    if a.len() != b.len() {
        return Err(format!("Lengths differ: {a:?} != {b:?}"));
    }

    for (a, b) in a.into_iter().zip(b.into_iter()) {
        assert_scalars_eq(a, b)?;
    }

    Ok(())
}

/// Assert that an error occurred during MPC execution
pub(crate) fn assert_err<T, E>(res: Result<T, E>) -> Result<(), String> {
    if res.is_err() {
        Ok(())
    } else {
        Err("Expected error, got Ok".to_string())
    }
}

/// Unwrap every party's output, all of which must agree
pub(crate) fn agreed_output<T, E>(outputs: Vec<Result<T, E>>) -> Result<T, String>
where
    T: Debug + PartialEq,
    E: Debug,
{
    let mut outputs = outputs
        .into_iter()
        .enumerate()
        .map(|(party, res)| res.map_err(|err| format!("party {party} failed: {err:?}")))
        .collect::<Result<Vec<_>, _>>()?;

    let first = outputs.remove(0);
    if let Some(other) = outputs.iter().find(|other| **other != first) {
        return Err(format!("parties disagree: {first:?} != {other:?}"));
    }

    Ok(first)
}

/// Await a future by blocking the current thread
pub(crate) fn await_result<R, T: Future<Output = R>>(res: T) -> R {
    Handle::current().block_on(res)
}

/// Run a computation between the test's parties, returning each party's
/// output in party order
pub(crate) fn run_mpc<T, S, F>(test_args: &IntegrationTestArgs, f: F) -> Vec<T>
where
    T: Send + 'static,
    S: Future<Output = T> + Send + 'static,
    F: FnMut(Executor<TestField>) -> S,
{
    await_result(execute_mock_mpc_with_config(test_args.n_parties, test_args.config.clone(), f))
}

/// Apply a local function to a result once it resolves
pub(crate) fn map<T, U, M>(
    builder: &mut ProtocolBuilder<TestField>,
    handle: &ResultHandle<T>,
    f: M,
) -> ResultHandle<U>
where
    T: Clone + Send + Sync + 'static,
    U: Send + Sync + 'static,
    M: 'static + Send + FnOnce(T) -> U,
{
    let output = builder.allocate();
    let input = handle.clone();
    builder.append(LocalGate::new("map", vec![Box::new(handle.clone())], output.clone(), move |_| {
        Ok(f(input.resolved_value()?))
    }));

    output
}

/// Join two results into a pair once both resolve
pub(crate) fn zip<A, B>(
    builder: &mut ProtocolBuilder<TestField>,
    a: &ResultHandle<A>,
    b: &ResultHandle<B>,
) -> ResultHandle<(A, B)>
where
    A: Clone + Send + Sync + 'static,
    B: Clone + Send + Sync + 'static,
{
    let output = builder.allocate();
    let (lhs, rhs) = (a.clone(), b.clone());
    builder.append(LocalGate::new(
        "zip",
        vec![Box::new(a.clone()), Box::new(b.clone())],
        output.clone(),
        move |_| Ok((lhs.resolved_value()?, rhs.resolved_value()?)),
    ));

    output
}
