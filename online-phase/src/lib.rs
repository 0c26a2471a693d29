#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

//! Defines an SPDZ style MPC runtime over a generic Arkworks prime field
//!
//! Applications are assembled lazily through a [`ProtocolBuilder`] and driven
//! round by round by an [`Executor`], which batches every ready instruction
//! into shared network exchanges and verifies opened values with a deferred
//! batch MAC check

pub mod algebra;
pub mod commitment;
pub mod error;
pub mod fabric;
pub mod network;
pub mod offline_prep;
pub mod spdz;

pub use fabric::{
    Computation, Deferred, EvaluationStrategy, Executor, ExecutorConfig, FlushPolicy, Instruction,
    MpcFabric, ProtocolBuilder, ResultHandle, ResultId, RoundContext, SessionState,
};

// -------------
// | Constants |
// -------------

/// The first party
pub const PARTY0: u64 = 0;
/// The second party
pub const PARTY1: u64 = 1;
/// The third party
pub const PARTY2: u64 = 2;

// --------------------
// | Crate-wide Types |
// --------------------

#[cfg(any(test, feature = "test_helpers"))]
pub mod test_helpers {
    //! Defines test helpers for use in unit and integration tests, as well as
    //! benchmarks
    use futures::{future, Future};
    use itertools::Itertools;
    use rand::{thread_rng, Rng};

    use crate::{
        algebra::Scalar,
        fabric::{Executor, ExecutorConfig},
        network::{MockNetwork, NoRecvNetwork},
        offline_prep::DummyDataSupplier,
        PARTY0,
    };

    /// A field used for testing algebra implementations, set to the bn254
    /// scalar field
    pub type TestField = ark_bn254::Fr;
    /// A scalar in the test field
    pub type TestScalar = Scalar<TestField>;

    /// Build one dummy data supplier per party, all drawing from the same seed
    pub fn mock_suppliers(n_parties: usize, seed: u64) -> Vec<DummyDataSupplier<TestField>> {
        (0..n_parties as u64).map(|party| DummyDataSupplier::new(party, n_parties, seed)).collect_vec()
    }

    /// Create a single party executor that never touches the network
    ///
    /// Must be called from within a tokio runtime
    pub fn mock_executor() -> Executor<TestField> {
        let network = NoRecvNetwork::default();
        let supplier = DummyDataSupplier::new(PARTY0, 1 /* n_parties */, thread_rng().gen());

        Executor::new(network, supplier, ExecutorConfig::default())
    }

    /// Run a mock MPC between `n_parties` parties connected by an in-memory
    /// mesh
    ///
    /// This will spawn one task per party and returns the outputs ordered by
    /// party ID
    pub async fn execute_mock_mpc<T, S, F>(n_parties: usize, f: F) -> Vec<T>
    where
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        F: FnMut(Executor<TestField>) -> S,
    {
        execute_mock_mpc_with_config(n_parties, ExecutorConfig::default(), f).await
    }

    /// Run a mock MPC with the given executor configuration
    pub async fn execute_mock_mpc_with_config<T, S, F>(
        n_parties: usize,
        config: ExecutorConfig,
        f: F,
    ) -> Vec<T>
    where
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        F: FnMut(Executor<TestField>) -> S,
    {
        let suppliers = mock_suppliers(n_parties, thread_rng().gen());
        execute_mock_mpc_with_suppliers(suppliers, config, f).await
    }

    /// Run a mock MPC with the given executor configuration and per-party
    /// data suppliers
    pub async fn execute_mock_mpc_with_suppliers<T, S, F>(
        suppliers: Vec<DummyDataSupplier<TestField>>,
        config: ExecutorConfig,
        mut f: F,
    ) -> Vec<T>
    where
        T: Send + 'static,
        S: Future<Output = T> + Send + 'static,
        F: FnMut(Executor<TestField>) -> S,
    {
        let networks = MockNetwork::new_mesh(suppliers.len());
        let tasks = networks
            .into_iter()
            .zip(suppliers)
            .map(|(network, supplier)| {
                let executor = Executor::new(network, supplier, config.clone());
                tokio::spawn(f(executor))
            })
            .collect_vec();

        future::join_all(tasks).await.into_iter().map(|res| res.unwrap()).collect_vec()
    }
}
