//! Defines an MPC fabric for the protocol
//!
//! The fabric acts as a dependency injection layer. It holds the session
//! parameters and the data supplier, and allocates the results that the
//! computation graph passes between steps. Builders, instructions, and the
//! executor all share one fabric per session

mod builder;
mod config;
mod executor;
mod instruction;
mod network_sender;
mod result;
mod step;

pub use builder::{Computation, ProtocolBuilder};
pub use config::{EvaluationStrategy, ExecutorConfig, FlushPolicy};
pub use executor::{Executor, SessionState};
pub use instruction::{Instruction, LocalGate, RoundContext};
pub use network_sender::NetworkStats;
pub use result::{Deferred, ResultHandle, ResultId, SessionId};

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use ark_ff::PrimeField;
use itertools::Itertools;
use zeroize::Zeroize;

use crate::{
    algebra::{FieldDefinition, Scalar},
    network::PartyId,
    offline_prep::DataSupplier,
};

/// Error message emitted when the data supplier lock is poisoned
const ERR_SUPPLIER_POISONED: &str = "data supplier lock poisoned";

/// The source of session IDs, shared by every fabric in the process
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(0);

/// A shared reference to a boxed data supplier
pub(crate) type SharedSupplier<F> = Arc<Mutex<Box<dyn DataSupplier<F>>>>;

/// The state of a session shared between the builder, instructions, and
/// executor
#[derive(Clone)]
pub struct MpcFabric<F: PrimeField> {
    /// The inner fabric
    inner: Arc<FabricInner<F>>,
}

/// The inner state of the fabric
struct FabricInner<F: PrimeField> {
    /// The ID of the local party
    party_id: PartyId,
    /// The number of parties in the session
    n_parties: usize,
    /// The ID of the session
    session_id: SessionId,
    /// The next result ID to allocate
    next_id: AtomicUsize,
    /// The local party's share of the mac key
    mac_key_share: Scalar<F>,
    /// The field the session computes over
    field: FieldDefinition,
    /// The source of preprocessed material
    supplier: SharedSupplier<F>,
}

impl<F: PrimeField> Drop for FabricInner<F> {
    fn drop(&mut self) {
        Zeroize::zeroize(&mut self.mac_key_share.0);
    }
}

impl<F: PrimeField> Debug for MpcFabric<F> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MpcFabric")
            .field("party_id", &self.inner.party_id)
            .field("n_parties", &self.inner.n_parties)
            .field("session_id", &self.inner.session_id)
            .finish()
    }
}

impl<F: PrimeField> MpcFabric<F> {
    /// Constructor
    pub(crate) fn new<S: 'static + DataSupplier<F>>(
        party_id: PartyId,
        n_parties: usize,
        supplier: S,
    ) -> Self {
        let mac_key_share = supplier.mac_key_share();
        let field = supplier.field_definition();
        let supplier: Box<dyn DataSupplier<F>> = Box::new(supplier);

        Self {
            inner: Arc::new(FabricInner {
                party_id,
                n_parties,
                session_id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                next_id: AtomicUsize::new(0),
                mac_key_share,
                field,
                supplier: Arc::new(Mutex::new(supplier)),
            }),
        }
    }

    // -----------
    // | Getters |
    // -----------

    /// Get the party ID of the local party
    pub fn party_id(&self) -> PartyId {
        self.inner.party_id
    }

    /// Get the number of parties in the session
    pub fn n_parties(&self) -> usize {
        self.inner.n_parties
    }

    /// Get the IDs of every party other than the local party, in order
    pub fn peers(&self) -> Vec<PartyId> {
        (0..self.inner.n_parties as PartyId).filter(|id| *id != self.inner.party_id).collect_vec()
    }

    /// Get the ID of the session
    pub fn session_id(&self) -> SessionId {
        self.inner.session_id
    }

    /// Get the definition of the field the session computes over
    pub fn field_definition(&self) -> &FieldDefinition {
        &self.inner.field
    }

    /// Get the local party's share of the mac key
    pub(crate) fn mac_key_share(&self) -> Scalar<F> {
        self.inner.mac_key_share
    }

    /// Lock the data supplier
    pub(crate) fn supplier(&self) -> MutexGuard<'_, Box<dyn DataSupplier<F>>> {
        self.inner.supplier.lock().expect(ERR_SUPPLIER_POISONED)
    }

    // ----------------------
    // | Result Allocation |
    // ----------------------

    /// Allocate a new unresolved result
    pub fn new_result<T>(&self) -> ResultHandle<T> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        ResultHandle::new(id, self.inner.session_id)
    }

    /// Allocate a result that is resolved to the given value
    pub fn constant<T>(&self, value: T) -> ResultHandle<T> {
        let handle = self.new_result();
        // A freshly allocated cell is empty
        let _ = handle.resolve(value);
        handle
    }
}
