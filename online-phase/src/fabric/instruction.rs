//! Defines the atomic unit of work the scheduler drives, and the context an
//! instruction sees in each of its rounds

use std::{collections::VecDeque, sync::MutexGuard};

use ark_ff::PrimeField;
use itertools::Itertools;

use crate::{
    algebra::Scalar,
    error::{MpcError, MpcNetworkError},
    network::{NetworkPayload, PartyId},
    offline_prep::DataSupplier,
    spdz::OpenedValueStore,
};

use super::{Deferred, MpcFabric, ResultHandle, ResultId};

// ---------------------
// | Instruction Trait |
// ---------------------

/// A protocol step that runs for a fixed number of rounds
///
/// In each round the scheduler first calls `compute_and_send` on every
/// instruction of the batch, then exchanges the buffered messages with the
/// peers, then calls `receive_and_resolve`. An instruction with `n_rounds = R`
/// sees exactly `R` invocations of each, for rounds `0..R` in order, and
/// should resolve its outputs no earlier than the receive phase of its last
/// round
pub trait Instruction<F: PrimeField>: Send {
    /// A short name for logging
    fn name(&self) -> &str;

    /// The number of rounds the instruction runs for, at least one
    fn n_rounds(&self) -> usize {
        1
    }

    /// Whether the instruction exchanges messages in the given round
    ///
    /// This must evaluate identically at every party, the scheduler uses it
    /// to align the messages of a batch. Messages buffered in a silent round
    /// are held until the instruction's next exchange, or sent at once when
    /// the scheduler flushes every round. Either way they must be flushed by
    /// the instruction's last round
    fn communicates(&self, round: usize) -> bool;

    /// The results the instruction reads, which must all be resolved before
    /// it is scheduled
    fn dependencies(&self) -> Vec<&dyn Deferred> {
        Vec::new()
    }

    /// The results the instruction resolves
    ///
    /// Later instructions of a sequential fragment may depend only on these
    /// and on results that are already resolved when the fragment is built
    fn outputs(&self) -> Vec<ResultId>;

    /// Compute the round's local work and buffer outbound messages
    fn compute_and_send(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError>;

    /// Consume the round's inbound messages and resolve outputs
    fn receive_and_resolve(
        &mut self,
        round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError>;
}

// -------------------
// | Message Buffers |
// -------------------

/// The messages a single instruction has buffered for sending and has
/// received but not consumed, indexed by party
pub(crate) struct MessageBuffers<F: PrimeField> {
    /// The payloads buffered for each recipient
    outbound: Vec<Vec<NetworkPayload<F>>>,
    /// The payloads received from each sender, not yet consumed
    inbound: Vec<VecDeque<NetworkPayload<F>>>,
}

impl<F: PrimeField> MessageBuffers<F> {
    /// Create empty buffers for a session of `n_parties`
    pub fn new(n_parties: usize) -> Self {
        Self {
            outbound: (0..n_parties).map(|_| Vec::new()).collect_vec(),
            inbound: (0..n_parties).map(|_| VecDeque::new()).collect_vec(),
        }
    }

    /// Whether any payload is buffered for sending
    pub fn has_outbound(&self) -> bool {
        self.outbound.iter().any(|payloads| !payloads.is_empty())
    }

    /// Take the payloads buffered for the given recipient
    pub fn take_outbound(&mut self, peer: PartyId) -> Vec<NetworkPayload<F>> {
        std::mem::take(&mut self.outbound[peer as usize])
    }

    /// Deliver the payloads received from the given sender, after any not
    /// yet consumed
    pub fn push_inbound(&mut self, peer: PartyId, payloads: Vec<NetworkPayload<F>>) {
        self.inbound[peer as usize].extend(payloads);
    }

    /// The first sender with a payload that was never consumed, if any
    pub fn unconsumed_sender(&self) -> Option<PartyId> {
        self.inbound.iter().position(|payloads| !payloads.is_empty()).map(|id| id as PartyId)
    }
}

// -----------------
// | Round Context |
// -----------------

/// The view of the session an instruction gets in each phase of a round
pub struct RoundContext<'a, F: PrimeField> {
    /// The session's fabric
    fabric: &'a MpcFabric<F>,
    /// The session's buffer of opened values awaiting a mac check
    opened: &'a mut OpenedValueStore<F>,
    /// The instruction's messages for the round
    buffers: &'a mut MessageBuffers<F>,
}

impl<'a, F: PrimeField> RoundContext<'a, F> {
    /// Constructor
    pub(crate) fn new(
        fabric: &'a MpcFabric<F>,
        opened: &'a mut OpenedValueStore<F>,
        buffers: &'a mut MessageBuffers<F>,
    ) -> Self {
        Self { fabric, opened, buffers }
    }

    /// The ID of the local party
    pub fn party_id(&self) -> PartyId {
        self.fabric.party_id()
    }

    /// The number of parties in the session
    pub fn n_parties(&self) -> usize {
        self.fabric.n_parties()
    }

    /// The IDs of every other party, in order
    pub fn peers(&self) -> Vec<PartyId> {
        self.fabric.peers()
    }

    /// The session's fabric
    pub fn fabric(&self) -> &MpcFabric<F> {
        self.fabric
    }

    /// The local party's share of the mac key
    pub fn mac_key_share(&self) -> Scalar<F> {
        self.fabric.mac_key_share()
    }

    /// The session's buffer of opened values awaiting a mac check
    pub fn opened_values(&mut self) -> &mut OpenedValueStore<F> {
        self.opened
    }

    /// Lock the session's data supplier
    pub fn supplier(&self) -> MutexGuard<'_, Box<dyn DataSupplier<F>>> {
        self.fabric.supplier()
    }

    // -----------
    // | Sending |
    // -----------

    /// Buffer a payload for the given peer
    pub fn send<T: Into<NetworkPayload<F>>>(
        &mut self,
        peer: PartyId,
        payload: T,
    ) -> Result<(), MpcError> {
        if peer == self.party_id() || peer as usize >= self.n_parties() {
            return Err(MpcNetworkError::UnknownPeer(peer).into());
        }

        self.buffers.outbound[peer as usize].push(payload.into());
        Ok(())
    }

    /// Buffer a payload for every peer
    pub fn broadcast<T: Into<NetworkPayload<F>> + Clone>(
        &mut self,
        payload: T,
    ) -> Result<(), MpcError> {
        for peer in self.peers() {
            self.send(peer, payload.clone())?;
        }

        Ok(())
    }

    // -------------
    // | Receiving |
    // -------------

    /// Consume the next payload received from the given peer
    pub fn receive<T>(&mut self, peer: PartyId) -> Result<T, MpcError>
    where
        T: TryFrom<NetworkPayload<F>, Error = String>,
    {
        let payload = self
            .buffers
            .inbound
            .get_mut(peer as usize)
            .ok_or(MpcNetworkError::UnknownPeer(peer))?
            .pop_front()
            .ok_or(MpcNetworkError::MissingPayload(peer))?;

        T::try_from(payload)
            .map_err(|reason| MpcNetworkError::UnexpectedPayload { peer, reason }.into())
    }

    /// Consume the next payload from the given peer as a scalar
    pub fn receive_scalar(&mut self, peer: PartyId) -> Result<Scalar<F>, MpcError> {
        self.receive(peer)
    }

    /// Consume the next payload from the given peer as a batch of scalars of
    /// the expected length
    pub fn receive_scalars(
        &mut self,
        peer: PartyId,
        expected_len: usize,
    ) -> Result<Vec<Scalar<F>>, MpcError> {
        let scalars: Vec<Scalar<F>> = self.receive(peer)?;
        if scalars.len() != expected_len {
            let reason = format!("expected {expected_len} scalars, got {}", scalars.len());
            return Err(MpcNetworkError::UnexpectedPayload { peer, reason }.into());
        }

        Ok(scalars)
    }

    /// Consume the next payload from every peer, in peer order
    pub fn receive_from_all<T>(&mut self) -> Result<Vec<T>, MpcError>
    where
        T: TryFrom<NetworkPayload<F>, Error = String>,
    {
        self.peers().into_iter().map(|peer| self.receive(peer)).collect()
    }
}

// --------------
// | Local Gate |
// --------------

/// The function a local gate evaluates
type GateFn<F, T> = Box<dyn FnOnce(&mut RoundContext<'_, F>) -> Result<T, MpcError> + Send>;

/// A single round instruction that evaluates a function of resolved results
/// without communicating
pub struct LocalGate<F: PrimeField, T> {
    /// The name of the gate
    name: &'static str,
    /// The results the function reads
    deps: Vec<Box<dyn Deferred>>,
    /// The function to evaluate
    function: Option<GateFn<F, T>>,
    /// The value computed in the compute phase
    value: Option<T>,
    /// The result the value is written to
    output: ResultHandle<T>,
}

impl<F: PrimeField, T: Send + Sync + 'static> LocalGate<F, T> {
    /// Constructor
    pub fn new<G>(
        name: &'static str,
        deps: Vec<Box<dyn Deferred>>,
        output: ResultHandle<T>,
        function: G,
    ) -> Self
    where
        G: 'static + Send + FnOnce(&mut RoundContext<'_, F>) -> Result<T, MpcError>,
    {
        Self { name, deps, function: Some(Box::new(function)), value: None, output }
    }
}

impl<F: PrimeField, T: Send + Sync + 'static> Instruction<F> for LocalGate<F, T> {
    fn name(&self) -> &str {
        self.name
    }

    fn communicates(&self, _round: usize) -> bool {
        false
    }

    fn dependencies(&self) -> Vec<&dyn Deferred> {
        self.deps.iter().map(|dep| dep.as_ref()).collect_vec()
    }

    fn outputs(&self) -> Vec<ResultId> {
        vec![self.output.id()]
    }

    fn compute_and_send(
        &mut self,
        _round: usize,
        ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let function = self
            .function
            .take()
            .ok_or_else(|| MpcError::ProtocolViolation(format!("{} evaluated twice", self.name)))?;
        self.value = Some(function(ctx)?);
        Ok(())
    }

    fn receive_and_resolve(
        &mut self,
        _round: usize,
        _ctx: &mut RoundContext<'_, F>,
    ) -> Result<(), MpcError> {
        let value = self
            .value
            .take()
            .ok_or_else(|| MpcError::ProtocolViolation(format!("{} never computed", self.name)))?;
        self.output.resolve(value)
    }
}
