//! The round scheduler
//!
//! The executor expands the computation graph into batches of ready
//! instructions and drives each batch round by round. Every instruction of a
//! batch computes, then the batch's messages for each peer are coalesced into
//! a single exchange, then every instruction consumes what it received

use std::sync::Arc;

use ark_ff::PrimeField;
use itertools::Itertools;
use kanal::AsyncSender as KanalSender;
use tokio::sync::broadcast::{self, Sender as BroadcastSender};
use tracing::log;

use crate::{
    error::{MpcError, MpcNetworkError},
    network::{MpcNetwork, NetworkOutbound, PartyId, RoundTag},
    offline_prep::DataSupplier,
    spdz::{MacCheckGate, OpenedValueStore},
};

use super::{
    builder::BuilderKind,
    instruction::MessageBuffers,
    network_sender::{InboundRouter, NetworkSender},
    step::Progress,
    EvaluationStrategy, ExecutorConfig, FlushPolicy, Instruction, MpcFabric, NetworkStats,
    ProtocolBuilder, ResultHandle, RoundContext,
};

/// Error message emitted when the outbound queue has been closed
const ERR_OUTBOUND_CLOSED: &str = "outbound queue closed";

/// The lifecycle state of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// The session accepts computations
    Active,
    /// The session failed, every later call fails
    Aborted,
    /// The session was closed cleanly
    Closed,
}

/// Drives computations for the local party of a session
///
/// A session spans any number of `run` calls. The session's opened values
/// are checked before each run returns and whenever the backlog reaches the
/// configured threshold. Any failure aborts the session
pub struct Executor<F: PrimeField> {
    /// The session's fabric
    fabric: MpcFabric<F>,
    /// The scheduler's configuration
    config: ExecutorConfig,
    /// The lifecycle state of the session
    state: SessionState,
    /// The opened values awaiting a mac check
    opened: OpenedValueStore<F>,
    /// The tag of the next exchange
    next_round: RoundTag,
    /// The queue of messages for the network sender, dropped on shutdown
    outbound: Option<KanalSender<NetworkOutbound<F>>>,
    /// Demultiplexes inbound messages by peer
    router: InboundRouter<F>,
    /// Signals the network sender to stop reading
    shutdown: BroadcastSender<()>,
    /// The stats of the network connection
    stats: Arc<NetworkStats>,
}

impl<F: PrimeField> Executor<F> {
    /// Create an executor over the given network, spawning its network task
    ///
    /// Must be called from within a tokio runtime
    pub fn new<N, S>(network: N, supplier: S, config: ExecutorConfig) -> Self
    where
        N: 'static + MpcNetwork<F> + Unpin,
        S: 'static + DataSupplier<F>,
    {
        let party_id = network.party_id();
        let n_parties = network.n_parties();
        let fabric = MpcFabric::new(party_id, n_parties, supplier);

        let (outbound_send, outbound_recv) = kanal::unbounded_async();
        let (inbound_send, inbound_recv) = tokio::sync::mpsc::unbounded_channel();
        let (shutdown_send, shutdown_recv) = broadcast::channel(1 /* capacity */);
        let stats = Arc::new(NetworkStats::default());

        let sender =
            NetworkSender::new(outbound_recv, inbound_send, network, shutdown_recv, stats.clone());
        tokio::spawn(sender.run());

        let router = InboundRouter::new(party_id, n_parties, inbound_recv, config.receive_timeout());
        Self {
            fabric,
            config,
            state: SessionState::Active,
            opened: OpenedValueStore::new(),
            next_round: 0,
            outbound: Some(outbound_send),
            router,
            shutdown: shutdown_send,
            stats,
        }
    }

    // -----------
    // | Getters |
    // -----------

    /// The ID of the local party
    pub fn party_id(&self) -> PartyId {
        self.fabric.party_id()
    }

    /// The session's fabric
    pub fn fabric(&self) -> &MpcFabric<F> {
        &self.fabric
    }

    /// The scheduler's configuration
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// The lifecycle state of the session
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The stats of the network connection
    pub fn network_stats(&self) -> Arc<NetworkStats> {
        self.stats.clone()
    }

    // --------------
    // | Public API |
    // --------------

    /// Build a computation and evaluate it to completion
    ///
    /// The output is released only after every value opened during the run
    /// has passed a mac check
    pub async fn run<T, B>(&mut self, build: B) -> Result<T, MpcError>
    where
        T: Clone + Send + Sync + 'static,
        B: FnOnce(&mut ProtocolBuilder<F>) -> ResultHandle<T>,
    {
        self.ensure_active()?;
        match self.run_inner(build).await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Check the macs of every value opened so far, returning the number of
    /// values checked
    pub async fn check_macs(&mut self) -> Result<usize, MpcError> {
        self.ensure_active()?;
        match self.mac_check().await {
            Ok(n_checked) => Ok(n_checked),
            Err(err) => Err(self.abort(err)),
        }
    }

    /// Check any remaining opened values and shut the network down
    pub async fn close(&mut self) -> Result<(), MpcError> {
        self.ensure_active()?;
        if !self.opened.is_empty() {
            if let Err(err) = self.mac_check().await {
                return Err(self.abort(err));
            }
        }

        log::debug!("party {} closing session {}", self.party_id(), self.fabric.session_id());
        self.state = SessionState::Closed;
        self.shutdown_network();
        Ok(())
    }

    // -------------
    // | Lifecycle |
    // -------------

    /// Error unless the session accepts work
    fn ensure_active(&self) -> Result<(), MpcError> {
        match self.state {
            SessionState::Active => Ok(()),
            SessionState::Aborted => Err(MpcError::SessionAborted),
            SessionState::Closed => Err(MpcError::Construction("session already closed".to_string())),
        }
    }

    /// Abort the session after a failure, returning the failure
    fn abort(&mut self, err: MpcError) -> MpcError {
        log::error!(
            "party {} aborting session {}: {err}",
            self.party_id(),
            self.fabric.session_id()
        );

        self.state = SessionState::Aborted;
        self.opened.discard();
        self.shutdown_network();
        err
    }

    /// Stop the network sender, messages already queued are still sent
    fn shutdown_network(&mut self) {
        self.outbound.take();
        // The sender may already have stopped
        let _ = self.shutdown.send(());
    }

    // --------------
    // | Scheduling |
    // --------------

    /// Build and evaluate a computation
    async fn run_inner<T, B>(&mut self, build: B) -> Result<T, MpcError>
    where
        T: Clone + Send + Sync + 'static,
        B: FnOnce(&mut ProtocolBuilder<F>) -> ResultHandle<T>,
    {
        self.config.validate()?;

        let mut root = ProtocolBuilder::new(self.fabric.clone(), BuilderKind::Sequential);
        let output = build(&mut root);
        let mut step = root.into_step()?;

        let mut n_batches = 0usize;
        loop {
            let mut batch = Vec::new();
            let progress = step.collect(&self.fabric, &mut batch, self.config.max_batch_size)?;
            if progress == Progress::Pending && batch.is_empty() {
                return Err(MpcError::ProtocolViolation("computation made no progress".to_string()));
            }

            if !batch.is_empty() {
                log::trace!("driving batch of {} instructions", batch.len());
                self.drive_batch(&mut batch).await?;
                n_batches += 1;
            }

            if self.opened.exceeds_threshold(self.config.mac_check_threshold) {
                self.mac_check().await?;
            }

            if progress == Progress::Done {
                break;
            }
        }

        if !self.opened.is_empty() {
            self.mac_check().await?;
        }

        log::debug!("computation finished after {n_batches} batches, {} exchanges", self.next_round);
        output.resolved_value()
    }

    /// Drive a batch according to the evaluation strategy
    async fn drive_batch(&mut self, batch: &mut [Box<dyn Instruction<F>>]) -> Result<(), MpcError> {
        match self.config.strategy {
            EvaluationStrategy::Parallel => self.drive(batch).await,
            EvaluationStrategy::Sequential => {
                for instruction in batch.iter_mut() {
                    self.drive(std::slice::from_mut(instruction)).await?;
                }

                Ok(())
            },
        }
    }

    /// Drive a set of instructions together until each has run all its
    /// rounds
    async fn drive(&mut self, instructions: &mut [Box<dyn Instruction<F>>]) -> Result<(), MpcError> {
        let n_parties = self.fabric.n_parties();
        let mut buffers = instructions.iter().map(|_| MessageBuffers::new(n_parties)).collect_vec();
        let n_rounds = instructions.iter().map(|instr| instr.n_rounds()).max().unwrap_or(0);

        for round in 0..n_rounds {
            let active = (0..instructions.len())
                .filter(|&idx| round < instructions[idx].n_rounds())
                .collect_vec();

            // Compute phase
            for &idx in active.iter() {
                let mut ctx = RoundContext::new(&self.fabric, &mut self.opened, &mut buffers[idx]);
                instructions[idx].compute_and_send(round, &mut ctx)?;
            }

            // Exchange, silent instructions keep their messages buffered unless
            // every round is flushed
            let exchanging = match self.config.flush_policy {
                FlushPolicy::EveryRound => active.clone(),
                FlushPolicy::OnDemand => active
                    .iter()
                    .copied()
                    .filter(|&idx| instructions[idx].communicates(round))
                    .collect_vec(),
            };
            if !exchanging.is_empty() || self.config.flush_policy == FlushPolicy::EveryRound {
                self.exchange(&exchanging, &mut buffers).await?;
            }

            // Receive phase
            for &idx in active.iter() {
                let mut ctx = RoundContext::new(&self.fabric, &mut self.opened, &mut buffers[idx]);
                instructions[idx].receive_and_resolve(round, &mut ctx)?;

                if round + 1 == instructions[idx].n_rounds() {
                    Self::check_finished(instructions[idx].as_ref(), &buffers[idx])?;
                }
            }
        }

        Ok(())
    }

    /// Error if an instruction finished with messages it never sent or never
    /// consumed
    fn check_finished(
        instruction: &dyn Instruction<F>,
        buffers: &MessageBuffers<F>,
    ) -> Result<(), MpcError> {
        if buffers.has_outbound() {
            let msg = format!("{} finished with unsent messages", instruction.name());
            return Err(MpcError::ProtocolViolation(msg));
        }

        if let Some(peer) = buffers.unconsumed_sender() {
            let reason = format!("{} finished with payloads unconsumed", instruction.name());
            return Err(MpcNetworkError::UnexpectedPayload { peer, reason }.into());
        }

        Ok(())
    }

    /// Send one message to every peer holding the outbound payloads of the
    /// exchanging instructions, then deliver each peer's message
    async fn exchange(
        &mut self,
        communicating: &[usize],
        buffers: &mut [MessageBuffers<F>],
    ) -> Result<(), MpcError> {
        let round = self.next_round;
        self.next_round += 1;

        let sender = self.fabric.party_id();
        let peers = self.fabric.peers();
        let outbound = self
            .outbound
            .as_ref()
            .ok_or_else(|| MpcNetworkError::SendError(ERR_OUTBOUND_CLOSED.to_string()))?;

        for &recipient in peers.iter() {
            let payloads =
                communicating.iter().map(|&idx| buffers[idx].take_outbound(recipient)).collect_vec();
            let msg = NetworkOutbound { sender, recipient, round, payloads };

            outbound.send(msg).await.map_err(|e| MpcNetworkError::SendError(format!("{e:?}")))?;
        }

        for &peer in peers.iter() {
            let msg = self.router.recv_from(peer, round).await?;
            if msg.payloads.len() != communicating.len() {
                let reason = format!(
                    "expected payloads from {} instructions, got {}",
                    communicating.len(),
                    msg.payloads.len()
                );
                return Err(MpcNetworkError::UnexpectedPayload { peer, reason }.into());
            }

            for (&idx, payloads) in communicating.iter().zip(msg.payloads) {
                buffers[idx].push_inbound(peer, payloads);
            }
        }

        log::trace!("exchange {round} carried {} instructions", communicating.len());
        Ok(())
    }

    /// Check the macs of the opened value backlog
    async fn mac_check(&mut self) -> Result<usize, MpcError> {
        log::debug!("checking macs of {} opened values", self.opened.len());

        let output = self.fabric.new_result();
        let mut gate: Box<dyn Instruction<F>> = Box::new(MacCheckGate::new(output.clone()));
        self.drive(std::slice::from_mut(&mut gate)).await?;

        let n_checked = output.resolved_value()?;
        log::info!("party {} verified {n_checked} opened values", self.party_id());
        Ok(n_checked)
    }
}

impl<F: PrimeField> Drop for Executor<F> {
    fn drop(&mut self) {
        self.shutdown_network();
    }
}

#[cfg(test)]
mod test {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use itertools::Itertools;
    use rand::thread_rng;

    use crate::{
        error::{ErrorKind, MpcError, MpcNetworkError},
        fabric::{
            EvaluationStrategy, Executor, ExecutorConfig, FlushPolicy, Instruction, LocalGate,
            ResultHandle, ResultId, RoundContext, SessionState,
        },
        test_helpers::{
            execute_mock_mpc, execute_mock_mpc_with_config, mock_executor, TestField, TestScalar,
        },
        PARTY0, PARTY1, PARTY2,
    };

    // -----------
    // | Helpers |
    // -----------

    /// An instruction that logs each of its invocations
    struct RoundLogger {
        /// The number of rounds to run for
        n_rounds: usize,
        /// The invocations seen, tagged with whether the output was resolved
        log: Arc<Mutex<Vec<(&'static str, usize, bool)>>>,
        /// The output, resolved in the last round
        output: ResultHandle<usize>,
    }

    impl Instruction<TestField> for RoundLogger {
        fn name(&self) -> &str {
            "round-logger"
        }

        fn n_rounds(&self) -> usize {
            self.n_rounds
        }

        fn communicates(&self, round: usize) -> bool {
            round % 2 == 0
        }

        fn outputs(&self) -> Vec<ResultId> {
            vec![self.output.id()]
        }

        fn compute_and_send(
            &mut self,
            round: usize,
            _ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            self.log.lock().unwrap().push(("compute", round, self.output.is_resolved()));
            Ok(())
        }

        fn receive_and_resolve(
            &mut self,
            round: usize,
            _ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            self.log.lock().unwrap().push(("receive", round, self.output.is_resolved()));
            if round + 1 == self.n_rounds {
                self.output.resolve(round)?;
            }

            Ok(())
        }
    }

    /// An instruction that broadcasts a value in a silent first round and
    /// reads the peers' values in its second round
    struct DelayedBroadcast {
        /// The number of rounds to run for, the second round communicates
        n_rounds: usize,
        /// The local party's value
        value: TestScalar,
        /// The peers' values, in peer order
        output: ResultHandle<Vec<TestScalar>>,
    }

    impl Instruction<TestField> for DelayedBroadcast {
        fn name(&self) -> &str {
            "delayed-broadcast"
        }

        fn n_rounds(&self) -> usize {
            self.n_rounds
        }

        fn communicates(&self, round: usize) -> bool {
            round == 1
        }

        fn outputs(&self) -> Vec<ResultId> {
            vec![self.output.id()]
        }

        fn compute_and_send(
            &mut self,
            round: usize,
            ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            if round == 0 {
                ctx.broadcast(self.value)?;
            }

            Ok(())
        }

        fn receive_and_resolve(
            &mut self,
            round: usize,
            ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            if round == 1 {
                let values: Vec<TestScalar> = ctx.receive_from_all()?;
                self.output.resolve(values)?;
            }

            Ok(())
        }
    }

    /// Run a delayed broadcast in a two party session, returning each party's
    /// result and the number of exchanges it took
    async fn delayed_broadcast(
        n_rounds: usize,
        policy: FlushPolicy,
    ) -> Vec<(Result<Vec<TestScalar>, MpcError>, u64)> {
        let config = ExecutorConfig::default().with_flush_policy(policy);
        execute_mock_mpc_with_config(2, config, move |mut executor| async move {
            let value = TestScalar::from(executor.party_id() as u8 + 1);
            let res = executor
                .run(move |root| {
                    let output = root.allocate();
                    root.append(DelayedBroadcast { n_rounds, value, output: output.clone() });
                    output
                })
                .await;

            (res, executor.next_round)
        })
        .await
    }

    /// Multiply two inputs and check the opened product at every party
    async fn mul_open(n_parties: usize, config: ExecutorConfig) {
        let mut rng = thread_rng();
        let a = TestScalar::random(&mut rng);
        let b = TestScalar::random(&mut rng);

        let res = execute_mock_mpc_with_config(n_parties, config, |mut executor| async move {
            let party_id = executor.party_id();
            let res = executor
                .run(move |root| {
                    let mut numeric = root.numeric();
                    let x = numeric.input((party_id == PARTY0).then_some(a), PARTY0);
                    let y = numeric.input((party_id == PARTY1).then_some(b), PARTY1);

                    let z = numeric.mul(&x, &y);
                    numeric.open(&z)
                })
                .await;

            executor.close().await.unwrap();
            res
        })
        .await;

        for value in res {
            assert_eq!(value, Ok(a * b));
        }
    }

    /// Open a random value, then shift the opened value recorded at the first
    /// party if `tamper` is set
    async fn open_and_tamper(
        executor: &mut Executor<TestField>,
        tamper: bool,
    ) -> Result<(), MpcError> {
        executor
            .run(move |root| {
                let mut numeric = root.numeric();
                let r = numeric.random_element();
                let opened = numeric.open(&r);

                let output = root.allocate();
                root.append(LocalGate::new(
                    "tamper",
                    vec![Box::new(opened)],
                    output.clone(),
                    move |ctx| {
                        let party_id = ctx.party_id();
                        let store = ctx.opened_values();
                        let (shares, mut values) = store.pop_values();
                        if tamper && party_id == PARTY0 {
                            values[0] += TestScalar::one();
                        }

                        store.push_opened_values(shares, values);
                        Ok(())
                    },
                ));
                output
            })
            .await
    }

    // ---------
    // | Tests |
    // ---------

    /// Tests that an instruction sees each of its rounds exactly once, in
    /// order, and resolves after the last
    #[tokio::test]
    async fn test_round_invocations() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log_clone = log.clone();

        let mut executor = mock_executor();
        let res = executor
            .run(move |root| {
                let output = root.allocate();
                root.append(RoundLogger { n_rounds: 3, log: log_clone, output: output.clone() });
                output
            })
            .await;

        assert_eq!(res, Ok(2));
        let expected = (0..3)
            .flat_map(|round| [("compute", round, false), ("receive", round, false)])
            .collect_vec();
        assert_eq!(*log.lock().unwrap(), expected);
    }

    /// Tests multiplication and opening across party counts and scheduler
    /// configurations
    #[tokio::test]
    async fn test_mul_open_configs() {
        let configs = [
            ExecutorConfig::default(),
            ExecutorConfig::default().with_strategy(EvaluationStrategy::Sequential),
            ExecutorConfig::default().with_flush_policy(FlushPolicy::EveryRound),
            ExecutorConfig::default().with_max_batch_size(1),
        ];

        for config in configs {
            mul_open(2, config.clone()).await;
            mul_open(3, config).await;
        }
    }

    /// Tests that inputs by every party reconstruct to the inputs
    #[tokio::test]
    async fn test_input() {
        let values = [TestScalar::from(3u8), TestScalar::from(5u8), TestScalar::from(7u8)];

        let res = execute_mock_mpc(3, |mut executor| async move {
            let party_id = executor.party_id();
            executor
                .run(move |root| {
                    let inputs = [PARTY0, PARTY1, PARTY2]
                        .into_iter()
                        .map(|party| {
                            let value = (party == party_id).then_some(values[party as usize]);
                            root.numeric().input(value, party)
                        })
                        .collect_vec();
                    let opened = root.numeric().open_batch(&inputs);

                    root.collect(&opened)
                })
                .await
        })
        .await;

        for value in res {
            assert_eq!(value, Ok(values.to_vec()));
        }
    }

    /// Tests that a run's output is only released after a passing mac check,
    /// and that a tampered opening fails the check at every party
    #[tokio::test]
    async fn test_tampered_opening() {
        let res = execute_mock_mpc(2, |mut executor| async move {
            open_and_tamper(&mut executor, false /* tamper */).await
        })
        .await;
        assert!(res.iter().all(Result::is_ok));

        let res = execute_mock_mpc(2, |mut executor| async move {
            open_and_tamper(&mut executor, true /* tamper */).await
        })
        .await;
        for value in res {
            assert_eq!(value, Err(MpcError::AuthenticationError));
        }
    }

    /// Tests that an aborted session rejects further work
    #[tokio::test]
    async fn test_aborted_session() {
        let res = execute_mock_mpc(2, |mut executor| async move {
            let err = open_and_tamper(&mut executor, true /* tamper */).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Authentication);
            assert_eq!(executor.state(), SessionState::Aborted);

            let run = executor.run(|root| root.constant(1u8)).await;
            let check = executor.check_macs().await;
            let close = executor.close().await;
            (run.unwrap_err(), check.unwrap_err(), close.unwrap_err())
        })
        .await;

        for errs in res {
            assert_eq!(
                errs,
                (MpcError::SessionAborted, MpcError::SessionAborted, MpcError::SessionAborted)
            );
        }
    }

    /// Tests that a closed session rejects further runs
    #[tokio::test]
    async fn test_closed_session() {
        let mut executor = mock_executor();
        assert_eq!(executor.run(|root| root.constant(1u8)).await, Ok(1));

        executor.close().await.unwrap();
        assert_eq!(executor.state(), SessionState::Closed);

        let err = executor.run(|root| root.constant(1u8)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Construction);
    }

    /// Tests the explicit mac check over values opened in earlier runs
    #[tokio::test]
    async fn test_check_macs() {
        let res = execute_mock_mpc(3, |mut executor| async move {
            executor
                .run(|root| {
                    let mut numeric = root.numeric();
                    let r = numeric.random_element();
                    numeric.open(&r);
                    numeric.check_macs()
                })
                .await
        })
        .await;

        for n_checked in res {
            assert_eq!(n_checked, Ok(1));
        }
    }

    /// Tests that reaching the threshold checks the backlog mid-run
    #[tokio::test]
    async fn test_periodic_mac_check() {
        for (threshold, expected_backlog) in [(2, 0), (0, 2)] {
            let config = ExecutorConfig::default().with_mac_check_threshold(threshold);
            let res = execute_mock_mpc_with_config(2, config, |mut executor| async move {
                executor
                    .run(|root| {
                        let mut numeric = root.numeric();
                        let a = numeric.random_element();
                        let b = numeric.random_element();
                        numeric.open(&a);
                        let opened = numeric.open(&b);

                        let output = root.allocate();
                        root.append(LocalGate::new(
                            "backlog",
                            vec![Box::new(opened)],
                            output.clone(),
                            |ctx| Ok(ctx.opened_values().len()),
                        ));
                        output
                    })
                    .await
            })
            .await;

            for backlog in res {
                assert_eq!(backlog, Ok(expected_backlog));
            }
        }
    }

    /// Tests that a flush on every round exchanges even when no instruction
    /// communicates
    #[tokio::test]
    async fn test_flush_policy() {
        for (policy, expected_messages) in [(FlushPolicy::OnDemand, 0), (FlushPolicy::EveryRound, 1)] {
            let config = ExecutorConfig::default().with_flush_policy(policy);
            let res = execute_mock_mpc_with_config(2, config, |mut executor| async move {
                executor.run(|root| root.numeric().random_bit()).await.unwrap();
                executor.network_stats().messages_received()
            })
            .await;

            for received in res {
                assert_eq!(received, expected_messages);
            }
        }
    }

    /// Tests that messages buffered in a silent round are delivered with the
    /// instruction's next exchange, and only flushed early when every round
    /// is flushed
    #[tokio::test]
    async fn test_deferred_messages() {
        for (policy, expected_exchanges) in [(FlushPolicy::OnDemand, 1), (FlushPolicy::EveryRound, 2)]
        {
            let res = delayed_broadcast(2 /* n_rounds */, policy).await;

            let (party0, exchanges0) = res[0].clone();
            let (party1, exchanges1) = res[1].clone();
            assert_eq!(party0, Ok(vec![TestScalar::from(2u8)]));
            assert_eq!(party1, Ok(vec![TestScalar::from(1u8)]));
            assert_eq!((exchanges0, exchanges1), (expected_exchanges, expected_exchanges));
        }
    }

    /// Tests that an instruction finishing with buffered messages it never
    /// exchanged is a protocol violation
    #[tokio::test]
    async fn test_unsent_messages() {
        let res = delayed_broadcast(1 /* n_rounds */, FlushPolicy::OnDemand).await;
        for (value, _) in res {
            assert!(matches!(value, Err(MpcError::ProtocolViolation(_))));
        }
    }

    /// Tests that a dangling dependency fails the run before any message is
    /// sent, even when earlier instructions communicate
    #[tokio::test]
    async fn test_dangling_dependency_before_io() {
        let res = execute_mock_mpc(2, |mut executor| async move {
            let mut dangling_id = 0;
            let res = executor
                .run(|root| {
                    let mut numeric = root.numeric();
                    let r = numeric.random_element();
                    numeric.open(&r);

                    let dangling = root.allocate::<u64>();
                    dangling_id = dangling.id();

                    let output = root.allocate();
                    let dep = dangling.clone();
                    root.append(LocalGate::new(
                        "read",
                        vec![Box::new(dangling)],
                        output.clone(),
                        move |_| dep.resolved_value(),
                    ));
                    output
                })
                .await;

            (res, dangling_id, executor.network_stats().messages_sent())
        })
        .await;

        for (value, dangling_id, messages_sent) in res {
            assert_eq!(value, Err(MpcError::DanglingDependency(dangling_id)));
            assert_eq!(messages_sent, 0);
        }
    }

    /// Tests that a peer dropping out is a communication failure
    #[tokio::test]
    async fn test_dropped_peer() {
        let res = execute_mock_mpc(2, |mut executor| async move {
            if executor.party_id() == PARTY1 {
                drop(executor);
                return None;
            }

            let res = executor
                .run(|root| {
                    let mut numeric = root.numeric();
                    let r = numeric.random_element();
                    numeric.open(&r)
                })
                .await;
            Some(res)
        })
        .await;

        let err = res[0].clone().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Communication);
    }

    /// Tests that a silent peer times out
    #[tokio::test]
    async fn test_receive_timeout() {
        let config = ExecutorConfig::default().with_receive_timeout(Duration::from_millis(50));
        let res = execute_mock_mpc_with_config(2, config, |mut executor| async move {
            if executor.party_id() == PARTY1 {
                tokio::time::sleep(Duration::from_millis(500)).await;
                return None;
            }

            let res = executor
                .run(|root| {
                    let mut numeric = root.numeric();
                    let r = numeric.random_element();
                    numeric.open(&r)
                })
                .await;
            Some(res)
        })
        .await;

        let err = res[0].clone().unwrap().unwrap_err();
        assert_eq!(err, MpcError::Network(MpcNetworkError::Timeout(PARTY1)));
    }
}
