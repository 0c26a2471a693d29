//! Defines the builder through which applications assemble a computation
//! graph, and the chain combinators that attach lazily built fragments to it
//!
//! A builder only records steps, nothing is evaluated until the executor
//! reaches them. Fragments attached through a [`Computation`] are built when
//! the executor first visits them, at which point every prior step of the
//! chain has been evaluated and the fragment's input state is available as a
//! value

use std::sync::{Arc, Mutex};

use ark_ff::PrimeField;
use itertools::Itertools;
use rustc_hash::FxHashSet;

use crate::{error::MpcError, network::PartyId, spdz::SpdzNumeric};

use super::{
    step::{JoinFn, LoopDriver, Step, StepQueue},
    Deferred, Instruction, LocalGate, MpcFabric, ResultHandle, ResultId,
};

/// Error message emitted when the produced results lock is poisoned
const ERR_PRODUCED_POISONED: &str = "produced results lock poisoned";

/// The results produced by the steps recorded so far in a fragment, shared
/// with the chains started from it
type ProducedSet = Arc<Mutex<FxHashSet<ResultId>>>;

// -----------
// | Builder |
// -----------

/// The way a builder's steps are evaluated relative to one another
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BuilderKind {
    /// Each step runs after the previous one has been evaluated
    Sequential,
    /// All steps run concurrently
    Parallel,
}

/// Records the steps of a fragment of the computation graph
pub struct ProtocolBuilder<F: PrimeField> {
    /// The session's fabric
    fabric: MpcFabric<F>,
    /// How the recorded steps are evaluated
    kind: BuilderKind,
    /// The recorded steps
    steps: Vec<Step<F>>,
    /// Steps of a parallel scope that gather its outputs, run after every
    /// other step of the scope
    joins: Vec<Step<F>>,
    /// The results the recorded steps resolve
    produced: ProducedSet,
    /// The first construction error recorded, reported when the fragment is
    /// expanded
    error: Option<MpcError>,
}

impl<F: PrimeField> ProtocolBuilder<F> {
    /// Constructor
    pub(crate) fn new(fabric: MpcFabric<F>, kind: BuilderKind) -> Self {
        Self {
            fabric,
            kind,
            steps: Vec::new(),
            joins: Vec::new(),
            produced: ProducedSet::default(),
            error: None,
        }
    }

    /// The session's fabric
    pub fn fabric(&self) -> &MpcFabric<F> {
        &self.fabric
    }

    /// The ID of the local party
    pub fn party_id(&self) -> PartyId {
        self.fabric.party_id()
    }

    /// The number of parties in the session
    pub fn n_parties(&self) -> usize {
        self.fabric.n_parties()
    }

    /// The authenticated arithmetic operations, appending to this builder
    pub fn numeric(&mut self) -> SpdzNumeric<'_, F> {
        SpdzNumeric::new(self)
    }

    /// Record a construction error, only the first is kept
    pub(crate) fn record_error(&mut self, err: MpcError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Convert the recorded steps into a single step
    ///
    /// Fails with the first construction error recorded, including any
    /// dependency that is neither resolved nor produced by an earlier step of
    /// the fragment
    pub(crate) fn into_step(self) -> Result<Step<F>, MpcError> {
        if let Some(err) = self.error {
            return Err(err);
        }

        Ok(match self.kind {
            BuilderKind::Sequential => Step::sequence(self.steps),
            BuilderKind::Parallel if self.joins.is_empty() => Step::Parallel(self.steps),
            BuilderKind::Parallel => {
                Step::sequence(vec![Step::Parallel(self.steps), Step::Parallel(self.joins)])
            },
        })
    }

    // -----------
    // | Results |
    // -----------

    /// Allocate an unresolved result for an instruction to write
    pub fn allocate<T>(&self) -> ResultHandle<T> {
        self.fabric.new_result()
    }

    /// Allocate a result resolved to the given value
    pub fn constant<T>(&self, value: T) -> ResultHandle<T> {
        self.fabric.constant(value)
    }

    // ----------------
    // | Instructions |
    // ----------------

    /// Append an instruction to the fragment
    ///
    /// An instruction with no rounds, or that depends on a result of another
    /// session, is a construction error. So is a dependency on a result that
    /// is unresolved and not produced by a step that runs before it
    pub fn append<I: 'static + Instruction<F>>(&mut self, instruction: I) {
        let may_use_produced = self.kind == BuilderKind::Sequential;
        self.validate(&instruction, may_use_produced);
        self.steps.push(Step::instruction(Box::new(instruction)));
    }

    /// Record a construction error if the instruction is malformed, then mark
    /// its outputs as produced
    ///
    /// `may_use_produced` allows dependencies on the outputs of steps
    /// recorded earlier, which holds when those steps are evaluated first
    fn validate(&mut self, instruction: &dyn Instruction<F>, may_use_produced: bool) {
        if instruction.n_rounds() == 0 {
            let msg = format!("{} declares zero rounds", instruction.name());
            self.record_error(MpcError::Construction(msg));
        }

        let session = self.fabric.session_id();
        let foreign = instruction.dependencies().into_iter().find(|dep| dep.session_id() != session);
        if let Some(dep) = foreign {
            let msg =
                format!("{} depends on result {} of another session", instruction.name(), dep.id());
            self.record_error(MpcError::Construction(msg));
        }

        let mut produced = self.produced.lock().expect(ERR_PRODUCED_POISONED);
        let dangling = instruction.dependencies().into_iter().find(|dep| {
            !dep.is_resolved() && !(may_use_produced && produced.contains(&dep.id()))
        });
        produced.extend(instruction.outputs());
        drop(produced);

        if let Some(dep) = dangling {
            self.record_error(MpcError::DanglingDependency(dep.id()));
        }
    }

    /// Gather a set of results into a single result
    ///
    /// In a parallel scope the results are gathered once every other step of
    /// the scope has been evaluated
    pub fn collect<T>(&mut self, handles: &[ResultHandle<T>]) -> ResultHandle<Vec<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let output = self.allocate();
        let deps = handles.iter().map(|h| Box::new(h.clone()) as Box<dyn Deferred>).collect_vec();
        let handles = handles.to_vec();

        let gate = LocalGate::new("collect", deps, output.clone(), move |_ctx| {
            handles.iter().map(ResultHandle::resolved_value).collect()
        });
        match self.kind {
            BuilderKind::Sequential => self.append(gate),
            BuilderKind::Parallel => {
                self.validate(&gate, true /* may_use_produced */);
                self.joins.push(Step::instruction(Box::new(gate)));
            },
        }

        output
    }

    // ----------
    // | Chains |
    // ----------

    /// Start a chain whose first fragment is evaluated sequentially
    pub fn seq<T, B>(&mut self, build: B) -> Computation<F, T>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>) -> ResultHandle<T>,
    {
        self.chain().seq(move |builder, ()| build(builder))
    }

    /// Start a chain whose first fragment is evaluated in parallel
    pub fn par<T, B>(&mut self, build: B) -> Computation<F, T>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>) -> ResultHandle<T>,
    {
        self.chain().par(move |builder, ()| build(builder))
    }

    /// Record an empty chain in the fragment
    fn chain(&mut self) -> Computation<F, ()> {
        let chain = Computation::new(
            self.fabric.clone(),
            self.produced.clone(),
            self.fabric.constant(()),
        );
        self.steps.push(Step::Sequential(chain.chain.clone()));
        chain
    }
}

// ---------------
// | Computation |
// ---------------

/// A chain of fragments, each built from the value its predecessor resolved
/// to
///
/// Every combinator appends to the same chain and returns a handle to the new
/// end of the chain
#[derive(Clone)]
pub struct Computation<F: PrimeField, S> {
    /// The session's fabric
    fabric: MpcFabric<F>,
    /// The steps of the chain
    chain: StepQueue<F>,
    /// The produced results of the fragment the chain was started in
    produced: ProducedSet,
    /// The value at the current end of the chain
    output: ResultHandle<S>,
}

impl<F: PrimeField, S: Clone + Send + Sync + 'static> Computation<F, S> {
    /// Constructor
    fn new(fabric: MpcFabric<F>, produced: ProducedSet, output: ResultHandle<S>) -> Self {
        Self { fabric, chain: StepQueue::default(), produced, output }
    }

    /// The value at the current end of the chain
    pub fn output(&self) -> ResultHandle<S> {
        self.output.clone()
    }

    /// Append a step to the chain, returning a chain ending in `output`
    fn extend<T>(self, step: Step<F>, output: ResultHandle<T>) -> Computation<F, T> {
        self.chain.lock().expect(super::step::ERR_STEP_QUEUE_POISONED).push_back(step);
        self.produced.lock().expect(ERR_PRODUCED_POISONED).insert(output.id());
        Computation { fabric: self.fabric, chain: self.chain, produced: self.produced, output }
    }

    /// Append a fragment built from the chain's current value and evaluated
    /// sequentially
    pub fn seq<T, B>(self, build: B) -> Computation<F, T>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> ResultHandle<T>,
    {
        self.then(BuilderKind::Sequential, build)
    }

    /// Append a fragment built from the chain's current value and evaluated in
    /// parallel
    pub fn par<T, B>(self, build: B) -> Computation<F, T>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> ResultHandle<T>,
    {
        self.then(BuilderKind::Parallel, build)
    }

    /// Append a lazily built fragment of the given kind
    fn then<T, B>(self, kind: BuilderKind, build: B) -> Computation<F, T>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> ResultHandle<T>,
    {
        let output = self.fabric.new_result();
        let (state, fabric, out) = (self.output.clone(), self.fabric.clone(), output.clone());

        let step = Step::lazy(move || {
            let state = state.resolved_value()?;
            let mut builder = ProtocolBuilder::new(fabric, kind);
            let fragment_output = build(&mut builder, state);

            Ok(Step::sequence(vec![builder.into_step()?, forward(fragment_output, out)]))
        });

        self.extend(step, output)
    }

    /// Run two fragments in parallel, both built from the chain's current
    /// value, and continue with the pair of their outputs
    pub fn pair_in_par<L, R, BL, BR>(self, left: BL, right: BR) -> Computation<F, (L, R)>
    where
        L: Clone + Send + Sync + 'static,
        R: Clone + Send + Sync + 'static,
        BL: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> ResultHandle<L>,
        BR: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> ResultHandle<R>,
    {
        let output = self.fabric.new_result();
        let (state, fabric, out) = (self.output.clone(), self.fabric.clone(), output.clone());

        let step = Step::lazy(move || {
            let state = state.resolved_value()?;

            let mut left_builder = ProtocolBuilder::new(fabric.clone(), BuilderKind::Sequential);
            let left_output = left(&mut left_builder, state.clone());
            let mut right_builder = ProtocolBuilder::new(fabric, BuilderKind::Sequential);
            let right_output = right(&mut right_builder, state);

            let branches = Step::Parallel(vec![left_builder.into_step()?, right_builder.into_step()?]);
            let join: JoinFn = Box::new(move || {
                out.resolve((left_output.resolved_value()?, right_output.resolved_value()?))
            });

            Ok(Step::Paired { branches: Box::new(branches), join: Some(join) })
        });

        self.extend(step, output)
    }

    /// Repeat `body` while `predicate` holds of the chain's value
    ///
    /// Each iteration is built once the previous one has been evaluated, the
    /// chain continues with the value of the last iteration, or the current
    /// value if the loop never runs
    pub fn while_loop<P, B>(self, predicate: P, body: B) -> Computation<F, S>
    where
        P: 'static + Send + Fn(&S) -> bool,
        B: 'static + Send + FnMut(&mut ProtocolBuilder<F>, S) -> ResultHandle<S>,
    {
        let output = self.fabric.new_result();
        let driver = WhileLoop {
            fabric: self.fabric.clone(),
            predicate,
            body,
            state: self.output.clone(),
            output: output.clone(),
        };

        self.extend(Step::looping(driver), output)
    }

    /// Optionally exit the chain early
    ///
    /// If `build` returns `None` the fragment it appended is discarded without
    /// being evaluated, and the chain continues with `None`. Otherwise the
    /// fragment is evaluated and the chain continues with its value
    pub fn early_out<T, B>(self, build: B) -> Computation<F, Option<T>>
    where
        T: Clone + Send + Sync + 'static,
        B: 'static + Send + FnOnce(&mut ProtocolBuilder<F>, S) -> Option<ResultHandle<T>>,
    {
        let output = self.fabric.new_result();
        let (state, fabric, out) = (self.output.clone(), self.fabric.clone(), output.clone());

        let step = Step::lazy(move || {
            let state = state.resolved_value()?;
            let mut builder = ProtocolBuilder::new(fabric, BuilderKind::Sequential);

            match build(&mut builder, state) {
                None => {
                    out.resolve(None)?;
                    Ok(Step::empty())
                },
                Some(fragment_output) => {
                    let resolve = Step::lazy(move || {
                        out.resolve(Some(fragment_output.resolved_value()?))?;
                        Ok(Step::empty())
                    });

                    Ok(Step::sequence(vec![builder.into_step()?, resolve]))
                },
            }
        });

        self.extend(step, output)
    }
}

/// A step that copies one result into another once it is reached
fn forward<F: PrimeField, T>(from: ResultHandle<T>, to: ResultHandle<T>) -> Step<F>
where
    T: Clone + Send + Sync + 'static,
{
    Step::lazy(move || {
        to.resolve(from.resolved_value()?)?;
        Ok(Step::empty())
    })
}

// --------------
// | While Loop |
// --------------

/// Drives the iterations of a while loop
struct WhileLoop<F: PrimeField, S, P, B> {
    /// The session's fabric
    fabric: MpcFabric<F>,
    /// Whether to run another iteration
    predicate: P,
    /// Builds an iteration from the current state
    body: B,
    /// The state produced by the last iteration
    state: ResultHandle<S>,
    /// The loop's final state
    output: ResultHandle<S>,
}

impl<F, S, P, B> LoopDriver<F> for WhileLoop<F, S, P, B>
where
    F: PrimeField,
    S: Clone + Send + Sync + 'static,
    P: Send + Fn(&S) -> bool,
    B: Send + FnMut(&mut ProtocolBuilder<F>, S) -> ResultHandle<S>,
{
    fn next_iteration(&mut self) -> Result<Option<Step<F>>, MpcError> {
        let state = self.state.resolved_value()?;
        if !(self.predicate)(&state) {
            self.output.resolve(state)?;
            return Ok(None);
        }

        let mut builder = ProtocolBuilder::new(self.fabric.clone(), BuilderKind::Sequential);
        self.state = (self.body)(&mut builder, state);
        builder.into_step().map(Some)
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    };

    use crate::{
        error::{ErrorKind, MpcError},
        fabric::{Instruction, LocalGate, ResultHandle, ResultId, RoundContext},
        test_helpers::{mock_executor, TestField, TestScalar},
        PARTY0,
    };

    /// An instruction that claims to take no rounds
    struct ZeroRounds;
    impl Instruction<TestField> for ZeroRounds {
        fn name(&self) -> &str {
            "zero-rounds"
        }

        fn n_rounds(&self) -> usize {
            0
        }

        fn communicates(&self, _round: usize) -> bool {
            false
        }

        fn outputs(&self) -> Vec<ResultId> {
            Vec::new()
        }

        fn compute_and_send(
            &mut self,
            _round: usize,
            _ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            Ok(())
        }

        fn receive_and_resolve(
            &mut self,
            _round: usize,
            _ctx: &mut RoundContext<'_, TestField>,
        ) -> Result<(), MpcError> {
            Ok(())
        }
    }

    /// Run a loop that pushes its iteration count onto a vector
    async fn run_loop(n_iterations: usize) -> Vec<u64> {
        let mut executor = mock_executor();
        executor
            .run(move |root| {
                root.seq(|builder| builder.constant(Vec::<u64>::new()))
                    .while_loop(
                        move |values| values.len() < n_iterations,
                        |builder, mut values| {
                            let output = builder.allocate();
                            let next = values.len() as u64;
                            builder.append(LocalGate::new("push", vec![], output.clone(), move |_| {
                                values.push(next);
                                Ok(values)
                            }));

                            output
                        },
                    )
                    .output()
            })
            .await
            .unwrap()
    }

    /// Tests loops of zero, one, and many iterations
    #[tokio::test]
    async fn test_while_loop() {
        assert_eq!(run_loop(0).await, Vec::<u64>::new());
        assert_eq!(run_loop(1).await, vec![0]);
        assert_eq!(run_loop(10).await, (0..10).collect::<Vec<u64>>());
    }

    /// Tests that a pair of parallel branches joins into a tuple
    #[tokio::test]
    async fn test_pair_in_par() {
        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                root.seq(|builder| builder.constant(()))
                    .pair_in_par(|b, _| b.constant(1u64), |b, _| b.constant(2u64))
                    .output()
            })
            .await;

        assert_eq!(res, Ok((1, 2)));
    }

    /// Tests that steps of a chain see the values of their predecessors
    #[tokio::test]
    async fn test_chain_state() {
        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                root.par(|builder| {
                    let a = builder.constant(2u64);
                    let b = builder.constant(3u64);
                    builder.collect(&[a, b])
                })
                .seq(|builder, values| builder.constant(values.iter().product::<u64>()))
                .seq(|builder, product| builder.constant(product + 1))
                .output()
            })
            .await;

        assert_eq!(res, Ok(7));
    }

    /// Tests that an early exit discards its fragment unevaluated
    #[tokio::test]
    async fn test_early_out() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_clone = counter.clone();

        let mut executor = mock_executor();
        let res = executor
            .run(move |root| {
                root.seq(|builder| builder.constant(0u64))
                    .early_out(move |builder, _| -> Option<ResultHandle<u64>> {
                        let output = builder.allocate();
                        builder.append(LocalGate::new("count", vec![], output, move |_| {
                            counter_clone.fetch_add(1, Ordering::SeqCst);
                            Ok(1u64)
                        }));

                        None
                    })
                    .seq(|builder, inner| builder.constant(if inner.is_none() { 1u64 } else { 0 }))
                    .output()
            })
            .await;

        assert_eq!(res, Ok(1));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }

    /// Tests that a chain started inside a discarded fragment is never
    /// evaluated, and the outer chain continues past it
    #[tokio::test]
    async fn test_early_out_inner_chain() {
        let inner = Arc::new(Mutex::new(None));
        let inner_clone = inner.clone();

        let mut executor = mock_executor();
        let res = executor
            .run(move |root| {
                root.seq(|builder| builder.constant(0u64))
                    .early_out(move |builder, _| -> Option<ResultHandle<u64>> {
                        let value = builder
                            .seq(|b| b.numeric().input(Some(TestScalar::one()), PARTY0))
                            .output();
                        assert!(value.value().is_none());

                        *inner_clone.lock().unwrap() = Some(value);
                        None
                    })
                    .seq(|builder, inner| builder.constant(if inner.is_none() { 1u64 } else { 0 }))
                    .output()
            })
            .await;

        assert_eq!(res, Ok(1));
        let value = inner.lock().unwrap().take().unwrap();
        assert!(value.value().is_none());
    }

    /// Tests that an early out returning a value continues with it
    #[tokio::test]
    async fn test_early_out_some() {
        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                root.seq(|builder| builder.constant(4u64))
                    .early_out(|builder, value| Some(builder.constant(value * 2)))
                    .output()
            })
            .await;

        assert_eq!(res, Ok(Some(8)));
    }

    /// Tests that depending on a result nothing produces is reported as such
    #[tokio::test]
    async fn test_dangling_dependency() {
        let mut executor = mock_executor();
        let mut dangling_id = 0;
        let res = executor
            .run(|root| {
                let dangling = root.allocate::<u64>();
                dangling_id = dangling.id();

                let output = root.allocate();
                let dep = dangling.clone();
                root.append(LocalGate::new("read", vec![Box::new(dangling)], output.clone(), move |_| {
                    dep.resolved_value()
                }));
                output
            })
            .await;

        assert_eq!(res, Err(MpcError::DanglingDependency(dangling_id)));
    }

    /// Tests that a dependency produced only later in the fragment is
    /// rejected, while one produced earlier or by a chain is accepted
    #[tokio::test]
    async fn test_dependency_order() {
        let mut executor = mock_executor();
        let mut late_id = 0;
        let res = executor
            .run(|root| {
                let late = root.allocate::<u64>();
                late_id = late.id();

                let output = root.allocate();
                let dep = late.clone();
                let read = LocalGate::new("read", vec![Box::new(late.clone())], output.clone(), move |_| {
                    dep.resolved_value()
                });
                root.append(read);
                root.append(LocalGate::new("write", vec![], late, |_| Ok(1u64)));
                output
            })
            .await;
        assert_eq!(res, Err(MpcError::DanglingDependency(late_id)));

        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                let chained = root.seq(|builder| builder.constant(2u64)).output();

                let output = root.allocate();
                let dep = chained.clone();
                root.append(LocalGate::new("read", vec![Box::new(chained)], output.clone(), move |_| {
                    Ok(dep.resolved_value()? + 1)
                }));
                output
            })
            .await;
        assert_eq!(res, Ok(3));
    }

    /// Tests that instructions of a parallel scope may not depend on one
    /// another
    #[tokio::test]
    async fn test_parallel_dependency() {
        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                root.par(|builder| {
                    let first = builder.allocate();
                    builder.append(LocalGate::new("first", vec![], first.clone(), |_| Ok(1u64)));

                    let second = builder.allocate();
                    let dep = first.clone();
                    let gate = LocalGate::new("second", vec![Box::new(first)], second.clone(), move |_| {
                        dep.resolved_value()
                    });
                    builder.append(gate);
                    second
                })
                .output()
            })
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Construction);
    }

    /// Tests that depending on another session's result is a construction
    /// error
    #[tokio::test]
    async fn test_foreign_dependency() {
        let other = mock_executor();
        let foreign = other.fabric().constant(1u64);

        let mut executor = mock_executor();
        let res = executor
            .run(move |root| {
                let output = root.allocate();
                let dep = foreign.clone();
                root.append(LocalGate::new("read", vec![Box::new(foreign)], output.clone(), move |_| {
                    dep.resolved_value()
                }));
                output
            })
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Construction);
    }

    /// Tests that an instruction without rounds is a construction error
    #[tokio::test]
    async fn test_zero_rounds() {
        let mut executor = mock_executor();
        let res = executor
            .run(|root| {
                root.append(ZeroRounds);
                root.constant(())
            })
            .await;

        assert_eq!(res.unwrap_err().kind(), ErrorKind::Construction);
    }
}
