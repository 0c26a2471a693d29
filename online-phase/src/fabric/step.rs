//! Defines the lazily expanded tree of computation steps the executor draws
//! batches of ready instructions from

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use ark_ff::PrimeField;

use crate::error::MpcError;

use super::{Instruction, MpcFabric};

/// Error message emitted when a step queue lock is poisoned
pub(crate) const ERR_STEP_QUEUE_POISONED: &str = "step queue lock poisoned";

/// A queue of steps evaluated in order, shared between a chain and the step
/// that evaluates it
pub(crate) type StepQueue<F> = Arc<Mutex<VecDeque<Step<F>>>>;
/// A deferred constructor of a step
pub(crate) type BuildFn<F> = Box<dyn FnOnce() -> Result<Step<F>, MpcError> + Send>;
/// A function run once both branches of a pair have finished
pub(crate) type JoinFn = Box<dyn FnOnce() -> Result<(), MpcError> + Send>;

/// Produces the iterations of a loop, one at a time
pub(crate) trait LoopDriver<F: PrimeField>: Send {
    /// Build the next iteration, or `None` once the loop has finished
    ///
    /// Called only after the previous iteration was fully evaluated
    fn next_iteration(&mut self) -> Result<Option<Step<F>>, MpcError>;
}

/// The outcome of collecting from a step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Progress {
    /// The step still has instructions to run, some of which may have just
    /// been added to the batch
    Pending,
    /// The step has been fully evaluated, nothing was added to the batch
    Done,
}

/// A node of the computation tree
pub(crate) enum Step<F: PrimeField> {
    /// A single instruction, taken once it is moved into a batch
    Instruction(Option<Box<dyn Instruction<F>>>),
    /// Children evaluated strictly one after another
    Sequential(StepQueue<F>),
    /// Children evaluated concurrently
    Parallel(Vec<Step<F>>),
    /// A step built on first visit, after every prior step has evaluated
    Lazy(Option<BuildFn<F>>),
    /// A loop whose iterations are built one at a time
    Loop {
        /// The source of iterations
        driver: Box<dyn LoopDriver<F>>,
        /// The iteration currently being evaluated
        current: Option<Box<Step<F>>>,
    },
    /// Two branches evaluated concurrently, then joined
    Paired {
        /// The parallel step holding both branches
        branches: Box<Step<F>>,
        /// The function joining the branches' outputs
        join: Option<JoinFn>,
    },
}

impl<F: PrimeField> Step<F> {
    /// A step wrapping a single instruction
    pub fn instruction(instruction: Box<dyn Instruction<F>>) -> Self {
        Step::Instruction(Some(instruction))
    }

    /// A step evaluating the given steps in order
    pub fn sequence(steps: Vec<Step<F>>) -> Self {
        Step::Sequential(Arc::new(Mutex::new(steps.into())))
    }

    /// A step with nothing to evaluate
    pub fn empty() -> Self {
        Step::sequence(Vec::new())
    }

    /// A step built on first visit
    pub fn lazy<B>(build: B) -> Self
    where
        B: 'static + Send + FnOnce() -> Result<Step<F>, MpcError>,
    {
        Step::Lazy(Some(Box::new(build)))
    }

    /// A loop driven by the given driver
    pub fn looping<D: 'static + LoopDriver<F>>(driver: D) -> Self {
        Step::Loop { driver: Box::new(driver), current: None }
    }

    /// Move ready instructions into the batch, up to `max_batch` in total
    ///
    /// An instruction is ready once every step sequenced before it has been
    /// evaluated. Its dependencies must all be resolved by then, otherwise it
    /// depends on a result nothing earlier produces
    pub fn collect(
        &mut self,
        fabric: &MpcFabric<F>,
        batch: &mut Vec<Box<dyn Instruction<F>>>,
        max_batch: usize,
    ) -> Result<Progress, MpcError> {
        match self {
            Step::Instruction(slot) => {
                let instruction = match slot.as_ref() {
                    Some(instruction) => instruction,
                    None => return Ok(Progress::Done),
                };

                if batch.len() >= max_batch {
                    return Ok(Progress::Pending);
                }

                for dep in instruction.dependencies() {
                    if dep.session_id() != fabric.session_id() {
                        return Err(MpcError::Construction(format!(
                            "{} depends on result {} of another session",
                            instruction.name(),
                            dep.id()
                        )));
                    }

                    if !dep.is_resolved() {
                        return Err(MpcError::DanglingDependency(dep.id()));
                    }
                }

                batch.extend(slot.take());
                Ok(Progress::Pending)
            },

            Step::Sequential(queue) => loop {
                // Release the lock while the child is visited
                let front = queue.lock().expect(ERR_STEP_QUEUE_POISONED).pop_front();
                let mut child = match front {
                    Some(child) => child,
                    None => return Ok(Progress::Done),
                };

                if child.collect(fabric, batch, max_batch)? == Progress::Pending {
                    queue.lock().expect(ERR_STEP_QUEUE_POISONED).push_front(child);
                    return Ok(Progress::Pending);
                }
            },

            Step::Parallel(children) => {
                let mut idx = 0;
                while idx < children.len() {
                    match children[idx].collect(fabric, batch, max_batch)? {
                        Progress::Done => {
                            children.remove(idx);
                        },
                        Progress::Pending => idx += 1,
                    }
                }

                Ok(if children.is_empty() { Progress::Done } else { Progress::Pending })
            },

            Step::Lazy(build) => {
                let build = match build.take() {
                    Some(build) => build,
                    None => return Ok(Progress::Done),
                };

                *self = build()?;
                self.collect(fabric, batch, max_batch)
            },

            Step::Loop { driver, current } => loop {
                if let Some(step) = current.as_mut() {
                    if step.collect(fabric, batch, max_batch)? == Progress::Pending {
                        return Ok(Progress::Pending);
                    }
                    *current = None;
                }

                match driver.next_iteration()? {
                    Some(step) => *current = Some(Box::new(step)),
                    None => return Ok(Progress::Done),
                }
            },

            Step::Paired { branches, join } => {
                if branches.collect(fabric, batch, max_batch)? == Progress::Pending {
                    return Ok(Progress::Pending);
                }

                if let Some(join) = join.take() {
                    join()?;
                }
                Ok(Progress::Done)
            },
        }
    }
}
