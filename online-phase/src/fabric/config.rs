//! Configuration of the round scheduler
//!
//! Every party of a session must run with the same configuration, the
//! batching and flush decisions determine the sequence of network exchanges

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::MpcError;

/// The default maximum number of instructions driven in a single batch
const DEFAULT_MAX_BATCH_SIZE: usize = 4096;
/// The default number of opened values after which a mac check runs mid-run
const DEFAULT_MAC_CHECK_THRESHOLD: usize = 100_000;

/// How the instructions of a batch are driven
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationStrategy {
    /// Drive each instruction of a batch alone, one after another
    Sequential,
    /// Drive all instructions of a batch together, sharing each exchange
    #[default]
    Parallel,
}

/// When the scheduler exchanges messages with its peers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlushPolicy {
    /// Exchange after every round, even if no instruction communicates,
    /// flushing every message buffered in the round
    EveryRound,
    /// Exchange only in rounds where some instruction communicates
    ///
    /// An instruction's messages buffered in its silent rounds are held and
    /// sent with its next communicating round
    #[default]
    OnDemand,
}

/// The configuration of an executor
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// How batches are driven
    pub strategy: EvaluationStrategy,
    /// When messages are exchanged
    pub flush_policy: FlushPolicy,
    /// The maximum number of instructions collected into one batch
    pub max_batch_size: usize,
    /// The number of buffered opened values that triggers a mac check before
    /// the next batch; zero disables the periodic check
    pub mac_check_threshold: usize,
    /// How long to wait on a peer's message before failing, unbounded if
    /// `None`
    pub receive_timeout_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            strategy: EvaluationStrategy::default(),
            flush_policy: FlushPolicy::default(),
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            mac_check_threshold: DEFAULT_MAC_CHECK_THRESHOLD,
            receive_timeout_ms: None,
        }
    }
}

impl ExecutorConfig {
    /// Set the evaluation strategy
    pub fn with_strategy(mut self, strategy: EvaluationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the flush policy
    pub fn with_flush_policy(mut self, flush_policy: FlushPolicy) -> Self {
        self.flush_policy = flush_policy;
        self
    }

    /// Set the maximum batch size
    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Set the periodic mac check threshold
    pub fn with_mac_check_threshold(mut self, threshold: usize) -> Self {
        self.mac_check_threshold = threshold;
        self
    }

    /// Set the receive timeout
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// The receive timeout as a duration
    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    /// Check that the configuration is usable
    pub fn validate(&self) -> Result<(), MpcError> {
        if self.max_batch_size == 0 {
            return Err(MpcError::Construction("max batch size must be at least one".to_string()));
        }

        Ok(())
    }
}
