//! Errors defined across the MPC implementation

use thiserror::Error;

use crate::{
    fabric::ResultId,
    network::{PartyId, RoundTag},
};

/// The broad category an error falls into
///
/// Every category is fatal to the session it occurs in; the category only
/// describes where the fault lies
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The computation graph is malformed, detected before any network I/O for
    /// the offending fragment
    Construction,
    /// A message was dropped, malformed, or a peer disconnected
    Communication,
    /// A peer deviated from the protocol in a way caught by a MAC check,
    /// commitment, or broadcast consistency check
    Authentication,
    /// The data supplier could not produce more preprocessed material
    ResourceExhaustion,
    /// The session was aborted by an earlier failure
    Aborted,
}

/// An error executing an MPC
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MpcError {
    /// An instruction depends on a result that no earlier step produces
    #[error("dangling dependency on result {0}")]
    DanglingDependency(ResultId),
    /// The computation graph is otherwise malformed
    #[error("invalid computation: {0}")]
    Construction(String),
    /// A result was resolved more than once
    #[error("result {0} resolved twice")]
    DoubleResolution(ResultId),
    /// An error on the underlying network
    #[error("network error: {0}")]
    Network(#[from] MpcNetworkError),
    /// The MAC check over the opened values failed
    #[error("mac check failed")]
    AuthenticationError,
    /// A peer opened a value that does not match its commitment
    #[error("party {0} revealed a value inconsistent with its commitment")]
    InvalidCommitment(PartyId),
    /// The given party broadcast different values to different peers
    #[error("party {0} sent an inconsistent broadcast")]
    InconsistentBroadcast(PartyId),
    /// An instruction broke the message discipline of the executor
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A local operation on public values is undefined, e.g. inverting zero
    #[error("arithmetic error: {0}")]
    Arithmetic(String),
    /// The data supplier has no more material of the requested kind
    #[error("data supplier exhausted: {0}")]
    SupplierExhausted(String),
    /// The session was aborted by an earlier failure
    #[error("session aborted")]
    SessionAborted,
}

impl MpcError {
    /// The category of the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MpcError::DanglingDependency(_)
            | MpcError::Construction(_)
            | MpcError::DoubleResolution(_)
            | MpcError::ProtocolViolation(_)
            | MpcError::Arithmetic(_) => ErrorKind::Construction,
            MpcError::Network(_) => ErrorKind::Communication,
            MpcError::AuthenticationError
            | MpcError::InvalidCommitment(_)
            | MpcError::InconsistentBroadcast(_) => ErrorKind::Authentication,
            MpcError::SupplierExhausted(_) => ErrorKind::ResourceExhaustion,
            MpcError::SessionAborted => ErrorKind::Aborted,
        }
    }
}

/// An error on the network
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MpcNetworkError {
    /// An error sending a message
    #[error("error sending message: {0}")]
    SendError(String),
    /// An error receiving a message
    #[error("error receiving message: {0}")]
    RecvError(String),
    /// A message arrived tagged with the wrong round
    #[error("expected round {expected} from party {peer}, received round {received}")]
    UnexpectedRound {
        /// The sender of the message
        peer: PartyId,
        /// The round the local party is waiting on
        expected: RoundTag,
        /// The round the message was tagged with
        received: RoundTag,
    },
    /// A message arrived from, or was addressed to, a party outside the session
    #[error("unknown party {0}")]
    UnknownPeer(PartyId),
    /// An instruction expected a payload from the given party that was not sent
    #[error("missing payload from party {0}")]
    MissingPayload(PartyId),
    /// A payload had an unexpected shape
    #[error("unexpected payload from party {peer}: {reason}")]
    UnexpectedPayload {
        /// The sender of the payload
        peer: PartyId,
        /// A description of the mismatch
        reason: String,
    },
    /// Timed out waiting on a message from the given party
    #[error("timed out waiting on party {0}")]
    Timeout(PartyId),
    /// An error serializing or deserializing a message
    #[error("serialization error: {0}")]
    SerializationError(String),
}
