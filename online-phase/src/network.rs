//! The `network` module defines abstractions of the transport used to
//! communicate during the course of an MPC
mod mock;

use ark_ff::PrimeField;
use futures::{Sink, Stream};
#[cfg(any(feature = "test_helpers", feature = "benchmarks", test))]
pub use mock::{MockNetwork, NoRecvNetwork, UnboundedDuplexStream};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    algebra::{Scalar, ScalarShare},
    error::MpcNetworkError,
};

/// A type alias of the id of a party in an MPC for readability
pub type PartyId = u64;
/// The tag of a network exchange, increasing by one with every exchange of a
/// session
pub type RoundTag = u64;

// ------------
// | Messages |
// ------------

/// A message exchanged between two parties
///
/// Every exchange sends exactly one message to each peer. The message holds
/// one entry per instruction that communicated in the round, in batch order;
/// each entry holds the payloads that instruction addressed to the recipient
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound = "F: PrimeField")]
pub struct NetworkOutbound<F: PrimeField> {
    /// The party that sent the message
    pub sender: PartyId,
    /// The party the message is addressed to
    pub recipient: PartyId,
    /// The exchange this message belongs to
    pub round: RoundTag,
    /// The bodies of the message, grouped by instruction
    pub payloads: Vec<Vec<NetworkPayload<F>>>,
}

/// The payload of an outbound message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "F: PrimeField", deserialize = "F: PrimeField"))]
pub enum NetworkPayload<F: PrimeField> {
    /// A byte value
    Bytes(Vec<u8>),
    /// A scalar value
    Scalar(Scalar<F>),
    /// A batch of scalar values
    ScalarBatch(Vec<Scalar<F>>),
    /// A share of a scalar value
    ScalarShare(ScalarShare<F>),
}

impl<F: PrimeField> NetworkPayload<F> {
    /// The name of the payload's variant, used in error messages
    fn kind(&self) -> &'static str {
        match self {
            NetworkPayload::Bytes(_) => "Bytes",
            NetworkPayload::Scalar(_) => "Scalar",
            NetworkPayload::ScalarBatch(_) => "ScalarBatch",
            NetworkPayload::ScalarShare(_) => "ScalarShare",
        }
    }
}

// ---------------
// | Conversions |
// ---------------

/// Implement the conversions into and out of a payload variant
///
/// Conversions out of a payload fail with a description of the mismatch
macro_rules! impl_payload_conversion {
    ($variant:ident, $target:ty) => {
        impl<F: PrimeField> From<$target> for NetworkPayload<F> {
            fn from(value: $target) -> Self {
                Self::$variant(value)
            }
        }

        impl<F: PrimeField> TryFrom<NetworkPayload<F>> for $target {
            type Error = String;

            fn try_from(payload: NetworkPayload<F>) -> Result<Self, Self::Error> {
                match payload {
                    NetworkPayload::$variant(value) => Ok(value),
                    other => Err(format!(
                        "expected NetworkPayload::{}, got NetworkPayload::{}",
                        stringify!($variant),
                        other.kind()
                    )),
                }
            }
        }
    };
}

impl_payload_conversion!(Bytes, Vec<u8>);
impl_payload_conversion!(Scalar, Scalar<F>);
impl_payload_conversion!(ScalarBatch, Vec<Scalar<F>>);
impl_payload_conversion!(ScalarShare, ScalarShare<F>);

// ---------
// | Trait |
// ---------

/// The `MpcNetwork` trait defines shared functionality for a network
/// connecting the local party to every peer of an MPC
///
/// The stream yields inbound messages from any peer in the order they arrive;
/// messages from a single peer must arrive in the order that peer sent them.
/// The sink routes each outbound message to its `recipient`
#[async_trait]
pub trait MpcNetwork<F: PrimeField>:
    Send
    + Stream<Item = Result<NetworkOutbound<F>, MpcNetworkError>>
    + Sink<NetworkOutbound<F>, Error = MpcNetworkError>
{
    /// Get the party ID of the local party in the MPC
    fn party_id(&self) -> PartyId;
    /// Get the number of parties in the MPC
    fn n_parties(&self) -> usize;
    /// Closes the connections opened in the handshake phase
    async fn close(&mut self) -> Result<(), MpcNetworkError>;
}
