//! Defines an abstraction over the network that forwards the executor's
//! outbound messages onto the network and routes inbound messages back to it

use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ark_ff::PrimeField;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use kanal::AsyncReceiver as KanalReceiver;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast::Receiver as BroadcastReceiver;
use tokio::sync::mpsc::{UnboundedReceiver as TokioReceiver, UnboundedSender as TokioSender};
use tracing::log;

use crate::error::MpcNetworkError;
use crate::network::{MpcNetwork, NetworkOutbound, PartyId, RoundTag};

/// Error message emitted when a stream closes early
const ERR_STREAM_FINISHED_EARLY: &str = "stream finished early";

// ---------
// | Stats |
// ---------

/// The network stats structs
///
/// Byte counts are only tracked with the `stats` feature enabled
#[derive(Debug, Default)]
pub struct NetworkStats {
    /// The number of bytes sent
    pub bytes_sent: AtomicUsize,
    /// The number of bytes received
    pub bytes_received: AtomicUsize,
    /// The number of messages sent
    pub messages_sent: AtomicUsize,
    /// The number of messages received
    pub messages_received: AtomicUsize,
}

#[allow(unused)]
impl NetworkStats {
    /// Increment the number of bytes sent
    pub fn increment_bytes_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Increment the number of bytes received
    pub fn increment_bytes_received(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Increment the number of messages sent
    pub fn increment_messages_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::SeqCst);
    }

    /// Increment the number of messages received
    pub fn increment_messages_received(&self) {
        self.messages_received.fetch_add(1, Ordering::SeqCst);
    }

    /// The number of messages sent so far
    pub fn messages_sent(&self) -> usize {
        self.messages_sent.load(Ordering::SeqCst)
    }

    /// The number of messages received so far
    pub fn messages_received(&self) -> usize {
        self.messages_received.load(Ordering::SeqCst)
    }
}

// -------------------------
// | Sender Implementation |
// -------------------------

/// The network sender sits behind the executor and is responsible for
/// forwarding messages onto the network and pulling messages off the network,
/// enqueuing them for the executor's inbound router
pub(crate) struct NetworkSender<F: PrimeField, N: MpcNetwork<F>> {
    /// The outbound queue of messages to send
    outbound: KanalReceiver<NetworkOutbound<F>>,
    /// The queue of inbound messages
    inbound: TokioSender<NetworkOutbound<F>>,
    /// The underlying network connection
    network: N,
    /// The broadcast channel on which shutdown signals are sent
    shutdown: BroadcastReceiver<()>,
    /// The stats of the connection
    stats: Arc<NetworkStats>,
}

impl<F: PrimeField, N: MpcNetwork<F> + Unpin + 'static> NetworkSender<F, N> {
    /// Creates a new network sender
    pub fn new(
        outbound: KanalReceiver<NetworkOutbound<F>>,
        inbound: TokioSender<NetworkOutbound<F>>,
        network: N,
        shutdown: BroadcastReceiver<()>,
        stats: Arc<NetworkStats>,
    ) -> Self {
        NetworkSender { outbound, inbound, network, shutdown, stats }
    }

    /// Run the read and write loops until shutdown, then close the network
    ///
    /// The write loop runs until the executor drops its outbound queue, so
    /// every message enqueued before shutdown is still sent
    pub async fn run(self) {
        // Destructure `self` to take ownership of each field
        let NetworkSender { outbound, inbound, network, shutdown, stats } = self;

        // Start a read and write loop separately
        let (send, recv): (SplitSink<N, NetworkOutbound<F>>, SplitStream<N>) = network.split();
        let read_loop_fut = tokio::spawn(Self::read_loop(recv, inbound, shutdown, stats.clone()));
        let write_loop_fut = tokio::spawn(Self::write_loop(outbound, send, stats.clone()));

        let (recv, read_err) = match read_loop_fut.await {
            Ok(res) => res,
            Err(e) => {
                log::error!("error joining `NetworkSender::read_loop`: {e:?}");
                return;
            },
        };
        if let Some(err) = read_err {
            log::warn!("`NetworkSender::read_loop` stopped: {err}");
        }

        let (send, write_err) = match write_loop_fut.await {
            Ok(res) => res,
            Err(e) => {
                log::error!("error joining `NetworkSender::write_loop`: {e:?}");
                return;
            },
        };
        if let Some(err) = write_err {
            log::error!("error in `NetworkSender::write_loop`: {err}");
        }

        // Log the stats after execution finishes
        #[cfg(feature = "stats")]
        log::info!("network stats: {stats:#?}");

        match recv.reunite(send) {
            Ok(mut network) => {
                if let Err(e) = MpcNetwork::<F>::close(&mut network).await {
                    log::error!("error closing network: {e}");
                }
            },
            Err(e) => log::error!("error reuniting network halves: {e:?}"),
        }
    }

    /// The read loop for the network, reads messages from the network and
    /// enqueues them for the executor
    async fn read_loop(
        mut network_stream: SplitStream<N>,
        inbound: TokioSender<NetworkOutbound<F>>,
        mut shutdown: BroadcastReceiver<()>,
        stats: Arc<NetworkStats>,
    ) -> (SplitStream<N>, Option<MpcNetworkError>) {
        let err = loop {
            tokio::select! {
                msg = network_stream.next() => match msg {
                    Some(Ok(msg)) => {
                        #[cfg(feature = "stats")]
                        {
                            let n_bytes = serde_json::to_vec(&msg).map(|b| b.len()).unwrap_or(0);
                            stats.increment_bytes_received(n_bytes);
                        }
                        stats.increment_messages_received();

                        // The executor has gone away
                        if inbound.send(msg).is_err() {
                            break None;
                        }
                    },
                    Some(Err(e)) => break Some(e),
                    None => break Some(MpcNetworkError::RecvError(ERR_STREAM_FINISHED_EARLY.to_string())),
                },
                _ = shutdown.recv() => {
                    log::debug!("received shutdown signal");
                    break None;
                },
            }
        };

        (network_stream, err)
    }

    /// The write loop for the network, reads messages from the outbound queue
    /// and sends them onto the network
    async fn write_loop(
        outbound_stream: KanalReceiver<NetworkOutbound<F>>,
        mut network: SplitSink<N, NetworkOutbound<F>>,
        stats: Arc<NetworkStats>,
    ) -> (SplitSink<N, NetworkOutbound<F>>, Option<MpcNetworkError>) {
        while let Ok(msg) = outbound_stream.recv().await {
            #[cfg(feature = "stats")]
            {
                let n_bytes = serde_json::to_vec(&msg).map(|b| b.len()).unwrap_or(0);
                stats.increment_bytes_sent(n_bytes);
            }
            stats.increment_messages_sent();

            if let Err(e) = network.send(msg).await {
                return (network, Some(e));
            }
        }

        (network, None)
    }
}

// ------------------
// | Inbound Router |
// ------------------

/// Demultiplexes the inbound queue by sender
///
/// Messages from a peer other than the one being waited on are held until
/// they are asked for. Messages from a single peer arrive in order, so the
/// next message held for a peer must carry the round being waited on
pub(crate) struct InboundRouter<F: PrimeField> {
    /// The ID of the local party
    party_id: PartyId,
    /// The number of parties in the session
    n_parties: usize,
    /// The queue of inbound messages from the network sender
    inbound: TokioReceiver<NetworkOutbound<F>>,
    /// Messages received ahead of being asked for, by sender
    pending: FxHashMap<PartyId, VecDeque<NetworkOutbound<F>>>,
    /// How long to wait on the network for a single message
    timeout: Option<Duration>,
}

impl<F: PrimeField> InboundRouter<F> {
    /// Constructor
    pub fn new(
        party_id: PartyId,
        n_parties: usize,
        inbound: TokioReceiver<NetworkOutbound<F>>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { party_id, n_parties, inbound, pending: FxHashMap::default(), timeout }
    }

    /// Receive the message the given peer sent in the given round
    pub async fn recv_from(
        &mut self,
        peer: PartyId,
        round: RoundTag,
    ) -> Result<NetworkOutbound<F>, MpcNetworkError> {
        loop {
            if let Some(msg) = self.pending.get_mut(&peer).and_then(VecDeque::pop_front) {
                return Self::check_round(msg, round);
            }

            let msg = self.next_inbound(peer).await?;
            if msg.recipient != self.party_id {
                return Err(MpcNetworkError::UnknownPeer(msg.recipient));
            }
            if msg.sender == self.party_id || msg.sender as usize >= self.n_parties {
                return Err(MpcNetworkError::UnknownPeer(msg.sender));
            }

            if msg.sender == peer {
                return Self::check_round(msg, round);
            }
            self.pending.entry(msg.sender).or_default().push_back(msg);
        }
    }

    /// Pull the next message off the inbound queue
    async fn next_inbound(&mut self, peer: PartyId) -> Result<NetworkOutbound<F>, MpcNetworkError> {
        let msg = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.inbound.recv())
                .await
                .map_err(|_| MpcNetworkError::Timeout(peer))?,
            None => self.inbound.recv().await,
        };

        msg.ok_or_else(|| {
            MpcNetworkError::RecvError(format!("connection closed waiting on party {peer}"))
        })
    }

    /// Check that a message belongs to the expected round
    fn check_round(
        msg: NetworkOutbound<F>,
        round: RoundTag,
    ) -> Result<NetworkOutbound<F>, MpcNetworkError> {
        if msg.round != round {
            return Err(MpcNetworkError::UnexpectedRound {
                peer: msg.sender,
                expected: round,
                received: msg.round,
            });
        }

        Ok(msg)
    }
}

impl<F: PrimeField> Debug for InboundRouter<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InboundRouter")
            .field("party_id", &self.party_id)
            .field("n_parties", &self.n_parties)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use tokio::sync::mpsc::unbounded_channel;

    use crate::{
        error::MpcNetworkError,
        network::NetworkOutbound,
        test_helpers::TestField,
        PARTY0, PARTY1, PARTY2,
    };

    use super::InboundRouter;

    /// Build an empty message
    fn message(sender: u64, round: u64) -> NetworkOutbound<TestField> {
        NetworkOutbound { sender, recipient: PARTY0, round, payloads: vec![] }
    }

    /// Tests that messages are routed by sender regardless of arrival order
    #[tokio::test]
    async fn test_out_of_order_senders() {
        let (send, recv) = unbounded_channel();
        let mut router = InboundRouter::new(PARTY0, 3, recv, None);

        send.send(message(PARTY2, 0)).unwrap();
        send.send(message(PARTY2, 1)).unwrap();
        send.send(message(PARTY1, 0)).unwrap();

        assert_eq!(router.recv_from(PARTY1, 0).await.unwrap().sender, PARTY1);
        assert_eq!(router.recv_from(PARTY2, 0).await.unwrap().round, 0);
        assert_eq!(router.recv_from(PARTY2, 1).await.unwrap().round, 1);
    }

    /// Tests that a message from the wrong round is rejected
    #[tokio::test]
    async fn test_wrong_round() {
        let (send, recv) = unbounded_channel();
        let mut router = InboundRouter::new(PARTY0, 2, recv, None);

        send.send(message(PARTY1, 3)).unwrap();
        let err = router.recv_from(PARTY1, 2).await.unwrap_err();
        assert_eq!(err, MpcNetworkError::UnexpectedRound { peer: PARTY1, expected: 2, received: 3 });
    }

    /// Tests that a silent peer times out
    #[tokio::test]
    async fn test_timeout() {
        let (_send, recv) = unbounded_channel();
        let mut router =
            InboundRouter::<TestField>::new(PARTY0, 2, recv, Some(Duration::from_millis(20)));

        let err = router.recv_from(PARTY1, 0).await.unwrap_err();
        assert_eq!(err, MpcNetworkError::Timeout(PARTY1));
    }
}
