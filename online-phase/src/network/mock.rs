//! Defines a mock network for unit tests

use std::{
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use ark_ff::PrimeField;
use async_trait::async_trait;
use futures::{Sink, Stream};
use itertools::Itertools;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{error::MpcNetworkError, PARTY0};

use super::{MpcNetwork, NetworkOutbound, PartyId};

/// A dummy MPC network for a single party session, it has no peers and so
/// never receives messages
#[derive(Default)]
pub struct NoRecvNetwork<F: PrimeField>(PhantomData<F>);

#[async_trait]
impl<F: PrimeField> MpcNetwork<F> for NoRecvNetwork<F> {
    fn party_id(&self) -> PartyId {
        PARTY0
    }

    fn n_parties(&self) -> usize {
        1
    }

    async fn close(&mut self) -> Result<(), MpcNetworkError> {
        Ok(())
    }
}

impl<F: PrimeField> Stream for NoRecvNetwork<F> {
    type Item = Result<NetworkOutbound<F>, MpcNetworkError>;

    fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Poll::Pending
    }
}

impl<F: PrimeField> Sink<NetworkOutbound<F>> for NoRecvNetwork<F> {
    type Error = MpcNetworkError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: NetworkOutbound<F>) -> Result<(), Self::Error> {
        Err(MpcNetworkError::UnknownPeer(item.recipient))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }
}

/// An unbounded duplex channel used to mock a network connection between two
/// parties
pub struct UnboundedDuplexStream<F: PrimeField> {
    /// The send side of the stream
    send: UnboundedSender<NetworkOutbound<F>>,
    /// The receive side of the stream
    recv: UnboundedReceiver<NetworkOutbound<F>>,
}

impl<F: PrimeField> UnboundedDuplexStream<F> {
    /// Create a new pair of duplex streams
    pub fn new_duplex_pair() -> (Self, Self) {
        let (send1, recv1) = unbounded_channel();
        let (send2, recv2) = unbounded_channel();

        (Self { send: send1, recv: recv2 }, Self { send: send2, recv: recv1 })
    }

    /// Send a message on the stream
    pub fn send(&self, msg: NetworkOutbound<F>) -> Result<(), MpcNetworkError> {
        self.send.send(msg).map_err(|err| MpcNetworkError::SendError(err.to_string()))
    }

    /// Recv a message from the stream, `None` once the other end has hung up
    pub async fn recv(&mut self) -> Option<NetworkOutbound<F>> {
        self.recv.recv().await
    }

    /// Poll the stream for a message
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<NetworkOutbound<F>>> {
        self.recv.poll_recv(cx)
    }
}

/// A dummy network implementation used for unit testing
///
/// Each party holds one duplex stream per peer; together a set of mock
/// networks forms a fully connected mesh
pub struct MockNetwork<F: PrimeField> {
    /// The ID of the local party
    party_id: PartyId,
    /// The connection to each peer, indexed by party ID
    ///
    /// The local party's own slot is always `None`, as is the slot of a peer
    /// that has hung up
    links: Vec<Option<UnboundedDuplexStream<F>>>,
    /// The link to poll first on the next read, rotated to keep reads fair
    next_poll: usize,
}

impl<F: PrimeField> MockNetwork<F> {
    /// Build a fully connected mesh of `n_parties` mock networks, ordered by
    /// party ID
    pub fn new_mesh(n_parties: usize) -> Vec<Self> {
        let mut links = (0..n_parties)
            .map(|_| (0..n_parties).map(|_| None).collect_vec())
            .collect_vec();

        for i in 0..n_parties {
            for j in (i + 1)..n_parties {
                let (left, right) = UnboundedDuplexStream::new_duplex_pair();
                links[i][j] = Some(left);
                links[j][i] = Some(right);
            }
        }

        links
            .into_iter()
            .enumerate()
            .map(|(party_id, links)| Self { party_id: party_id as PartyId, links, next_poll: 0 })
            .collect_vec()
    }

    /// Whether every link of the local party has hung up
    fn all_closed(&self) -> bool {
        self.links.iter().all(Option::is_none)
    }
}

#[async_trait]
impl<F: PrimeField> MpcNetwork<F> for MockNetwork<F> {
    fn party_id(&self) -> PartyId {
        self.party_id
    }

    fn n_parties(&self) -> usize {
        self.links.len()
    }

    async fn close(&mut self) -> Result<(), MpcNetworkError> {
        self.links.iter_mut().for_each(|link| *link = None);
        Ok(())
    }
}

impl<F: PrimeField> Stream for MockNetwork<F> {
    type Item = Result<NetworkOutbound<F>, MpcNetworkError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let n_links = self.links.len();
        let start = self.next_poll;

        for offset in 0..n_links {
            let idx = (start + offset) % n_links;
            let poll = match self.links[idx].as_mut() {
                Some(link) => link.poll_recv(cx),
                None => continue,
            };

            match poll {
                Poll::Ready(Some(msg)) => {
                    self.next_poll = (idx + 1) % n_links;
                    return Poll::Ready(Some(Ok(msg)));
                },
                // The peer hung up, stop polling its link
                Poll::Ready(None) => self.links[idx] = None,
                Poll::Pending => {},
            }
        }

        if self.all_closed() {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

impl<F: PrimeField> Sink<NetworkOutbound<F>> for MockNetwork<F> {
    type Error = MpcNetworkError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, item: NetworkOutbound<F>) -> Result<(), Self::Error> {
        let recipient = item.recipient;
        match self.links.get(recipient as usize) {
            Some(Some(link)) => link.send(item),
            Some(None) if recipient != self.party_id => Err(MpcNetworkError::SendError(format!(
                "connection to party {recipient} closed"
            ))),
            _ => Err(MpcNetworkError::UnknownPeer(recipient)),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.links.iter_mut().for_each(|link| *link = None);
        Poll::Ready(Ok(()))
    }
}
