//! In-process transport mocks for exercising the keepalive/request wire
//! protocol without binding real sockets.

use bytes::Bytes;
use tokio::sync::mpsc;

/// One end of an in-process duplex byte-datagram channel, standing in for
/// a UDP socket pair in keepalive-engine tests.
///
/// Built in pairs via [`datagram_pair`]; each end's `send` feeds the
/// other's `recv`.
pub struct MockDatagramSocket {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl MockDatagramSocket {
    /// Send a datagram to the paired end.
    ///
    /// # Errors
    ///
    /// Returns an error if the paired end has been dropped.
    pub fn send(&self, datagram: Bytes) -> Result<(), mpsc::error::SendError<Bytes>> {
        self.tx.send(datagram)
    }

    /// Receive the next datagram sent by the paired end, or `None` once
    /// it's been dropped.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Build a connected pair of [`MockDatagramSocket`]s, as if one were the
/// server's keepalive socket and the other a client's.
#[must_use]
pub fn datagram_pair() -> (MockDatagramSocket, MockDatagramSocket) {
    let (tx_a, rx_b) = mpsc::unbounded_channel();
    let (tx_b, rx_a) = mpsc::unbounded_channel();
    (MockDatagramSocket { tx: tx_a, rx: rx_a }, MockDatagramSocket { tx: tx_b, rx: rx_b })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn datagram_pair_delivers_in_order() {
        let (a, mut b) = datagram_pair();
        a.send(Bytes::from_static(b"one")).unwrap();
        a.send(Bytes::from_static(b"two")).unwrap();

        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"one"));
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"two"));
    }

    #[tokio::test]
    async fn dropping_one_end_closes_the_other() {
        let (a, mut b) = datagram_pair();
        drop(a);
        assert!(b.recv().await.is_none());
    }
}
