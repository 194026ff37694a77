//! Producer/Consumer: a publisher's track and a subscription to it.
//!
//! Scoped narrowly per the orchestrator's needs: one producer (the
//! publisher's audio track) feeding at most one plain-transport consumer
//! (the egress session). Fan-out is a `broadcast` channel so the shape still
//! generalizes to more consumers without restructuring.

use std::sync::Arc;

use tokio::sync::broadcast;
use uuid::Uuid;

const PACKET_BUFFER: usize = 256;

#[derive(Clone)]
pub struct Producer {
    pub id: String,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u8,
    tx: broadcast::Sender<Arc<Vec<u8>>>,
}

impl Producer {
    /// Returns the consumer-facing handle plus the sender the transport's
    /// event loop uses to push freshly packetized RTP.
    pub(crate) fn new(payload_type: u8, clock_rate: u32, channels: u8) -> (Self, broadcast::Sender<Arc<Vec<u8>>>) {
        let (tx, _rx) = broadcast::channel(PACKET_BUFFER);
        let producer = Self {
            id: Uuid::new_v4().to_string(),
            payload_type,
            clock_rate,
            channels,
            tx: tx.clone(),
        };
        (producer, tx)
    }

    pub fn consume(&self) -> Consumer {
        Consumer {
            rx: self.tx.subscribe(),
            payload_type: self.payload_type,
            clock_rate: self.clock_rate,
            channels: self.channels,
        }
    }
}

pub struct Consumer {
    rx: broadcast::Receiver<Arc<Vec<u8>>>,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u8,
}

impl Consumer {
    /// Awaits the next RTP packet. Returns `None` once the producer closes.
    pub async fn recv(&mut self) -> Option<Arc<Vec<u8>>> {
        loop {
            match self.rx.recv().await {
                Ok(packet) => return Some(packet),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "consumer lagged behind producer stream, dropping packets");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consumer_receives_packets_sent_by_producer() {
        let (producer, tx) = Producer::new(111, 48_000, 2);
        let mut consumer = producer.consume();

        tx.send(Arc::new(vec![1, 2, 3])).unwrap();
        let packet = consumer.recv().await.unwrap();
        assert_eq!(*packet, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn consumer_recv_returns_none_after_producer_closes() {
        let (producer, tx) = Producer::new(111, 48_000, 2);
        let mut consumer = producer.consume();
        drop(tx);

        assert!(consumer.recv().await.is_none());
    }
}
