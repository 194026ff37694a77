//! Plain (raw RTP/UDP) transport: the "server pushes" sink that feeds the
//! external pipeline subprocess. RTCP is not multiplexed; the receiver
//! address is always loopback.

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;

use crate::producer_consumer::Consumer;

pub struct PlainTransport {
    task: JoinHandle<()>,
}

impl PlainTransport {
    /// Binds an ephemeral local socket, connects it to `127.0.0.1:rtp_port`
    /// (so every `send` targets the pipeline without re-specifying the
    /// address), and relays the consumer's packetized RTP there until the
    /// producer closes or `close` is called.
    pub async fn connect(rtp_port: u16, consumer: Consumer) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("127.0.0.1:0").await?;
        socket.connect(("127.0.0.1", rtp_port)).await?;

        let mut consumer = consumer;
        let task = tokio::spawn(async move {
            while let Some(packet) = consumer.recv().await {
                if let Err(err) = socket.send(&packet).await {
                    tracing::warn!(error = %err, "plain transport send failed");
                }
            }
        });

        Ok(Self { task })
    }

    /// Idempotent: aborting an already-finished task is a no-op.
    pub async fn close(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer_consumer::Producer;

    #[tokio::test]
    async fn relays_consumer_packets_to_the_bound_port() {
        let sink = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sink_port = sink.local_addr().unwrap().port();

        let (producer, tx) = Producer::new(111, 48_000, 2);
        let consumer = producer.consume();
        let transport = PlainTransport::connect(sink_port, consumer).await.unwrap();

        tx.send(std::sync::Arc::new(vec![1, 2, 3, 4])).unwrap();

        let mut buf = [0u8; 16];
        let (len, _) = tokio::time::timeout(std::time::Duration::from_secs(1), sink.recv_from(&mut buf))
            .await
            .expect("should receive relayed packet")
            .unwrap();

        assert_eq!(&buf[..len], &[1, 2, 3, 4]);
        transport.close().await;
    }
}
