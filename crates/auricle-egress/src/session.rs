use tokio::task::JoinHandle;

use auricle_pipeline::{PipelineHandle, PollerHandle};
use auricle_sfu::PlainTransport;

use crate::state::SessionState;

/// Everything provisioned for one producer's egress, in acquisition order.
/// Teardown releases these in reverse.
pub(crate) struct Session {
    pub producer_id: String,
    pub room_id: String,
    pub peer_id: String,
    pub role: Option<String>,
    pub rtp_port: u16,
    pub rtcp_port: u16,
    pub wav_prefix: String,
    pub payload_type: u8,
    pub attempt: u32,
    pub state: SessionState,

    pub(crate) plain_transport: PlainTransport,
    pub(crate) pipeline: PipelineHandle,
    pub(crate) poller: PollerHandle,
    pub(crate) close_watcher: JoinHandle<()>,
}

impl Session {
    /// Releases poller, subprocess, and SFU resources in reverse of
    /// acquisition order. Each release is independent: a failure in one
    /// never prevents the others from running.
    pub(crate) async fn teardown(mut self) {
        self.state = SessionState::Stopping;
        tracing::info!(
            producer = %self.producer_id, room = %self.room_id, peer = %self.peer_id,
            from = "Running", to = "Stopping", "egress session state transition"
        );

        self.close_watcher.abort();

        auricle_pipeline::poller::stop(self.poller).await;

        // Signal-only, no wait — matches the "terminate asynchronously"
        // requirement so teardown doesn't block on a slow subprocess exit.
        auricle_pipeline::pipeline::terminate(self.pipeline);

        self.plain_transport.close().await;

        self.state = SessionState::Stopped;
        tracing::info!(
            producer = %self.producer_id, room = %self.room_id, peer = %self.peer_id,
            from = "Stopping", to = "Stopped", "egress session state transition"
        );
    }
}
