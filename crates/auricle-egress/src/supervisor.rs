//! Egress Supervisor: the per-publisher lifecycle that ties the SFU, the
//! transcoding subprocess, the segment poller, and the analysis forwarder
//! together. One session per producer.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use auricle_forward::{AudioSource, ForwardFields, Forwarder};
use auricle_pipeline::{OnSegment, PipelineConfig};
use auricle_rooms::Registry;
use auricle_sfu::{Producer, Router};

use crate::descriptor::{EgressDescriptor, StopOutcome};
use crate::error::EgressError;
use crate::session::Session;
use crate::state::SessionState;

pub struct EgressSupervisor {
    router: Router,
    forwarder: Arc<Forwarder>,
    registry: Arc<Registry>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl EgressSupervisor {
    pub fn new(router: Router, forwarder: Arc<Forwarder>, registry: Arc<Registry>) -> Arc<Self> {
        Arc::new(Self {
            router,
            forwarder,
            registry,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Idempotent: a producer that already has a running session gets back
    /// the existing descriptor with `already_running` set, no new resources
    /// touched. Otherwise provisions up to `max_port_retries` times, backing
    /// off port contention (another process racing the same ephemeral port)
    /// and walking away from a subprocess that dies in its startup grace
    /// window, retrying with a fresh port pair each time.
    pub async fn start_egress(
        self: &Arc<Self>,
        room_id: &str,
        peer_id: &str,
        producer: &Producer,
        role: Option<String>,
    ) -> Result<EgressDescriptor, EgressError> {
        if let Some(existing) = self.sessions.read().await.get(&producer.id) {
            return Ok(descriptor_from(existing, true));
        }

        let max_retries = auricle_common::config::get().egress.max_port_retries;
        let mut last_err: Option<EgressError> = None;

        tracing::info!(
            producer = %producer.id, room = room_id, peer = peer_id,
            from = "Idle", to = "Provisioning", "egress session state transition"
        );

        for attempt in 1..=max_retries {
            match self.try_start(room_id, peer_id, producer, role.clone(), attempt).await {
                Ok(session) => {
                    tracing::info!(
                        producer = %producer.id, room = room_id, peer = peer_id, attempt,
                        from = "Provisioning", to = "Running", "egress session state transition"
                    );
                    let descriptor = descriptor_from(&session, false);
                    self.sessions.write().await.insert(producer.id.clone(), session);
                    return Ok(descriptor);
                }
                Err(err) => {
                    tracing::warn!(producer = %producer.id, attempt, error = %err, "egress start attempt failed, retrying");
                    last_err = Some(err);
                }
            }
        }

        Err(EgressError::RetriesExhausted {
            attempts: max_retries,
            last: last_err.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    /// Terminates the pipeline subprocess (signal only), cancels the segment
    /// poller synchronously, and releases the plain transport. Idempotent:
    /// stopping a producer with no active session is a no-op success.
    pub async fn stop_egress(self: &Arc<Self>, producer_id: &str) -> StopOutcome {
        match self.sessions.write().await.remove(producer_id) {
            Some(session) => {
                session.teardown().await;
                StopOutcome {
                    ok: true,
                    producer_id: producer_id.to_string(),
                    already_stopped: false,
                }
            }
            None => StopOutcome {
                ok: true,
                producer_id: producer_id.to_string(),
                already_stopped: true,
            },
        }
    }

    async fn try_start(
        self: &Arc<Self>,
        room_id: &str,
        peer_id: &str,
        producer: &Producer,
        role: Option<String>,
        attempt: u32,
    ) -> Result<Session, EgressError> {
        let cfg = auricle_common::config::get();

        let (rtp_port, rtcp_port) = auricle_pipeline::allocate_udp_port_pair("127.0.0.1")?;

        let consumer = producer.consume();
        let plain_transport = self.router.create_plain_transport(rtp_port, consumer).await?;

        let prefix = format!("room_{room_id}_prod_{}_", producer.id);
        let pattern = cfg.egress.spool_dir.join(format!("{prefix}%05d.wav"));
        let chunk_ns = cfg.egress.chunk_seconds.saturating_mul(1_000_000_000);

        let pipeline_cfg = PipelineConfig {
            bin: &cfg.egress.gst_bin,
            rtp_port,
            payload_type: producer.payload_type,
            clock_rate: producer.clock_rate,
            channels: producer.channels,
            jitter_latency_ms: cfg.egress.jitter_latency_ms,
            chunk_ns,
            output_pattern: &pattern,
        };

        let mut pipeline = match auricle_pipeline::spawn(&pipeline_cfg, &producer.id) {
            Ok(handle) => handle,
            Err(err) => {
                plain_transport.close().await;
                return Err(err.into());
            }
        };

        if let Err(err) = auricle_pipeline::wait_healthy(&mut pipeline, cfg.egress.startup_grace_ms).await {
            auricle_pipeline::terminate(pipeline);
            plain_transport.close().await;
            return Err(err.into());
        }

        let poller = auricle_pipeline::poller::start(
            cfg.egress.spool_dir.clone(),
            prefix.clone(),
            cfg.egress.watch_poll_ms,
            self.make_on_segment(room_id, peer_id, &producer.id, role.clone()),
        );

        let mut close_consumer = producer.consume();
        let supervisor = Arc::clone(self);
        let producer_id_for_watch = producer.id.clone();
        let close_watcher = tokio::spawn(async move {
            while close_consumer.recv().await.is_some() {}
            supervisor.stop_egress(&producer_id_for_watch).await;
        });

        Ok(Session {
            producer_id: producer.id.clone(),
            room_id: room_id.to_string(),
            peer_id: peer_id.to_string(),
            role,
            rtp_port,
            rtcp_port,
            wav_prefix: prefix,
            payload_type: producer.payload_type,
            attempt,
            state: SessionState::Running,
            plain_transport,
            pipeline,
            poller,
            close_watcher,
        })
    }

    /// Builds the poller's segment callback: forward the finished WAV to the
    /// analysis service, tagging it with a context hint identifying the
    /// producer and role that generated it, then broadcast the verdict to
    /// the room.
    fn make_on_segment(&self, room_id: &str, peer_id: &str, producer_id: &str, role: Option<String>) -> OnSegment {
        let forwarder = self.forwarder.clone();
        let registry = self.registry.clone();
        let room_id = room_id.to_string();
        let peer_id = peer_id.to_string();
        let producer_id = producer_id.to_string();

        Arc::new(move |path| {
            let forwarder = forwarder.clone();
            let registry = registry.clone();
            let room_id = room_id.clone();
            let peer_id = peer_id.clone();
            let producer_id = producer_id.clone();
            let role = role.clone();

            Box::pin(async move {
                let context_hint = format!(
                    "egress peer={peer_id} producer={producer_id} role={role}",
                    role = role.as_deref().unwrap_or("unknown"),
                );
                let fields = ForwardFields {
                    room_id: room_id.clone(),
                    seq: chrono::Utc::now().timestamp_millis().to_string(),
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    client_id: Some(peer_id),
                    context_hint: Some(context_hint),
                };

                if let Err(err) = forwarder
                    .forward_and_broadcast(AudioSource::File(path.clone()), fields, &room_id, registry.as_ref())
                    .await
                {
                    tracing::warn!(producer = %producer_id, path = %path.display(), error = %err, "failed to forward egress segment");
                }
            })
        })
    }
}

fn descriptor_from(session: &Session, already_running: bool) -> EgressDescriptor {
    let cfg = auricle_common::config::get();
    EgressDescriptor {
        ok: true,
        producer_id: session.producer_id.clone(),
        room_id: session.room_id.clone(),
        rtp_port: session.rtp_port,
        rtcp_port: session.rtcp_port,
        wav_prefix: session.wav_prefix.clone(),
        chunk_seconds: cfg.egress.chunk_seconds,
        engine: "gstreamer".to_string(),
        payload_type: session.payload_type,
        attempt: session.attempt,
        already_running,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auricle_sfu::RouterConfig;

    fn supervisor() -> Arc<EgressSupervisor> {
        let router = Router::new(RouterConfig {
            rtc_min_port: 20000,
            rtc_max_port: 30000,
            announced_ip: "127.0.0.1".to_string(),
        });
        let forwarder = Arc::new(Forwarder::new("http://127.0.0.1:1/process", 1000));
        let registry = Registry::new();
        EgressSupervisor::new(router, forwarder, registry)
    }

    #[tokio::test]
    async fn stop_egress_on_unknown_producer_reports_already_stopped() {
        let supervisor = supervisor();

        let outcome = supervisor.stop_egress("no-such-producer").await;

        assert!(outcome.ok);
        assert!(outcome.already_stopped);
    }

    #[tokio::test]
    async fn stop_egress_is_idempotent_across_repeated_calls() {
        let supervisor = supervisor();

        let first = supervisor.stop_egress("p-1").await;
        let second = supervisor.stop_egress("p-1").await;
        let third = supervisor.stop_egress("p-1").await;

        assert!(first.ok && first.already_stopped);
        assert!(second.ok && second.already_stopped);
        assert!(third.ok && third.already_stopped);
    }
}
