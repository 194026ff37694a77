//! POSTs audio to the downstream analysis service as multipart form data.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use serde_json::json;

use crate::verdict::Verdict;

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("failed to read audio source: {0}")]
    Io(#[from] std::io::Error),
    #[error("request to analysis service failed: {0}")]
    Request(String),
    #[error("analysis service returned an error")]
    Upstream { status: u16, body: String },
}

/// Either a file already on disk (the egress path) or an in-memory upload
/// body (the compatibility HTTP path).
pub enum AudioSource {
    File(PathBuf),
    Bytes {
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// Fields carried alongside the audio part in the multipart request.
pub struct ForwardFields {
    pub room_id: String,
    pub seq: String,
    pub timestamp: String,
    pub client_id: Option<String>,
    pub context_hint: Option<String>,
}

/// Implemented by whatever owns room fan-out (`auricle-rooms::Registry`), so
/// this crate never has to depend back on the rooms crate.
pub trait Broadcast {
    fn broadcast(&self, room_id: &str, payload: serde_json::Value) -> impl Future<Output = ()> + Send;
}

pub struct Forwarder {
    client: reqwest::Client,
    endpoint: String,
}

impl Forwarder {
    pub fn new(endpoint: impl Into<String>, timeout_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .expect("reqwest client builds from static configuration");

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// POSTs `audio` plus `fields` to the analysis endpoint and returns the
    /// parsed verdict. On a non-2xx response or transport failure, returns an
    /// error carrying the upstream status and a body snippet; never retried.
    pub async fn forward(&self, audio: AudioSource, fields: ForwardFields) -> Result<Verdict, ForwardError> {
        let audio_part = match audio {
            AudioSource::File(path) => {
                let bytes = tokio::fs::read(&path).await?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "segment.wav".to_string());
                Part::bytes(bytes)
                    .file_name(filename)
                    .mime_str("audio/wav")
                    .map_err(|e| ForwardError::Request(e.to_string()))?
            }
            AudioSource::Bytes { filename, content_type, bytes } => Part::bytes(bytes)
                .file_name(filename)
                .mime_str(&content_type)
                .map_err(|e| ForwardError::Request(e.to_string()))?,
        };

        let form = Form::new()
            .part("audio", audio_part)
            .text("roomId", fields.room_id)
            .text("seq", fields.seq)
            .text("timestamp", fields.timestamp)
            .text("clientId", fields.client_id.unwrap_or_default())
            .text("context_hint", fields.context_hint.unwrap_or_default());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(512).collect();
            tracing::warn!(status = status.as_u16(), body = %snippet, "analysis service returned an error");
            return Err(ForwardError::Upstream {
                status: status.as_u16(),
                body: snippet,
            });
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        Ok(Verdict(body))
    }

    /// Forwards, then broadcasts `"insights"` (non-empty `new_insights`) or
    /// `"gate"` to every peer in `room_id`.
    pub async fn forward_and_broadcast<B: Broadcast>(
        &self,
        audio: AudioSource,
        fields: ForwardFields,
        room_id: &str,
        registry: &B,
    ) -> Result<Verdict, ForwardError> {
        let verdict = self.forward(audio, fields).await?;
        let insights = verdict.new_insights();
        let received_at = verdict
            .received_at()
            .cloned()
            .unwrap_or_else(|| serde_json::Value::String(chrono::Utc::now().to_rfc3339()));

        let mut payload = json!({
            "type": if insights.is_empty() { "gate" } else { "insights" },
            "roomId": room_id,
            "chunk_id": verdict.chunk_id(),
            "gate": verdict.gate(),
            "memory_state": verdict.memory_state(),
            "received_at": received_at,
        });

        if !insights.is_empty() {
            payload["new_insights"] = serde_json::Value::Array(insights);
        }

        registry.broadcast(room_id, payload).await;
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingBroadcaster {
        events: Arc<Mutex<Vec<serde_json::Value>>>,
    }

    impl Broadcast for RecordingBroadcaster {
        async fn broadcast(&self, _room_id: &str, payload: serde_json::Value) {
            self.events.lock().unwrap().push(payload);
        }
    }

    #[tokio::test]
    async fn forward_fails_fast_on_upstream_error_without_retry() {
        // No listener on this port: connection refused surfaces as a transport error.
        let forwarder = Forwarder::new("http://127.0.0.1:1", 500);
        let err = forwarder
            .forward(
                AudioSource::Bytes {
                    filename: "a.wav".into(),
                    content_type: "audio/wav".into(),
                    bytes: vec![0u8; 16],
                },
                ForwardFields {
                    room_id: "room-1".into(),
                    seq: "1".into(),
                    timestamp: "0".into(),
                    client_id: None,
                    context_hint: None,
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Request(_)));
    }

    #[test]
    fn picks_insights_type_when_new_insights_present() {
        let verdict = Verdict(serde_json::json!({
            "chunk_id": "c1",
            "new_insights": [{"type": "insight", "text": "x"}],
        }));
        assert_eq!(verdict.new_insights().len(), 1);
    }

    #[test]
    fn reads_received_at_from_verdict_meta() {
        let verdict = Verdict(serde_json::json!({
            "chunk_id": "c1",
            "meta": {"received_at": "2024-01-01T00:00:00Z"},
        }));
        assert_eq!(verdict.received_at(), Some(&serde_json::json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn received_at_is_absent_when_verdict_has_no_meta() {
        let verdict = Verdict(serde_json::json!({"chunk_id": "c1"}));
        assert_eq!(verdict.received_at(), None);
    }

    #[test]
    fn picks_gate_type_when_new_insights_empty() {
        let verdict = Verdict(serde_json::json!({"chunk_id": "c1", "new_insights": []}));
        assert!(verdict.new_insights().is_empty());
    }
}
