//! `POST /upload-audio`: the compatibility path for clients that don't
//! speak the signaling protocol. Stages the upload to a temp file, forwards
//! it exactly like an egress segment would be, and deletes the temp file
//! whether the forward succeeded or not.
//!
//! Standard multipart staging, narrowed to this crate's single required
//! field.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::Json;
use serde_json::Value;

use auricle_common::{AuricleError, AuricleResult};
use auricle_forward::{AudioSource, ForwardError, ForwardFields};

use crate::state::GatewayState;

pub async fn upload_audio(State(state): State<Arc<GatewayState>>, mut multipart: Multipart) -> AuricleResult<Json<Value>> {
    let mut audio_bytes: Option<Vec<u8>> = None;
    let mut room_id: Option<String> = None;
    let mut seq: Option<String> = None;
    let mut timestamp: Option<String> = None;
    let mut client_id: Option<String> = None;
    let mut context_hint: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AuricleError::Validation { message: format!("multipart error: {e}") })?
    {
        match field.name() {
            Some("audio") => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AuricleError::Validation { message: format!("failed to read audio: {e}") })?;
                audio_bytes = Some(bytes.to_vec());
            }
            Some("roomId") => room_id = Some(field.text().await.unwrap_or_default()),
            Some("seq") => seq = Some(field.text().await.unwrap_or_default()),
            Some("timestamp") => timestamp = Some(field.text().await.unwrap_or_default()),
            Some("clientId") => client_id = Some(field.text().await.unwrap_or_default()),
            Some("context_hint") => context_hint = Some(field.text().await.unwrap_or_default()),
            _ => {}
        }
    }

    let audio_bytes = audio_bytes.ok_or(AuricleError::NoAudio)?;
    let room_id = room_id.filter(|s| !s.is_empty()).unwrap_or_else(|| "global".to_string());

    let tmp = tempfile::Builder::new()
        .prefix("upload-audio-")
        .suffix(".wav")
        .tempfile()
        .map_err(AuricleError::Io)?;
    tokio::fs::write(tmp.path(), &audio_bytes).await.map_err(AuricleError::Io)?;
    let tmp_path = tmp.path().to_path_buf();

    let fields = ForwardFields {
        room_id: room_id.clone(),
        seq: seq.unwrap_or_default(),
        timestamp: timestamp.unwrap_or_default(),
        client_id,
        context_hint,
    };

    let result = state
        .forwarder
        .forward_and_broadcast(AudioSource::File(tmp_path), fields, &room_id, state.registry.as_ref())
        .await;

    let _ = tmp.close();

    result.map(|verdict| Json(verdict.into_json())).map_err(forward_error_to_auricle)
}

fn forward_error_to_auricle(err: ForwardError) -> AuricleError {
    match err {
        ForwardError::Io(io) => AuricleError::Io(io),
        ForwardError::Request(message) => AuricleError::Forward { status: None, body: message },
        ForwardError::Upstream { status, body } => AuricleError::Forward { status: Some(status), body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_forward_error_carries_status_and_body_through() {
        let mapped = forward_error_to_auricle(ForwardError::Upstream { status: 502, body: "bad gateway".into() });

        match mapped {
            AuricleError::Forward { status, body } => {
                assert_eq!(status, Some(502));
                assert_eq!(body, "bad gateway");
            }
            other => panic!("expected Forward, got {other:?}"),
        }
        assert_eq!(forward_error_to_auricle(ForwardError::Upstream { status: 502, body: "x".into() }).error_code(), "forward_failed");
    }

    #[test]
    fn transport_forward_error_carries_no_status() {
        let mapped = forward_error_to_auricle(ForwardError::Request("connection refused".into()));

        match mapped {
            AuricleError::Forward { status, .. } => assert_eq!(status, None),
            other => panic!("expected Forward, got {other:?}"),
        }
    }
}
