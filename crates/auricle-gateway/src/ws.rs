//! Signaling endpoint: one long-lived WebSocket per peer carrying the
//! request/reply envelope plus server-initiated broadcast events.
//!
//! Split the socket, spawn a dedicated send task fed by a channel, run a
//! receive loop that dispatches on action name, always reply, clean up on
//! disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::envelope::{reply_err, reply_ok, ClientMessage};
use crate::state::{GatewayState, PeerRecord};

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<GatewayState>>) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: Arc<GatewayState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let peer_id = Uuid::new_v4().to_string();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<Value>();
    state.registry.register_peer(&peer_id, tx.clone()).await;
    state.peers.write().await.insert(peer_id.clone(), PeerRecord::default());

    let send_task = tokio::spawn(async move {
        while let Some(value) = rx.recv().await {
            if ws_sender.send(Message::Text(value.to_string().into())).await.is_err() {
                break;
            }
        }
    });

    let _ = tx.send(json!({"type": "welcome", "id": peer_id}));

    tracing::debug!(peer = %peer_id, "signaling connection established");

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let reply = match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(msg) => dispatch(&state, &peer_id, msg).await,
                    Err(err) => reply_err(None, &format!("invalid_message: {err}")),
                };
                if tx.send(reply).is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    cleanup(&state, &peer_id).await;
    send_task.abort();
    tracing::debug!(peer = %peer_id, "signaling connection closed");
}

/// Stops every egress session and closes every transport the peer owns,
/// leaves its room, and drops its registry record.
async fn cleanup(state: &Arc<GatewayState>, peer_id: &str) {
    if let Some(record) = state.peers.write().await.remove(peer_id) {
        for producer_id in &record.producers {
            state.egress.stop_egress(producer_id).await;
            state.producers.write().await.remove(producer_id);
        }
        for (_, transport) in record.transports {
            transport.close().await;
        }
    }
    state.registry.unregister_peer(peer_id).await;
}

async fn dispatch(state: &Arc<GatewayState>, peer_id: &str, msg: ClientMessage) -> Value {
    let request_id = msg.request_id;
    let data = msg.data;

    match msg.action.as_str() {
        "joinRoom" => match data.get("roomId").and_then(Value::as_str).filter(|s| !s.is_empty()) {
            Some(room_id) => {
                state.registry.join_room(peer_id, room_id).await;
                reply_ok(request_id, json!({"roomId": room_id}))
            }
            None => reply_err(request_id, "invalid_room_id"),
        },

        "setRole" => match data.get("role").and_then(Value::as_str) {
            Some(role) => {
                let role = role.to_string();
                state
                    .peers
                    .write()
                    .await
                    .entry(peer_id.to_string())
                    .or_default()
                    .role = Some(role.clone());
                reply_ok(request_id, json!({"role": role}))
            }
            None => reply_err(request_id, "invalid_role"),
        },

        "getRouterRtpCapabilities" => {
            let caps = state.router.rtp_capabilities();
            reply_ok(request_id, serde_json::to_value(caps).unwrap_or(Value::Null))
        }

        "createWebRtcTransport" => match state.router.create_webrtc_transport() {
            Ok(transport) => {
                let id = transport.id.clone();
                state
                    .peers
                    .write()
                    .await
                    .entry(peer_id.to_string())
                    .or_default()
                    .transports
                    .insert(id.clone(), transport);
                reply_ok(request_id, json!({"id": id}))
            }
            Err(err) => reply_err(request_id, &err.to_string()),
        },

        // str0m performs ICE and DTLS negotiation together inside the SDP
        // offer/answer exchange, so connectTransport carries the offer
        // directly and returns the answer rather than a separate
        // dtlsParameters handshake.
        "connectTransport" => {
            let transport_id = data.get("transportId").and_then(Value::as_str);
            let offer_sdp = data.get("offerSdp").and_then(Value::as_str);
            let (transport_id, offer_sdp) = match (transport_id, offer_sdp) {
                (Some(t), Some(o)) => (t, o.to_string()),
                _ => return reply_err(request_id, "missing_transport_id_or_offer_sdp"),
            };

            match find_peer_transport(state, peer_id, transport_id).await {
                Some(transport) => match transport.connect(offer_sdp).await {
                    Ok(answer_sdp) => reply_ok(request_id, json!({"answerSdp": answer_sdp})),
                    Err(err) => reply_err(request_id, &err.to_string()),
                },
                None => reply_err(request_id, "unknown_transport"),
            }
        }

        "produce" => {
            let transport_id = match data.get("transportId").and_then(Value::as_str) {
                Some(t) => t,
                None => return reply_err(request_id, "missing_transport_id"),
            };

            let transport = match find_peer_transport(state, peer_id, transport_id).await {
                Some(t) => t,
                None => return reply_err(request_id, "unknown_transport"),
            };

            match transport.produce().await {
                Ok(producer) => {
                    let producer_id = producer.id.clone();
                    state.producers.write().await.insert(producer_id.clone(), producer.clone());
                    if let Some(record) = state.peers.write().await.get_mut(peer_id) {
                        record.producers.push(producer_id.clone());
                    }

                    maybe_auto_egress(state, peer_id, &producer).await;

                    reply_ok(request_id, json!({"id": producer_id}))
                }
                Err(err) => reply_err(request_id, &err.to_string()),
            }
        }

        "startEgress" => {
            let producer_id = match data.get("producerId").and_then(Value::as_str) {
                Some(p) => p.to_string(),
                None => return reply_err(request_id, "missing_producer_id"),
            };

            let producer = state.producers.read().await.get(&producer_id).cloned();
            let producer = match producer {
                Some(p) => p,
                None => return reply_err(request_id, "unknown_producer"),
            };

            let room_id = current_room_or_global(state, peer_id).await;
            let role = state.peers.read().await.get(peer_id).and_then(|p| p.role.clone());

            match state.egress.start_egress(&room_id, peer_id, &producer, role).await {
                Ok(descriptor) => reply_ok(request_id, serde_json::to_value(descriptor).unwrap_or(Value::Null)),
                Err(err) => reply_err(request_id, &err.to_string()),
            }
        }

        "stopEgress" => match data.get("producerId").and_then(Value::as_str) {
            Some(producer_id) => {
                let outcome = state.egress.stop_egress(producer_id).await;
                reply_ok(request_id, serde_json::to_value(outcome).unwrap_or(Value::Null))
            }
            None => reply_err(request_id, "missing_producer_id"),
        },

        _ => reply_err(request_id, "unknown_action"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auricle_egress::EgressSupervisor;
    use auricle_forward::Forwarder;
    use auricle_rooms::Registry;
    use auricle_sfu::{Router, RouterConfig};

    fn test_state() -> Arc<GatewayState> {
        let router = Router::new(RouterConfig {
            rtc_min_port: 20000,
            rtc_max_port: 30000,
            announced_ip: "127.0.0.1".to_string(),
        });
        let registry = Registry::new();
        let forwarder = Arc::new(Forwarder::new("http://127.0.0.1:1/process", 1000));
        let egress = EgressSupervisor::new(router.clone(), forwarder.clone(), registry.clone());
        GatewayState::new(router, registry, egress, forwarder)
    }

    fn client_msg(action: &str, data: Value, request_id: Option<&str>) -> ClientMessage {
        ClientMessage {
            action: action.to_string(),
            data,
            request_id: request_id.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn empty_room_id_on_join_room_is_an_error() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("joinRoom", json!({"roomId": ""}), Some("r1"))).await;

        assert_eq!(reply["requestId"], "r1");
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"], "invalid_room_id");
    }

    #[tokio::test]
    async fn join_room_echoes_request_id_and_updates_membership() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("joinRoom", json!({"roomId": "room-1"}), Some("r2"))).await;

        assert_eq!(reply["requestId"], "r2");
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["data"]["roomId"], "room-1");
        assert_eq!(state.registry.current_room("peer-1").await.as_deref(), Some("room-1"));
    }

    #[tokio::test]
    async fn unknown_action_replies_with_unknown_action_error() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("doSomethingElse", json!({}), Some("r3"))).await;

        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"], "unknown_action");
        assert_eq!(reply["requestId"], "r3");
    }

    #[tokio::test]
    async fn requests_without_a_request_id_reply_with_null_request_id() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("joinRoom", json!({"roomId": "room-1"}), None)).await;

        assert!(reply["requestId"].is_null());
        assert_eq!(reply["ok"], true);
    }

    #[tokio::test]
    async fn set_role_stores_role_on_peer_record() {
        let state = test_state();
        state.peers.write().await.insert("peer-1".to_string(), PeerRecord::default());

        let reply = dispatch(&state, "peer-1", client_msg("setRole", json!({"role": "seller"}), Some("r4"))).await;

        assert_eq!(reply["data"]["role"], "seller");
        assert_eq!(state.peers.read().await.get("peer-1").unwrap().role.as_deref(), Some("seller"));
    }

    #[tokio::test]
    async fn stop_egress_on_unknown_producer_is_idempotent_success() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("stopEgress", json!({"producerId": "p-1"}), Some("r5"))).await;

        assert_eq!(reply["ok"], true);
        assert_eq!(reply["data"]["alreadyStopped"], true);
    }

    #[tokio::test]
    async fn start_egress_on_unknown_producer_is_an_error() {
        let state = test_state();
        let reply = dispatch(&state, "peer-1", client_msg("startEgress", json!({"producerId": "missing"}), Some("r6"))).await;

        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"], "unknown_producer");
    }

    #[tokio::test]
    async fn a_peer_can_hold_two_transports_at_once() {
        let state = test_state();

        let first = dispatch(&state, "peer-1", client_msg("createWebRtcTransport", json!({}), Some("t1"))).await;
        let second = dispatch(&state, "peer-1", client_msg("createWebRtcTransport", json!({}), Some("t2"))).await;

        let first_id = first["data"]["id"].as_str().unwrap().to_string();
        let second_id = second["data"]["id"].as_str().unwrap().to_string();
        assert_ne!(first_id, second_id);

        assert!(find_peer_transport(&state, "peer-1", &first_id).await.is_some());
        assert!(find_peer_transport(&state, "peer-1", &second_id).await.is_some());

        assert_eq!(state.peers.read().await.get("peer-1").unwrap().transports.len(), 2);
    }

    #[tokio::test]
    async fn cleanup_closes_every_transport_a_peer_owns() {
        let state = test_state();

        dispatch(&state, "peer-1", client_msg("createWebRtcTransport", json!({}), Some("t1"))).await;
        dispatch(&state, "peer-1", client_msg("createWebRtcTransport", json!({}), Some("t2"))).await;
        assert_eq!(state.peers.read().await.get("peer-1").unwrap().transports.len(), 2);

        cleanup(&state, "peer-1").await;

        assert!(state.peers.read().await.get("peer-1").is_none());
    }
}

async fn find_peer_transport(
    state: &Arc<GatewayState>,
    peer_id: &str,
    transport_id: &str,
) -> Option<auricle_sfu::WebRtcTransport> {
    state
        .peers
        .read()
        .await
        .get(peer_id)
        .and_then(|record| record.transports.get(transport_id))
        .cloned()
}

async fn current_room_or_global(state: &Arc<GatewayState>, peer_id: &str) -> String {
    state
        .registry
        .current_room(peer_id)
        .await
        .unwrap_or_else(|| "global".to_string())
}

/// When `AUTO_EGRESS` is set, starts an egress session for the freshly
/// created producer without making `produce`'s reply wait on it.
async fn maybe_auto_egress(state: &Arc<GatewayState>, peer_id: &str, producer: &auricle_sfu::Producer) {
    if !auricle_common::config::get().egress.auto_egress {
        return;
    }

    let room_id = current_room_or_global(state, peer_id).await;
    let role = state.peers.read().await.get(peer_id).and_then(|p| p.role.clone());
    let egress = state.egress.clone();
    let peer_id = peer_id.to_string();
    let producer = producer.clone();

    tokio::spawn(async move {
        if let Err(err) = egress.start_egress(&room_id, &peer_id, &producer, role).await {
            tracing::warn!(producer = %producer.id, error = %err, "auto egress start failed");
        }
    });
}
