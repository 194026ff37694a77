use serde::Deserialize;
use serde_json::{json, Value};

/// Client→server message: `{action, data?, requestId?}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ClientMessage {
    pub action: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

pub(crate) fn reply_ok(request_id: Option<String>, data: Value) -> Value {
    json!({"requestId": request_id, "ok": true, "data": data})
}

pub(crate) fn reply_err(request_id: Option<String>, error: &str) -> Value {
    json!({"requestId": request_id, "ok": false, "error": error})
}
