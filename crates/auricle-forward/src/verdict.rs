//! Analysis service response wrapper.
//!
//! The response schema is mostly owned by the downstream service, not by us;
//! unknown fields are passed through unchanged to `/upload-audio` callers, so
//! this wraps the raw JSON body rather than a strict struct.

#[derive(Debug, Clone)]
pub struct Verdict(pub serde_json::Value);

impl Verdict {
    pub fn chunk_id(&self) -> Option<&str> {
        self.0.get("chunk_id").and_then(|v| v.as_str())
    }

    pub fn gate(&self) -> Option<&serde_json::Value> {
        self.0.get("gate")
    }

    pub fn new_insights(&self) -> Vec<serde_json::Value> {
        self.0
            .get("new_insights")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default()
    }

    pub fn memory_state(&self) -> Option<&serde_json::Value> {
        self.0.get("memory_state")
    }

    /// `meta.received_at`, as the analysis service timestamped it.
    pub fn received_at(&self) -> Option<&serde_json::Value> {
        self.0.get("meta").and_then(|meta| meta.get("received_at"))
    }

    pub fn into_json(self) -> serde_json::Value {
        self.0
    }
}
