use serde::Serialize;

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, Serialize)]
pub struct EgressDescriptor {
    pub ok: bool,
    #[serde(rename = "producerId")]
    pub producer_id: String,
    #[serde(rename = "roomId")]
    pub room_id: String,
    #[serde(rename = "rtpPort")]
    pub rtp_port: u16,
    #[serde(rename = "rtcpPort")]
    pub rtcp_port: u16,
    #[serde(rename = "wavPrefix")]
    pub wav_prefix: String,
    #[serde(rename = "chunkSeconds")]
    pub chunk_seconds: u64,
    pub engine: String,
    #[serde(rename = "payloadType")]
    pub payload_type: u8,
    pub attempt: u32,
    #[serde(rename = "alreadyRunning", skip_serializing_if = "is_false")]
    pub already_running: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopOutcome {
    pub ok: bool,
    #[serde(rename = "producerId")]
    pub producer_id: String,
    #[serde(rename = "alreadyStopped", skip_serializing_if = "is_false")]
    pub already_stopped: bool,
}
