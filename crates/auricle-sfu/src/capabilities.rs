//! Router RTP capability descriptor.
//!
//! Audio-only, single Opus entry — this system never negotiates video.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct CodecCapability {
    pub kind: &'static str,
    #[serde(rename = "mimeType")]
    pub mime_type: &'static str,
    #[serde(rename = "clockRate")]
    pub clock_rate: u32,
    pub channels: u8,
    #[serde(rename = "preferredPayloadType")]
    pub preferred_payload_type: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct RouterRtpCapabilities {
    pub codecs: Vec<CodecCapability>,
}

impl RouterRtpCapabilities {
    pub fn opus_48k_stereo() -> Self {
        Self {
            codecs: vec![CodecCapability {
                kind: "audio",
                mime_type: "audio/opus",
                clock_rate: 48_000,
                channels: 2,
                preferred_payload_type: 111,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_exactly_one_opus_codec() {
        let caps = RouterRtpCapabilities::opus_48k_stereo();
        assert_eq!(caps.codecs.len(), 1);
        assert_eq!(caps.codecs[0].mime_type, "audio/opus");
        assert_eq!(caps.codecs[0].clock_rate, 48_000);
        assert_eq!(caps.codecs[0].channels, 2);
    }
}
