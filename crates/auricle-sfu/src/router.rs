//! Router: the entry point to the SFU surface. Owns the RTP capability
//! descriptor and mints transports.

use crate::capabilities::RouterRtpCapabilities;
use crate::error::SfuError;
use crate::plain_transport::PlainTransport;
use crate::producer_consumer::Consumer;
use crate::transport::WebRtcTransport;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub announced_ip: String,
}

#[derive(Clone)]
pub struct Router {
    config: RouterConfig,
}

impl Router {
    pub fn new(config: RouterConfig) -> Self {
        Self { config }
    }

    pub fn rtp_capabilities(&self) -> RouterRtpCapabilities {
        RouterRtpCapabilities::opus_48k_stereo()
    }

    pub fn create_webrtc_transport(&self) -> Result<WebRtcTransport, SfuError> {
        WebRtcTransport::create(&self.config.announced_ip)
    }

    pub async fn create_plain_transport(&self, rtp_port: u16, consumer: Consumer) -> std::io::Result<PlainTransport> {
        PlainTransport::connect(rtp_port, consumer).await
    }

    pub fn port_range(&self) -> (u16, u16) {
        (self.config.rtc_min_port, self.config.rtc_max_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_the_configured_port_range() {
        let router = Router::new(RouterConfig {
            rtc_min_port: 20000,
            rtc_max_port: 30000,
            announced_ip: "127.0.0.1".to_string(),
        });
        assert_eq!(router.port_range(), (20000, 30000));
    }

    #[test]
    fn rtp_capabilities_advertise_opus() {
        let router = Router::new(RouterConfig {
            rtc_min_port: 20000,
            rtc_max_port: 30000,
            announced_ip: "127.0.0.1".to_string(),
        });
        assert_eq!(router.rtp_capabilities().codecs[0].mime_type, "audio/opus");
    }
}
