#[derive(Debug, thiserror::Error)]
pub enum SfuError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sdp negotiation error: {0}")]
    Sdp(String),
    #[error("transport has no negotiated audio media yet")]
    NoNegotiatedMedia,
    #[error("transport actor is no longer running")]
    TransportClosed,
}
