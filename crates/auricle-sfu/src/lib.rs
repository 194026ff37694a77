pub mod capabilities;
pub mod error;
pub mod plain_transport;
pub mod producer_consumer;
pub mod router;
pub mod rtp;
pub mod transport;

pub use capabilities::{CodecCapability, RouterRtpCapabilities};
pub use error::SfuError;
pub use plain_transport::PlainTransport;
pub use producer_consumer::{Consumer, Producer};
pub use router::{Router, RouterConfig};
pub use transport::WebRtcTransport;
