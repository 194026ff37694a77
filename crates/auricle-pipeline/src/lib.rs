pub mod pipeline;
pub mod poller;
pub mod port;

pub use pipeline::{spawn, terminate, wait_healthy, PipelineConfig, PipelineError, PipelineHandle};
pub use poller::{OnSegment, PollerHandle};
pub use port::{allocate_udp_port, allocate_udp_port_pair};
