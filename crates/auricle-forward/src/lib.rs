pub mod forwarder;
pub mod verdict;

pub use forwarder::{AudioSource, Broadcast, ForwardError, ForwardFields, Forwarder};
pub use verdict::Verdict;
