pub mod registry;

pub use registry::{Registry, Sender};
