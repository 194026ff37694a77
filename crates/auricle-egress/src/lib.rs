pub mod descriptor;
pub mod error;
mod session;
pub mod state;
pub mod supervisor;

pub use descriptor::{EgressDescriptor, StopOutcome};
pub use error::EgressError;
pub use state::SessionState;
pub use supervisor::EgressSupervisor;
