mod envelope;
mod router;
mod state;
mod upload;
mod ws;

pub use router::build_router;
pub use state::GatewayState;
