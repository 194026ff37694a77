//! Bootstrap binary: environment -> typed config, SFU router, and the single
//! combined HTTP+signaling listener.
//!
//! Config init, tracing init, construct shared state, serve — one `PORT`
//! listener carrying both signaling and the compatibility upload path on a
//! single `axum::Router`.

use std::net::SocketAddr;

use auricle_egress::EgressSupervisor;
use auricle_forward::Forwarder;
use auricle_gateway::GatewayState;
use auricle_rooms::Registry;
use auricle_sfu::{Router, RouterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = auricle_common::config::init()?;
    auricle_common::logging::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting auricle-server");

    let router = Router::new(RouterConfig {
        rtc_min_port: config.sfu.rtc_min_port,
        rtc_max_port: config.sfu.rtc_max_port,
        announced_ip: config.sfu.announced_ip.clone(),
    });

    let registry = Registry::new();
    let forwarder = std::sync::Arc::new(Forwarder::new(config.egress.python_url.clone(), config.egress.python_timeout_ms));
    let egress = EgressSupervisor::new(router.clone(), forwarder.clone(), registry.clone());

    let state = GatewayState::new(router, registry, egress, forwarder);
    let app = auricle_gateway::build_router(state, config.egress.python_timeout_ms);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!(%addr, "listening for signaling and HTTP traffic");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
