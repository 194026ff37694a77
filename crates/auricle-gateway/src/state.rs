use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use auricle_egress::EgressSupervisor;
use auricle_forward::Forwarder;
use auricle_rooms::Registry;
use auricle_sfu::{Producer, Router, WebRtcTransport};

/// Everything a connected peer owns: every transport it has created, keyed
/// by transport id (a peer may open more than one, e.g. separate send/recv
/// transports), and the producers it has created.
#[derive(Default)]
pub(crate) struct PeerRecord {
    pub role: Option<String>,
    pub transports: HashMap<String, WebRtcTransport>,
    pub producers: Vec<String>,
}

pub struct GatewayState {
    pub(crate) router: Router,
    pub registry: Arc<Registry>,
    pub(crate) egress: Arc<EgressSupervisor>,
    pub(crate) forwarder: Arc<Forwarder>,
    pub(crate) peers: RwLock<HashMap<String, PeerRecord>>,
    pub(crate) producers: RwLock<HashMap<String, Producer>>,
}

impl GatewayState {
    pub fn new(router: Router, registry: Arc<Registry>, egress: Arc<EgressSupervisor>, forwarder: Arc<Forwarder>) -> Arc<Self> {
        Arc::new(Self {
            router,
            registry,
            egress,
            forwarder,
            peers: RwLock::new(HashMap::new()),
            producers: RwLock::new(HashMap::new()),
        })
    }
}
