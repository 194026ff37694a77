//! Environment-driven configuration, loaded once at startup.

use std::sync::OnceLock;

use serde::Deserialize;

static CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Returns the global config.
///
/// # Panics
/// Panics if `init()` has not yet been called.
pub fn get() -> &'static AppConfig {
    CONFIG.get().expect("config not initialized, call init() first")
}

/// Loads `.env` (if present) and the process environment into the global config.
pub fn init() -> anyhow::Result<&'static AppConfig> {
    let _ = dotenvy::dotenv();

    let raw: RawConfig = config::Config::builder()
        .set_default("port", 3000)?
        .set_default("python_url", "http://localhost:8000/process")?
        .set_default("python_timeout_ms", 120_000)?
        .set_default("gst_bin", "gst-launch-1.0")?
        .set_default("egress_chunk_seconds", 5)?
        .set_default("egress_dir", std::env::temp_dir().to_string_lossy().to_string())?
        .set_default("auto_egress", false)?
        .set_default("watch_poll_ms", 250)?
        .set_default("gst_jitter_latency_ms", 50)?
        .set_default("max_egress_port_retries", 10)?
        .set_default("gst_startup_grace_ms", 400)?
        .set_default("rtc_min_port", 20000)?
        .set_default("rtc_max_port", 30000)?
        .set_default("announced_ip", "127.0.0.1")?
        .add_source(config::Environment::default())
        .build()?
        .try_deserialize()?;

    let cfg = AppConfig {
        server: ServerConfig { port: raw.port },
        egress: EgressConfig {
            python_url: raw.python_url,
            python_timeout_ms: raw.python_timeout_ms,
            gst_bin: raw.gst_bin,
            chunk_seconds: raw.egress_chunk_seconds,
            spool_dir: raw.egress_dir.into(),
            auto_egress: raw.auto_egress,
            watch_poll_ms: raw.watch_poll_ms,
            jitter_latency_ms: raw.gst_jitter_latency_ms,
            max_port_retries: raw.max_egress_port_retries,
            startup_grace_ms: raw.gst_startup_grace_ms,
        },
        sfu: SfuConfig {
            rtc_min_port: raw.rtc_min_port,
            rtc_max_port: raw.rtc_max_port,
            announced_ip: raw.announced_ip,
        },
    };

    Ok(CONFIG.get_or_init(|| cfg))
}

/// Flat shape matching the recognized environment keys, before sectioning.
#[derive(Debug, Deserialize)]
struct RawConfig {
    port: u16,
    python_url: String,
    python_timeout_ms: u64,
    gst_bin: String,
    egress_chunk_seconds: u64,
    egress_dir: String,
    auto_egress: bool,
    watch_poll_ms: u64,
    gst_jitter_latency_ms: u64,
    max_egress_port_retries: u32,
    gst_startup_grace_ms: u64,
    rtc_min_port: u16,
    rtc_max_port: u16,
    announced_ip: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub egress: EgressConfig,
    pub sfu: SfuConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct EgressConfig {
    pub python_url: String,
    pub python_timeout_ms: u64,
    pub gst_bin: String,
    pub chunk_seconds: u64,
    pub spool_dir: std::path::PathBuf,
    pub auto_egress: bool,
    pub watch_poll_ms: u64,
    pub jitter_latency_ms: u64,
    pub max_port_retries: u32,
    pub startup_grace_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SfuConfig {
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
    pub announced_ip: String,
}
