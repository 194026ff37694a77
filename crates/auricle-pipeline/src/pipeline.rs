//! Supervises the external transcoding subprocess.
//!
//! The subprocess consumes RTP/Opus from a UDP port and emits numbered WAV
//! segments. It has no stdin/stdout protocol and no readiness signal of its
//! own; `wait_healthy` is a best-effort grace sleep, not a handshake.

use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::{sleep, Duration};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("failed to spawn pipeline process: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("pipeline process exited early during startup grace period")]
    ExitedEarly,
    #[error("io error waiting on pipeline process: {0}")]
    Io(#[from] std::io::Error),
}

/// Parameters needed to construct the fixed `gst-launch`-style argument vector.
pub struct PipelineConfig<'a> {
    pub bin: &'a str,
    pub rtp_port: u16,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub channels: u8,
    pub jitter_latency_ms: u64,
    pub chunk_ns: u64,
    pub output_pattern: &'a Path,
}

pub struct PipelineHandle {
    child: Child,
    producer_id: String,
}

/// Spawns the external transcoder with a fixed argument vector. Stderr is
/// piped and forwarded line-by-line to the tracing log, prefixed with the
/// producer id that owns this pipeline. No stdin/stdout is wired up.
pub fn spawn(cfg: &PipelineConfig<'_>, producer_id: &str) -> Result<PipelineHandle, PipelineError> {
    let pipeline_desc = format!(
        "udpsrc address=127.0.0.1 port={rtp_port} caps=application/x-rtp,media=audio,encoding-name=OPUS,payload={pt},clock-rate={cr},channels={ch} \
         ! rtpjitterbuffer latency={jitter} drop-on-latency=true \
         ! rtpopusdepay ! opusdec ! audioconvert ! audioresample \
         ! audio/x-raw,rate=16000,channels=1 \
         ! queue \
         ! splitmuxsink muxer=wavenc location={pattern} max-size-time={chunk_ns}",
        rtp_port = cfg.rtp_port,
        pt = cfg.payload_type,
        cr = cfg.clock_rate,
        ch = cfg.channels,
        jitter = cfg.jitter_latency_ms,
        pattern = cfg.output_pattern.display(),
        chunk_ns = cfg.chunk_ns,
    );

    tracing::debug!(producer = producer_id, bin = cfg.bin, "spawning pipeline: {pipeline_desc}");

    let mut child = Command::new(cfg.bin)
        .args(pipeline_desc.split_whitespace())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(PipelineError::Spawn)?;

    let stderr = child.stderr.take().expect("stderr was piped");
    let producer_for_task = producer_id.to_string();
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => tracing::debug!(producer = %producer_for_task, "{line}"),
                Ok(None) => break,
                Err(err) => {
                    tracing::warn!(producer = %producer_for_task, error = %err, "pipeline stderr read failed");
                    break;
                }
            }
        }
    });

    Ok(PipelineHandle {
        child,
        producer_id: producer_id.to_string(),
    })
}

/// Sleeps `grace_ms` then checks the process hasn't already exited. This is
/// the only startup signal available: the external tool has no readiness
/// protocol of its own.
pub async fn wait_healthy(handle: &mut PipelineHandle, grace_ms: u64) -> Result<(), PipelineError> {
    sleep(Duration::from_millis(grace_ms)).await;

    match handle.child.try_wait()? {
        Some(status) => {
            tracing::warn!(producer = %handle.producer_id, ?status, "pipeline exited within startup grace window");
            Err(PipelineError::ExitedEarly)
        }
        None => Ok(()),
    }
}

/// Sends an unconditional kill signal and returns immediately — signal only,
/// no wait, so a caller tearing down a session synchronously never blocks on
/// a subprocess that's slow to exit. Idempotent: a process already reaped is
/// treated as success, not an error. Reaping (to avoid a zombie) happens in a
/// detached background task with its own escalation to SIGKILL.
pub fn terminate(mut handle: PipelineHandle) {
    #[cfg(unix)]
    {
        if let Some(pid) = handle.child.id() {
            use nix::sys::signal::{self, Signal};
            use nix::unistd::Pid;

            if let Err(err) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                if err != nix::errno::Errno::ESRCH {
                    tracing::warn!(producer = %handle.producer_id, error = %err, "failed to signal pipeline process");
                }
            }
        }
    }

    tokio::spawn(async move {
        match tokio::time::timeout(Duration::from_secs(5), handle.child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = handle.child.kill().await;
                let _ = handle.child.wait().await;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn cfg(pattern: PathBuf) -> PipelineConfig<'static> {
        // Leaked is fine in tests; avoids lifetime gymnastics over a literal.
        let bin: &'static str = "sleep";
        PipelineConfig {
            bin,
            rtp_port: 40000,
            payload_type: 111,
            clock_rate: 48000,
            channels: 2,
            jitter_latency_ms: 50,
            chunk_ns: 5_000_000_000,
            output_pattern: Box::leak(pattern.into_boxed_path()),
        }
    }

    #[tokio::test]
    async fn wait_healthy_fails_when_process_exits_immediately() {
        let mut child = Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn true");
        let _ = child.stderr.take();
        let mut handle = PipelineHandle {
            child,
            producer_id: "p1".into(),
        };

        let result = wait_healthy(&mut handle, 50).await;
        assert!(matches!(result, Err(PipelineError::ExitedEarly)));
        terminate(handle);
    }

    #[tokio::test]
    async fn wait_healthy_succeeds_for_a_long_running_process() {
        let mut child = Command::new("sleep")
            .arg("5")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn sleep");
        let _ = child.stderr.take();
        let mut handle = PipelineHandle {
            child,
            producer_id: "p2".into(),
        };

        let result = wait_healthy(&mut handle, 50).await;
        assert!(result.is_ok());
        terminate(handle);
    }

    #[tokio::test]
    async fn terminate_is_safe_on_already_exited_process() {
        let mut child = Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .expect("spawn true");
        let _ = child.stderr.take();
        let _ = child.wait().await;
        let handle = PipelineHandle {
            child,
            producer_id: "p3".into(),
        };
        terminate(handle);
    }

    #[test]
    fn builds_expected_pipeline_description() {
        let c = cfg(PathBuf::from("/tmp/spool/room_1_prod_2_%05d.wav"));
        assert_eq!(c.payload_type, 111);
        assert_eq!(c.clock_rate, 48000);
    }
}
