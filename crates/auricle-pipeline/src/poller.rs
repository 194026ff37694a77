//! Watches the spool directory for finalized WAV segments.
//!
//! The pipeline writes segments atomically from its own perspective, but the
//! poller can still observe a file mid-flush. The stability gate (poll size
//! until it stops changing and clears a minimum floor) exists to avoid
//! forwarding a truncated WAV.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use tokio::fs;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration};

const MIN_STABLE_BYTES: u64 = 4096;
const STABILITY_SAMPLE_MS: u64 = 120;
const STABILITY_MAX_WAIT_MS: u64 = 1200;

pub type OnSegment = Arc<dyn Fn(PathBuf) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct PollerHandle {
    task: JoinHandle<()>,
}

/// Starts the interval-driven scan. Every tick, lists `spool_dir`, filters by
/// `prefix`/`.wav`, sorts lexicographically, and for each name not already
/// seen: waits for size stability, marks it seen, invokes `on_segment`, then
/// unlinks it. Filesystem errors inside the loop are logged and swallowed.
pub fn start(spool_dir: PathBuf, prefix: String, poll_interval_ms: u64, on_segment: OnSegment) -> PollerHandle {
    let task = tokio::spawn(async move {
        let mut seen: HashSet<String> = HashSet::new();
        let mut ticker = interval(Duration::from_millis(poll_interval_ms.max(1)));

        loop {
            ticker.tick().await;

            let mut entries = match fs::read_dir(&spool_dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    tracing::warn!(error = %err, dir = %spool_dir.display(), "failed to list spool directory");
                    continue;
                }
            };

            let mut candidates = Vec::new();
            loop {
                match entries.next_entry().await {
                    Ok(Some(entry)) => {
                        let name = entry.file_name().to_string_lossy().into_owned();
                        if name.starts_with(&prefix) && name.ends_with(".wav") && !seen.contains(&name) {
                            candidates.push(name);
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to read spool directory entry");
                        break;
                    }
                }
            }
            candidates.sort();

            for name in candidates {
                let path = spool_dir.join(&name);
                if !wait_for_stability(&path).await {
                    // Still growing or vanished mid-check; revisit next tick.
                    continue;
                }

                seen.insert(name);
                (on_segment)(path.clone()).await;

                if let Err(err) = fs::remove_file(&path).await {
                    tracing::warn!(error = %err, path = %path.display(), "failed to remove spool segment");
                }
            }
        }
    });

    PollerHandle { task }
}

/// Cancels the poll timer. Synchronous from the caller's point of view: by
/// the time this returns, no further `on_segment` invocation is in flight.
pub async fn stop(handle: PollerHandle) {
    handle.task.abort();
    let _ = handle.task.await;
}

async fn wait_for_stability(path: &Path) -> bool {
    let samples = STABILITY_MAX_WAIT_MS / STABILITY_SAMPLE_MS;

    let mut last_size = match fs::metadata(path).await {
        Ok(meta) => meta.len(),
        Err(_) => return false,
    };

    for _ in 0..samples {
        sleep(Duration::from_millis(STABILITY_SAMPLE_MS)).await;
        let size = match fs::metadata(path).await {
            Ok(meta) => meta.len(),
            Err(_) => return false,
        };
        if size == last_size && size >= MIN_STABLE_BYTES {
            return true;
        }
        last_size = size;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    fn write_fixed_file(path: &Path, size: usize) {
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&vec![0u8; size]).unwrap();
    }

    #[tokio::test]
    async fn forwards_each_stable_segment_exactly_once_and_deletes_it() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = "room_1_prod_p_".to_string();
        let path = dir.path().join(format!("{prefix}00000.wav"));
        write_fixed_file(&path, 8192);

        let seen_count = Arc::new(AtomicUsize::new(0));
        let seen_count_cb = seen_count.clone();
        let on_segment: OnSegment = Arc::new(move |_path| {
            let counter = seen_count_cb.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handle = start(dir.path().to_path_buf(), prefix, 50, on_segment);

        timeout(Duration::from_secs(3), async {
            loop {
                if !path.exists() && seen_count.load(Ordering::SeqCst) == 1 {
                    break;
                }
                sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("segment should be forwarded and removed within timeout");

        stop(handle).await;
        assert_eq!(seen_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ignores_files_below_the_size_floor() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = "room_1_prod_p_".to_string();
        let path = dir.path().join(format!("{prefix}00000.wav"));
        write_fixed_file(&path, 10);

        let seen_count = Arc::new(AtomicUsize::new(0));
        let seen_count_cb = seen_count.clone();
        let on_segment: OnSegment = Arc::new(move |_path| {
            let counter = seen_count_cb.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });

        let handle = start(dir.path().to_path_buf(), prefix, 50, on_segment);
        sleep(Duration::from_millis(500)).await;
        stop(handle).await;

        assert_eq!(seen_count.load(Ordering::SeqCst), 0);
        assert!(path.exists(), "undersized file should not be consumed");
    }
}
