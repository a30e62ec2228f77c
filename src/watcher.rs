//! Background change watcher: polling loop, auto-save bodies, change log
//!
//! The watcher scans the tree at a fixed interval, diffs each scan against
//! the previous one and records every delta. Bodies of created and modified
//! files are saved into the auto-save area before the cycle's
//! [`ChangeRecord`] batch is written to `changes/`, so a record never
//! references a body that was not saved.
//!
//! Two stop channels exist: an in-process atomic flag set by [`ChangeWatcher::stop`],
//! and a `watcher/stop` marker file written by [`ChangeWatcher::request_stop`]
//! from another process. Either ends the loop at the next check.

use crate::error::{Result, RplError};
use crate::rpl::Rpl;
use crate::types::{ChangeKind, ChangeRecord, Manifest, WatcherState};
use crate::utils;
use chrono::Utc;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default polling interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Slice the interval sleep so stop requests are honoured promptly
const STOP_POLL: Duration = Duration::from_millis(100);

/// Polling watcher recording file changes as they happen
pub struct ChangeWatcher {
    rpl: Arc<Rpl>,
    interval: Duration,
    stop_flag: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Create a watcher for the given project with the given interval
    pub fn new(rpl: Arc<Rpl>, interval: Duration) -> Self {
        ChangeWatcher {
            rpl,
            interval,
            stop_flag: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Start watching: scan a baseline, persist state, spawn the loop
    ///
    /// Fails with [`RplError::WatcherAlreadyRunning`] if this instance is
    /// running or another process has registered a watcher for the project.
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(RplError::WatcherAlreadyRunning(std::process::id()));
        }
        let watcher_dir = self.rpl.meta_dir().join("watcher");
        let state_path = watcher_dir.join("state.json");
        if state_path.exists() {
            let data = fs::read(&state_path)?;
            let state: WatcherState = serde_json::from_slice(&data)
                .map_err(|e| RplError::corrupt(format!("watcher/state.json: {}", e)))?;
            return Err(RplError::WatcherAlreadyRunning(state.pid));
        }

        // Clear any stale marker from a previous run
        let _ = fs::remove_file(watcher_dir.join("stop"));

        let baseline = self.rpl.scanner().scan()?;
        info!(
            "watcher starting with {} baseline files, interval {:?}",
            baseline.file_count, self.interval
        );

        let state = WatcherState {
            pid: std::process::id(),
            started_at: Utc::now(),
            interval_ms: self.interval.as_millis() as u64,
        };
        utils::atomic_write(&state_path, &serde_json::to_vec_pretty(&state)?)?;

        self.stop_flag.store(false, Ordering::SeqCst);
        let rpl = Arc::clone(&self.rpl);
        let stop_flag = Arc::clone(&self.stop_flag);
        let interval = self.interval;

        self.handle = Some(thread::spawn(move || {
            run_loop(rpl, baseline, interval, stop_flag);
        }));
        Ok(())
    }

    /// Whether the loop thread is running
    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Stop the watcher and wait for the loop to finish
    ///
    /// When this returns, the final cycle has fully completed; no change
    /// record is left half-written.
    pub fn stop(&mut self) -> Result<()> {
        let handle = self.handle.take().ok_or(RplError::WatcherNotRunning)?;
        self.stop_flag.store(true, Ordering::SeqCst);
        handle
            .join()
            .map_err(|_| RplError::internal("watcher thread panicked".to_string()))?;
        info!("watcher stopped");
        Ok(())
    }

    /// Signal a watcher running in another process to stop
    ///
    /// Writes the stop marker the loop checks each cycle. Fails with
    /// [`RplError::WatcherNotRunning`] if no watcher state is registered.
    pub fn request_stop(meta_dir: &Path) -> Result<u32> {
        let watcher_dir = meta_dir.join("watcher");
        let state_path = watcher_dir.join("state.json");
        if !state_path.exists() {
            return Err(RplError::WatcherNotRunning);
        }
        let data = fs::read(&state_path)?;
        let state: WatcherState = serde_json::from_slice(&data)
            .map_err(|e| RplError::corrupt(format!("watcher/state.json: {}", e)))?;

        utils::atomic_write(&watcher_dir.join("stop"), b"")?;
        info!("stop requested for watcher pid {}", state.pid);
        Ok(state.pid)
    }

    /// Remove persisted watcher state and any stop marker
    ///
    /// For cleaning up after a watcher process that died without its loop
    /// running cleanup.
    pub fn clear_state(meta_dir: &Path) -> Result<()> {
        let watcher_dir = meta_dir.join("watcher");
        let _ = fs::remove_file(watcher_dir.join("state.json"));
        let _ = fs::remove_file(watcher_dir.join("stop"));
        Ok(())
    }

    /// Read the persisted state of a running watcher, if any
    pub fn status(meta_dir: &Path) -> Result<Option<WatcherState>> {
        let state_path = meta_dir.join("watcher").join("state.json");
        if !state_path.exists() {
            return Ok(None);
        }
        let data = fs::read(&state_path)?;
        let state = serde_json::from_slice(&data)
            .map_err(|e| RplError::corrupt(format!("watcher/state.json: {}", e)))?;
        Ok(Some(state))
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

fn run_loop(rpl: Arc<Rpl>, mut baseline: Manifest, interval: Duration, stop_flag: Arc<AtomicBool>) {
    let watcher_dir = rpl.meta_dir().join("watcher");
    let stop_marker = watcher_dir.join("stop");
    let mut cycle: u64 = 0;

    loop {
        if sleep_until_stop(interval, &stop_flag, &stop_marker) {
            break;
        }

        let current = match rpl.scanner().scan() {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!("scan failed, skipping cycle: {}", e);
                continue;
            }
        };

        let deltas = crate::scanner::diff_manifests(&baseline, &current);
        if deltas.is_empty() {
            baseline = current;
            continue;
        }

        cycle += 1;
        match record_cycle(&rpl, &deltas, cycle) {
            Ok(()) => baseline = current,
            // Keep the old baseline; the next cycle re-diffs these deltas
            Err(e) => warn!("failed to record change cycle, will retry: {}", e),
        }
    }

    // Final drain: changes made before the stop request still get recorded
    if let Ok(current) = rpl.scanner().scan() {
        let deltas = crate::scanner::diff_manifests(&baseline, &current);
        if !deltas.is_empty() {
            cycle += 1;
            if let Err(e) = record_cycle(&rpl, &deltas, cycle) {
                warn!("failed to record final change cycle: {}", e);
            }
        }
    }

    // Loop owns state cleanup so both stop channels end identically
    let _ = fs::remove_file(watcher_dir.join("state.json"));
    let _ = fs::remove_file(&stop_marker);
    debug!("watcher loop exited after {} change cycles", cycle);
}

/// Sleep for the interval in short slices, returning true on a stop request
fn sleep_until_stop(interval: Duration, stop_flag: &AtomicBool, stop_marker: &Path) -> bool {
    let mut slept = Duration::ZERO;
    while slept < interval {
        if stop_flag.load(Ordering::SeqCst) || stop_marker.exists() {
            return true;
        }
        let slice = STOP_POLL.min(interval - slept);
        thread::sleep(slice);
        slept += slice;
    }
    stop_flag.load(Ordering::SeqCst) || stop_marker.exists()
}

/// Persist one cycle's deltas: auto-save bodies first, then the batch
fn record_cycle(rpl: &Rpl, deltas: &[crate::scanner::ManifestDelta], cycle: u64) -> Result<()> {
    let _guard = rpl.write_lock().lock();
    let mut records = Vec::with_capacity(deltas.len());

    for delta in deltas {
        let content_ref = match delta.kind {
            ChangeKind::Deleted => None,
            ChangeKind::Created | ChangeKind::Modified => {
                let absolute = rpl.root().join(&delta.entry.path);
                match fs::read(&absolute) {
                    Ok(data) => Some(rpl.store().put_auto_save(&delta.entry.path, &data)?),
                    Err(e) => {
                        warn!(
                            "could not save body of {}: {}",
                            delta.entry.path.display(),
                            e
                        );
                        None
                    }
                }
            }
        };

        debug!("{} {}", delta.kind, delta.entry.path.display());
        records.push(ChangeRecord {
            timestamp: Utc::now(),
            kind: delta.kind,
            path: delta.entry.path.clone(),
            content_ref,
            size: match delta.kind {
                ChangeKind::Deleted => 0,
                _ => delta.entry.size,
            },
        });
    }

    let stamp = format!("{}_{:06}", Utc::now().format("%Y%m%d%H%M%S"), cycle);
    let path = rpl
        .meta_dir()
        .join("changes")
        .join(format!("change_{}.json", stamp));
    utils::atomic_write(&path, &serde_json::to_vec_pretty(&records)?)?;

    info!("recorded {} changes in cycle {}", records.len(), cycle);
    Ok(())
}
