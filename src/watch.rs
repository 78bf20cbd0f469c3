//! File system watcher for dev mode.
//!
//! Monitors the source directory and the config file, and re-runs the whole
//! pipeline after changes settle.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      Event Loop                         │
//! │                                                         │
//! │  ┌──────────┐    ┌──────────┐    ┌───────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│  Pipeline::run()  │  │
//! │  │ events   │    │ (300ms)  │    │  (blocking)       │  │
//! │  └──────────┘    └──────────┘    └───────────────────┘  │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Runs execute on the loop thread itself, so at most one is in flight.
//! Events arriving meanwhile queue in the channel and are drained into the
//! debouncer afterwards, which turns any number of them into one run.

use crate::{
    build::{Pipeline, Stage},
    cli::Cli,
    compiler::BuildMode,
    config::PackConfig,
    log,
    utils::cancel::CancelToken,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

/// How often an idle loop checks for cancellation.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events until they have been quiet for `delay`.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    delay: Duration,
}

impl Debouncer {
    fn new(delay: Duration) -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            delay,
        }
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_temp_file(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    fn ready(&self) -> bool {
        self.has_pending() && self.last_event.is_some_and(|t| t.elapsed() >= self.delay)
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn timeout(&self) -> Duration {
        if self.has_pending() {
            self.delay
        } else {
            IDLE_POLL
        }
    }
}

// =============================================================================
// Event Loop
// =============================================================================

/// Drive `run` from change events until the channel closes or `cancel` fires.
///
/// `run` fires once up front with no changed paths, then once per settled
/// batch of changes. Pending changes are still flushed when the channel
/// closes.
fn run_loop(
    rx: &Receiver<notify::Result<Event>>,
    delay: Duration,
    cancel: &CancelToken,
    mut run: impl FnMut(&[PathBuf]),
) {
    run(&[]);

    let mut debouncer = Debouncer::new(delay);

    while !cancel.is_cancelled() {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => run(&debouncer.take()),
            Err(RecvTimeoutError::Disconnected) => {
                if debouncer.has_pending() {
                    run(&debouncer.take());
                }
                break;
            }
            // Irrelevant events, timeout without ready
            _ => {}
        }
    }
}

/// Move a recursive watch from `old` to `new`.
///
/// `new` is watched first, so a failure leaves the old watch in place.
fn rewatch(watcher: &mut impl Watcher, old: &Path, new: &Path) -> notify::Result<()> {
    watcher.watch(new, RecursiveMode::Recursive)?;
    // The old directory may be gone already.
    let _ = watcher.unwatch(old);
    Ok(())
}

fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Public API
// =============================================================================

/// Build in dev mode now and after every change, until `cancel` fires.
///
/// A failed run is logged and the loop keeps watching. A change to the
/// config file reloads it before the next run; an invalid config keeps the
/// previous one.
pub fn watch_for_changes_blocking(cli: &Cli, config: PackConfig, cancel: &CancelToken) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;

    let mut src = config.build.src.clone();
    watcher
        .watch(&src, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", src.display()))?;
    if config.config_path.exists() {
        watcher
            .watch(&config.config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", config.config_path.display()))?;
    }

    let root = config.get_root().to_path_buf();
    log!("watch"; "watching {}", rel_path(&src, &root));

    let config_path = config.config_path.clone();
    let delay = config.watch.debounce();
    let mut pipeline = Pipeline::from_config(&config);

    run_loop(&rx, delay, cancel, |changed| {
        if !changed.is_empty() {
            let names: Vec<_> = changed.iter().map(|p| rel_path(p, &root)).collect();
            log!("watch"; "{} changed, rebuilding...", names.join(", "));
        }

        if changed.contains(&config_path) {
            match PackConfig::load(cli) {
                Ok(config) => {
                    if config.build.src != src {
                        match rewatch(&mut watcher, &src, &config.build.src) {
                            Ok(()) => {
                                src = config.build.src.clone();
                                log!("watch"; "watching {}", rel_path(&src, &root));
                            }
                            Err(e) => log!("watch"; "couldn't watch {}: {e}", config.build.src.display()),
                        }
                    }
                    pipeline = Pipeline::from_config(&config);
                }
                Err(e) => log!("watch"; "config reload failed, keeping previous: {e:#}"),
            }
        }

        // Failures are already logged by the pipeline; keep watching.
        let _ = pipeline.run(BuildMode::Dev, cancel);
        if pipeline.stage() == Stage::Failed && !cancel.is_cancelled() {
            log!("watch"; "waiting for changes...");
        }
        eprintln!();
    });

    Ok(())
}
