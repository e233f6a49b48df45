//! Background conversion with "latest request wins" semantics.
//!
//! An editor re-converts on every keystroke.  [`LipSyncWorker`] keeps one
//! pipeline on its own thread and a single-slot mailbox: a new request
//! replaces any request that has not started yet, and a run that finishes
//! after a newer request was submitted is discarded instead of published.
//!
//! The pipeline is built by a factory *on* the worker thread.  Its oracle
//! must be `Send`; wrap a thread-bound oracle in [`PinnedOracle`], which
//! keeps it on a thread of its own.
//!
//! [`PinnedOracle`]: crate::phonemize::PinnedOracle

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc, Condvar, Mutex, MutexGuard,
    },
    thread::JoinHandle,
};

use anyhow::{anyhow, Context, Result};

use crate::{keyframe::KeyFrame, pipeline::LipSyncPipeline};

/// Result of one completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutput {
    pub run: u64,
    pub text: String,
    pub reading: String,
    pub key_frames: Vec<KeyFrame>,
}

#[derive(Default)]
struct State {
    pending: Option<(u64, String)>,
    published: Option<Arc<WorkerOutput>>,
    stopped: bool,
}

struct Shared {
    state: Mutex<State>,
    cv: Condvar,
    /// Newest run number handed out.
    latest: AtomicU64,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State holds plain values; a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct LipSyncWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl LipSyncWorker {
    /// Start the worker thread.  Fails if the factory fails.
    pub fn spawn<F>(factory: F) -> Result<Self>
    where
        F: FnOnce() -> Result<LipSyncPipeline> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            state: Mutex::new(State::default()),
            cv: Condvar::new(),
            latest: AtomicU64::new(0),
        });
        let (init_tx, init_rx) = mpsc::channel::<Result<()>>();

        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("kuchipaku-worker".into())
            .spawn(move || {
                let pipeline = match factory() {
                    Ok(p) => {
                        let _ = init_tx.send(Ok(()));
                        p
                    }
                    Err(e) => {
                        let _ = init_tx.send(Err(e));
                        return;
                    }
                };
                run_loop(&worker_shared, &pipeline);
            })
            .context("Failed to spawn worker thread")?;

        init_rx
            .recv()
            .map_err(|_| anyhow!("worker thread exited during initialisation"))?
            .context("Pipeline construction failed")?;

        Ok(Self { shared, thread: Some(thread) })
    }

    /// Queue `text`, replacing any request that has not started.
    /// Returns the run number of this request.
    pub fn submit(&self, text: impl Into<String>) -> u64 {
        let mut state = self.shared.lock();
        let run = self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((old, _)) = state.pending.replace((run, text.into())) {
            log::debug!("worker: run {old} replaced by run {run} before it started");
        }
        self.shared.cv.notify_all();
        run
    }

    /// Newest run number handed out by [`submit`](Self::submit).
    pub fn latest_run(&self) -> u64 {
        self.shared.latest.load(Ordering::SeqCst)
    }

    /// Most recently published result, if any.
    pub fn latest(&self) -> Option<Arc<WorkerOutput>> {
        self.shared.lock().published.clone()
    }

    /// Block until a run numbered `run` or newer has been published.
    ///
    /// A superseded run is never published; waiting on it returns the
    /// newer result that replaced it.  Returns `None` if the worker stopped.
    pub fn wait_for(&self, run: u64) -> Option<Arc<WorkerOutput>> {
        let mut state = self.shared.lock();
        loop {
            if let Some(out) = state.published.as_ref().filter(|o| o.run >= run) {
                return Some(Arc::clone(out));
            }
            if state.stopped {
                return None;
            }
            state = self.shared.cv.wait(state).unwrap_or_else(|e| e.into_inner());
        }
    }
}

fn run_loop(shared: &Shared, pipeline: &LipSyncPipeline) {
    loop {
        let (run, text) = {
            let mut state = shared.lock();
            loop {
                if let Some(request) = state.pending.take() {
                    break request;
                }
                if state.stopped {
                    return;
                }
                state = shared.cv.wait(state).unwrap_or_else(|e| e.into_inner());
            }
        };

        let reading = pipeline.reading(&text);
        let key_frames = pipeline.key_frames_from_reading(&reading);

        // `submit` bumps `latest` under the same lock, so the check and the
        // publication cannot be split by a newer request.
        let mut state = shared.lock();
        let latest = shared.latest.load(Ordering::SeqCst);
        if latest != run {
            log::debug!("worker: run {run} superseded by run {latest}; discarded");
            continue;
        }
        state.published = Some(Arc::new(WorkerOutput { run, text, reading, key_frames }));
        shared.cv.notify_all();
    }
}

impl Drop for LipSyncWorker {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.stopped = true;
            state.pending = None;
        }
        self.shared.cv.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
