//! C12: wires the file watcher to the task queue and drives re-indexing.
//! Exposes only `start`/`stop` (spec §9 REDESIGN FLAG — no cyclic
//! watcher-owns-queue-owns-watcher references, and no third "restart"
//! entry point that has to reconcile half-torn-down state). `stop` always
//! runs its three phases in order: stop watcher emission, drain the queue
//! up to a grace period, stop the workers.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::context::Context;
use crate::task_queue::{spawn_worker, Task, TaskKind, TaskHandler, TaskQueue};
use crate::watcher::{FileWatcher, WatchEventKind};

const QUEUE_CAPACITY: usize = 10_000;
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(30);
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct AutoIndexer {
    watcher: Option<FileWatcher>,
    queue: Arc<TaskQueue>,
    running: Arc<AtomicBool>,
    worker_handles: Vec<std::thread::JoinHandle<()>>,
    relay_handle: Option<std::thread::JoinHandle<()>>,
}

impl AutoIndexer {
    /// Builds the indexer but does not start watching or processing yet —
    /// call [`AutoIndexer::start`] for that.
    pub fn new() -> Self {
        Self {
            watcher: None,
            queue: TaskQueue::new(QUEUE_CAPACITY),
            running: Arc::new(AtomicBool::new(false)),
            worker_handles: Vec::new(),
            relay_handle: None,
        }
    }

    /// Starts watching `roots` and spins up `worker_count` queue workers
    /// that call `ctx` to ingest/delete whatever path each task names.
    pub fn start(&mut self, ctx: Arc<Context>, roots: &[PathBuf], recursive: bool, worker_count: usize) -> notify::Result<()> {
        self.running.store(true, Ordering::SeqCst);

        let (tx, rx) = channel();
        let mut watcher = FileWatcher::new(tx)?;
        for root in roots {
            watcher.add_watch(root, recursive)?;
        }
        self.watcher = Some(watcher);

        let queue_for_relay = self.queue.clone();
        let running_for_relay = self.running.clone();
        self.relay_handle = Some(std::thread::spawn(move || {
            while running_for_relay.load(Ordering::Relaxed) {
                match rx.recv_timeout(Duration::from_millis(500)) {
                    Ok(event) => {
                        let kind = match event.kind {
                            WatchEventKind::Created | WatchEventKind::Modified => TaskKind::Index,
                            WatchEventKind::Deleted => TaskKind::Delete,
                        };
                        queue_for_relay.push(Task::new(kind, event.path));
                    }
                    Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                    Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
                }
            }
        }));

        // `ingest_path` owns the no-op/reuse/re-chunk decision itself (hash
        // lookup before any chunking), so Index/Update must not delete the
        // existing Document first — that would destroy the very row the
        // hash-match short-circuit needs to see.
        let handler: Arc<TaskHandler> = Arc::new(move |task: &Task| match task.kind {
            TaskKind::Index | TaskKind::Update => {
                let path = task.path.to_string_lossy().to_string();
                crate::ingest::ingest_path(&ctx, &path).map_err(|e| e.to_string())
            }
            TaskKind::Delete => crate::ingest::delete_path(&ctx, &task.path).map_err(|e| e.to_string()),
        });

        for _ in 0..worker_count.max(1) {
            self.worker_handles.push(spawn_worker(self.queue.clone(), handler.clone(), self.running.clone()));
        }
        Ok(())
    }

    /// Phase 1: stop accepting new watcher events. Phase 2: let in-flight
    /// and already-queued tasks drain, up to [`STOP_GRACE_PERIOD`]. Phase 3:
    /// stop worker threads. Any tasks still pending after the grace period
    /// are abandoned in the queue (their state is recoverable on next
    /// `start`, since the queue is re-created fresh — callers that need
    /// durability across restarts should flush `queue.stats()` before
    /// calling this).
    pub fn stop(mut self) {
        self.running.store(false, Ordering::SeqCst);
        drop(self.watcher.take());

        let deadline = Instant::now() + STOP_GRACE_PERIOD;
        while Instant::now() < deadline {
            let stats = self.queue.stats();
            if stats.pending == 0 && stats.processing == 0 {
                break;
            }
            std::thread::sleep(DRAIN_POLL_INTERVAL);
        }

        if let Some(h) = self.relay_handle.take() {
            let _ = h.join();
        }
        for h in self.worker_handles.drain(..) {
            let _ = h.join();
        }
    }

    pub fn queue_stats(&self) -> crate::task_queue::QueueStats {
        self.queue.stats()
    }
}

impl Default for AutoIndexer {
    fn default() -> Self {
        Self::new()
    }
}
