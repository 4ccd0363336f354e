//! C11: bounded work queue with retry-then-fail semantics, ported from the
//! original asyncio `TaskQueue` onto `std::thread` + `std::sync::mpsc`
//! (spec §5 — no async runtime in this service).

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, SystemTime};

use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Index,
    Delete,
    Update,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub kind: TaskKind,
    pub path: PathBuf,
    pub status: TaskStatus,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
}

impl Task {
    pub fn new(kind: TaskKind, path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            path,
            status: TaskStatus::Pending,
            created_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
            error: None,
            retry_count: 0,
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

struct Inner {
    queue: VecDeque<Task>,
    processing: Vec<Task>,
    completed: Vec<Task>,
    failed: Vec<Task>,
    capacity: usize,
}

/// A handler run by queue workers. Returning `Err` marks the task for retry
/// (or permanent failure once `max_retries` is exhausted).
pub type TaskHandler = dyn Fn(&Task) -> Result<(), String> + Send + Sync;

/// Bounded, multi-producer task queue. `push` drops the task and returns
/// `false` once `capacity` is reached rather than blocking the watcher
/// thread that feeds it (spec §4.11 — a full queue must not stall file
/// system event delivery).
pub struct TaskQueue {
    inner: Mutex<Inner>,
    not_empty: Condvar,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner { queue: VecDeque::new(), processing: Vec::new(), completed: Vec::new(), failed: Vec::new(), capacity }),
            not_empty: Condvar::new(),
        })
    }

    pub fn push(&self, task: Task) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.len() >= inner.capacity {
            tracing::warn!(task_id = %task.id, "task queue full, dropping task");
            return false;
        }
        inner.queue.push_back(task);
        self.not_empty.notify_one();
        true
    }

    fn requeue(&self, task: Task) {
        let mut inner = self.inner.lock().unwrap();
        inner.queue.push_back(task);
        self.not_empty.notify_one();
    }

    /// Blocks for up to 1 second waiting for a task, mirroring the
    /// original's `asyncio.wait_for(queue.get(), timeout=1.0)` poll.
    fn pop_with_timeout(&self, timeout: Duration) -> Option<Task> {
        let mut inner = self.inner.lock().unwrap();
        if inner.queue.is_empty() {
            let (guard, _) = self.not_empty.wait_timeout(inner, timeout).unwrap();
            inner = guard;
        }
        inner.queue.pop_front()
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.lock().unwrap();
        QueueStats {
            pending: inner.queue.len(),
            processing: inner.processing.len(),
            completed: inner.completed.len(),
            failed: inner.failed.len(),
        }
    }

    fn mark_processing(&self, task: Task) -> Task {
        let mut task = task;
        task.status = TaskStatus::Processing;
        task.started_at = Some(SystemTime::now());
        let mut inner = self.inner.lock().unwrap();
        inner.processing.push(task.clone());
        task
    }

    fn finish(&self, task_id: &str, outcome: Task) {
        let mut inner = self.inner.lock().unwrap();
        inner.processing.retain(|t| t.id != task_id);
        match outcome.status {
            TaskStatus::Completed => inner.completed.push(outcome),
            TaskStatus::Failed => inner.failed.push(outcome),
            _ => {}
        }
    }

    fn process_one(&self, task: Task, handler: &TaskHandler) {
        let mut task = self.mark_processing(task);
        match handler(&task) {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(SystemTime::now());
                tracing::info!(task_id = %task.id, "task completed");
                self.finish(&task.id, task);
            }
            Err(err) => {
                task.retry_count += 1;
                task.error = Some(err);
                if task.retry_count < task.max_retries {
                    tracing::warn!(task_id = %task.id, retry = task.retry_count, max = task.max_retries, "task failed, retrying");
                    task.status = TaskStatus::Pending;
                    {
                        let mut inner = self.inner.lock().unwrap();
                        inner.processing.retain(|t| t.id != task.id);
                    }
                    self.requeue(task);
                } else {
                    task.status = TaskStatus::Failed;
                    task.completed_at = Some(SystemTime::now());
                    tracing::error!(task_id = %task.id, error = ?task.error, "task failed permanently");
                    self.finish(&task.id, task);
                }
            }
        }
    }
}

/// One worker thread that pops tasks until `running` is cleared. Multiple
/// workers may share the same queue and handler.
pub fn spawn_worker(queue: Arc<TaskQueue>, handler: Arc<TaskHandler>, running: Arc<std::sync::atomic::AtomicBool>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        use std::sync::atomic::Ordering;
        while running.load(Ordering::Relaxed) {
            if let Some(task) = queue.pop_with_timeout(Duration::from_secs(1)) {
                queue.process_one(task, &handler);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn push_respects_capacity() {
        let q = TaskQueue::new(1);
        assert!(q.push(Task::new(TaskKind::Index, PathBuf::from("/a"))));
        assert!(!q.push(Task::new(TaskKind::Index, PathBuf::from("/b"))));
        assert_eq!(q.stats().pending, 1);
    }

    #[test]
    fn worker_retries_then_fails_permanently() {
        let q = TaskQueue::new(10);
        let mut task = Task::new(TaskKind::Index, PathBuf::from("/a"));
        task.max_retries = 2;
        q.push(task);

        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();
        let handler: Arc<TaskHandler> = Arc::new(move |_task| {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
            Err("boom".to_string())
        });
        let running = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let running_clone = running.clone();
        let q_clone = q.clone();
        let handle = spawn_worker(q.clone(), handler, running.clone());

        std::thread::sleep(Duration::from_millis(200));
        running_clone.store(false, Ordering::Relaxed);
        let _ = handle.join();

        assert_eq!(q_clone.stats().failed, 1);
        assert!(attempts.load(Ordering::SeqCst) >= 2);
    }
}
