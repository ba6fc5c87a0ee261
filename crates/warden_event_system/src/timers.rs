//! Delayed-task scheduler.
//!
//! One worker task owns a min-heap of deadlines. When a deadline passes the
//! associated future is spawned onto its own task, so a slow callback never
//! delays the ones behind it. Callbacks get no implicit lock; anything they
//! share with event handlers must be synchronized by the caller.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Handle returned by [`TaskScheduler::schedule_after`], used to cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(u64);

#[derive(Default)]
struct SchedulerState {
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
    tasks: HashMap<u64, Task>,
}

struct SchedulerInner {
    state: Mutex<SchedulerState>,
    wakeup: Notify,
    next_id: AtomicU64,
    stopped: AtomicBool,
}

impl SchedulerInner {
    fn lock(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs futures after a delay using a single worker.
pub struct TaskScheduler {
    inner: Arc<SchedulerInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for TaskScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskScheduler")
            .field("pending", &self.pending())
            .finish()
    }
}

impl TaskScheduler {
    /// Creates the scheduler and spawns its worker on the current runtime.
    pub fn start() -> Self {
        let inner = Arc::new(SchedulerInner {
            state: Mutex::new(SchedulerState::default()),
            wakeup: Notify::new(),
            next_id: AtomicU64::new(1),
            stopped: AtomicBool::new(false),
        });
        let worker = tokio::spawn(worker_loop(inner.clone()));

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Schedules `task` to be spawned once `delay` has elapsed.
    pub fn schedule_after<F>(&self, delay: Duration, task: F) -> TaskHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut state = self.inner.lock();
            state.deadlines.push(Reverse((deadline_after(delay), id)));
            state.tasks.insert(id, Box::pin(task));
        }
        self.inner.wakeup.notify_one();
        debug!("⏲️ Scheduled task {} in {:?}", id, delay);
        TaskHandle(id)
    }

    /// Cancels a pending task. Returns false if it already ran or was cancelled.
    pub fn cancel(&self, handle: TaskHandle) -> bool {
        let mut state = self.inner.lock();
        if state.tasks.remove(&handle.0).is_none() {
            return false;
        }
        // stale heap entries are skipped when due; compact once they outnumber live ones
        if state.deadlines.len() > 2 * state.tasks.len() {
            let SchedulerState { deadlines, tasks } = &mut *state;
            deadlines.retain(|Reverse((_, id))| tasks.contains_key(id));
        }
        true
    }

    /// Number of tasks waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.inner.lock().tasks.len()
    }

    /// Stops the worker and drops every pending task.
    pub async fn shutdown(&self) {
        self.inner.stopped.store(true, Ordering::Release);
        self.inner.wakeup.notify_one();

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if tokio::time::timeout(Duration::from_secs(1), worker).await.is_err() {
                warn!("⏰ Task scheduler worker did not stop in time");
            }
        }

        let dropped = {
            let mut state = self.inner.lock();
            state.deadlines.clear();
            let count = state.tasks.len();
            state.tasks.clear();
            count
        };
        info!("⏲️ Task scheduler stopped ({} pending task(s) dropped)", dropped);
    }
}

/// `now + delay`, clamped for delays too large to represent.
fn deadline_after(delay: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(delay)
        .or_else(|| now.checked_add(Duration::from_secs(86_400 * 365)))
        .unwrap_or(now)
}

async fn worker_loop(inner: Arc<SchedulerInner>) {
    loop {
        if inner.stopped.load(Ordering::Acquire) {
            break;
        }

        let next_deadline = inner.lock().deadlines.peek().map(|Reverse((at, _))| *at);
        match next_deadline {
            None => inner.wakeup.notified().await,
            Some(at) if at <= Instant::now() => {
                let due = {
                    let mut state = inner.lock();
                    state
                        .deadlines
                        .pop()
                        .and_then(|Reverse((_, id))| state.tasks.remove(&id).map(|task| (id, task)))
                };
                if let Some((id, task)) = due {
                    debug!("⏲️ Running task {}", id);
                    tokio::spawn(task);
                }
            }
            Some(at) => {
                tokio::select! {
                    _ = tokio::time::sleep_until(at) => {}
                    _ = inner.wakeup.notified() => {}
                }
            }
        }
    }
}
