//! Drain scheduler
//!
//! A recurring task that gives an external work queue the chance to make
//! progress. It is started on demand, pumps the queue at a fixed interval, and
//! stops itself as soon as the queue reports idle. The next submission starts
//! a fresh task. Between ticks the task also sleeps on the queue's own
//! wakeups, so work driven by the tokio reactor is not held back to the tick
//! rate.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::poll_fn;
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::error::BackendResult;

/// Interval between drain ticks
pub const DEFAULT_DRAIN_INTERVAL: Duration = Duration::from_millis(10);

/// A queue the scheduler keeps draining
pub trait QueuePump: Send + Sync + 'static {
    /// Let queued work make progress. Must not block.
    fn pump(&self) -> BackendResult<()>;

    /// Advance work that was woken since the last poll
    ///
    /// Registers `cx` for further wakeups and returns `Ready` once some work
    /// has settled. Queues that only move when pumped keep the default.
    fn poll_progress(&self, _cx: &mut Context<'_>) -> Poll<()> {
        Poll::Pending
    }

    /// True when nothing is waiting on the queue
    fn is_idle(&self) -> bool;
}

struct DrainTask {
    id: u64,
    handle: JoinHandle<()>,
}

/// Starts and stops the recurring drain task
pub struct DrainScheduler {
    interval: Duration,
    runtime: Handle,
    /// At most one live task. The idle check and the clear happen under this
    /// lock, so a submission racing a stopping task always sees a consistent
    /// slot.
    task: Mutex<Option<DrainTask>>,
    starts: AtomicU64,
}

impl DrainScheduler {
    pub fn new(runtime: Handle, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            interval,
            runtime,
            task: Mutex::new(None),
            starts: AtomicU64::new(0),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start draining `pump` unless a drain task is already active
    ///
    /// Returns true if a new task was started.
    pub fn ensure_running(self: &Arc<Self>, pump: Arc<dyn QueuePump>) -> bool {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return false;
        }

        let id = self.starts.fetch_add(1, Ordering::SeqCst) + 1;
        let scheduler = Arc::clone(self);
        let interval = self.interval;

        let handle = self.runtime.spawn(async move {
            debug!("Drain task {} started with interval {:?}", id, interval);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = pump.pump() {
                            warn!("Drain task {} failed to flush client queue: {}", id, e);
                        }
                    }
                    _ = poll_fn(|cx| pump.poll_progress(cx)) => {
                        trace!("Drain task {} woken by settled work", id);
                    }
                }

                let mut slot = scheduler.task.lock();
                if pump.is_idle() {
                    if slot.as_ref().is_some_and(|task| task.id == id) {
                        *slot = None;
                    }
                    debug!("Drain task {} idle, stopping", id);
                    break;
                }
                trace!("Drain task {} still has pending work", id);
            }
        });

        *slot = Some(DrainTask { id, handle });
        true
    }

    /// Whether a drain task is currently active
    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Total number of drain tasks started so far
    pub fn starts(&self) -> u64 {
        self.starts.load(Ordering::SeqCst)
    }

    /// Abort the active drain task, if any
    pub fn shutdown(&self) {
        if let Some(task) = self.task.lock().take() {
            debug!("Aborting drain task {}", task.id);
            task.handle.abort();
        }
    }
}
