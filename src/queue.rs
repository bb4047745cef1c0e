//! Ordered task queue: FIFO execution on one dedicated worker thread.
//!
//! Submitters push boxed closures into an `embassy-sync` channel and
//! return immediately; the worker blocks on `receive().await` (driven by
//! `futures_lite::future::block_on`) and runs each task to completion
//! before taking the next.
//!
//! ```text
//!  submit() ──▶ ┌──────────────────────┐      ┌───────────────┐
//!  submit() ──▶ │ Channel<Slot, DEPTH> │ ───▶ │ worker thread │ ──▶ task()
//!  submit() ──▶ └──────────────────────┘      └───────────────┘
//! ```
//!
//! `drain()` abandons a stale session: pending tasks are discarded, the
//! running one completes, and the queue refuses further work. `stop()` is
//! the graceful variant: pending tasks still run before the worker exits.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle, ThreadId};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::error::QueueError;

/// Channel depth per queue.
pub const QUEUE_DEPTH: usize = 256;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

enum Slot {
    /// Task tagged with the drain epoch it was submitted in.
    Run { epoch: u64, task: Task },
    Shutdown,
}

type SlotChannel = Channel<CriticalSectionRawMutex, Slot, QUEUE_DEPTH>;

struct Shared {
    channel: SlotChannel,
    closed: AtomicBool,
    /// Bumped by `drain()`; tasks from an older epoch are skipped.
    epoch: AtomicU64,
}

/// FIFO task runner backed by one worker thread.
pub struct TaskQueue {
    name: String,
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl TaskQueue {
    /// Spawn the worker thread and return the queue.
    ///
    /// `name` is used for the thread name and log lines.
    pub fn new(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let shared = Arc::new(Shared {
            channel: Channel::new(),
            closed: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker_name = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker(&worker_name, &worker_shared))?;
        let worker_id = handle.thread().id();

        Ok(Self {
            name,
            shared,
            worker: Mutex::new(Some(handle)),
            worker_id,
        })
    }

    /// Append a task. Never blocks.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<(), QueueError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }
        let epoch = self.shared.epoch.load(Ordering::Acquire);
        self.shared
            .channel
            .try_send(Slot::Run {
                epoch,
                task: Box::new(task),
            })
            .map_err(|_| {
                warn!("{}: channel full, task rejected", self.name);
                QueueError::Full
            })
    }

    /// Discard every task that has not started and close the queue.
    ///
    /// A task already running is not interrupted. May be called from
    /// inside one of this queue's own tasks.
    pub fn drain(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.epoch.fetch_add(1, Ordering::AcqRel);

        let mut discarded = 0usize;
        while self.shared.channel.try_receive().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!("{}: drained {} pending task(s)", self.name, discarded);
        }
        // Channel was just emptied, so the sentinel always fits.
        let _ = self.shared.channel.try_send(Slot::Shutdown);
    }

    /// Close the queue, let pending tasks finish, then join the worker.
    pub fn stop(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            futures_lite::future::block_on(self.shared.channel.send(Slot::Shutdown));
        }
        if thread::current().id() == self.worker_id {
            return;
        }
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("{}: worker thread panicked", self.name);
            }
        }
    }

    /// Whether the queue still accepts tasks.
    pub fn is_open(&self) -> bool {
        !self.shared.closed.load(Ordering::Acquire)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for TaskQueue {
    fn drop(&mut self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            let _ = self.shared.channel.try_send(Slot::Shutdown);
        }
    }
}

fn run_worker(name: &str, shared: &Shared) {
    debug!("{}: worker started", name);
    loop {
        match futures_lite::future::block_on(shared.channel.receive()) {
            Slot::Run { epoch, task } => {
                if epoch != shared.epoch.load(Ordering::Acquire) {
                    continue;
                }
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    error!("{}: task panicked", name);
                }
            }
            Slot::Shutdown => break,
        }
    }
    debug!("{}: worker exited", name);
}
