//! Bounded thread pool that runs background segment refills.
//!
//! The pool keeps `core` worker threads alive for its whole lifetime and
//! feeds them through a bounded [`crossbeam_channel`] queue. When the queue is
//! full it grows by spawning extra workers up to `max`; those retire after
//! sitting idle for `keep_alive`. When both the queue and the thread budget
//! are exhausted, the submitting thread runs the task itself, which slows the
//! caller down instead of dropping the refill.

use core::time::Duration;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};

/// Prefix of every worker thread's name.
pub const REFILL_THREAD_PREFIX: &str = "segment-refill-";

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

pub struct RefillPool {
    sender: Mutex<Option<Sender<Task>>>,
    receiver: Receiver<Task>,
    core: Mutex<Vec<JoinHandle<()>>>,
    live: Arc<AtomicUsize>,
    max_threads: usize,
    keep_alive: Duration,
    next_index: AtomicUsize,
}

impl RefillPool {
    /// Starts `core_threads` workers in front of a queue of `queue_capacity`
    /// tasks. `max_threads` is raised to `core_threads` if smaller.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a core worker thread cannot be spawned.
    pub fn new(
        core_threads: usize,
        max_threads: usize,
        keep_alive: Duration,
        queue_capacity: usize,
    ) -> std::io::Result<Self> {
        let (sender, receiver) = crossbeam_channel::bounded(queue_capacity);
        let pool = Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            core: Mutex::new(Vec::with_capacity(core_threads)),
            live: Arc::new(AtomicUsize::new(0)),
            max_threads: max_threads.max(core_threads),
            keep_alive,
            next_index: AtomicUsize::new(0),
        };

        for _ in 0..core_threads {
            let receiver = pool.receiver.clone();
            let live = pool.live.clone();
            live.fetch_add(1, Ordering::AcqRel);
            let handle = pool.builder().spawn(move || {
                let _live = LiveGuard(live);
                while let Ok(task) = receiver.recv() {
                    run(task);
                }
            });
            match handle {
                Ok(handle) => pool.core.lock().push(handle),
                Err(e) => {
                    pool.live.fetch_sub(1, Ordering::AcqRel);
                    return Err(e);
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            core_threads,
            max_threads = pool.max_threads,
            queue_capacity,
            "refill pool started"
        );

        Ok(pool)
    }

    /// Submits `task`.
    ///
    /// Runs on a pool thread when one is available or the queue has room,
    /// otherwise on the calling thread. After [`RefillPool::shutdown`] every
    /// task runs on the calling thread.
    pub fn execute<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self.sender.lock().clone();
        let Some(sender) = sender else {
            run(Box::new(task));
            return;
        };

        match sender.try_send(Box::new(task)) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                if let Some(task) = self.spawn_extra(task) {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("refill pool saturated, running task on caller");
                    run(task);
                }
            }
            Err(TrySendError::Disconnected(task)) => run(task),
        }
    }

    /// Number of worker threads currently alive.
    pub fn live_threads(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.receiver.len()
    }

    /// Stops accepting work, lets the workers drain the queue, and joins the
    /// core workers. Idempotent.
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);

        let handles = core::mem::take(&mut *self.core.lock());
        for handle in handles {
            if handle.join().is_err() {
                #[cfg(feature = "tracing")]
                tracing::error!("refill worker exited abnormally");
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("refill pool shut down");
    }

    /// Starts a temporary worker seeded with `task`. Hands `task` back if the
    /// thread budget is used up.
    fn spawn_extra(&self, task: Task) -> Option<Task> {
        let reserved = self
            .live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max_threads).then_some(live + 1)
            })
            .is_ok();
        if !reserved {
            return Some(task);
        }

        let receiver = self.receiver.clone();
        let live = self.live.clone();
        let keep_alive = self.keep_alive;
        let spawned = self.builder().spawn(move || {
            let _live = LiveGuard(live);
            run(task);
            loop {
                match receiver.recv_timeout(keep_alive) {
                    Ok(task) => run(task),
                    Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        if let Err(_e) = spawned {
            // the seed task was dropped with the closure; its refill ticket is
            // released, so a later allocation will schedule it again
            self.live.fetch_sub(1, Ordering::AcqRel);
            #[cfg(feature = "tracing")]
            tracing::error!(error = %_e, "failed to spawn refill worker");
        }
        None
    }

    fn builder(&self) -> thread::Builder {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new().name(format!("{REFILL_THREAD_PREFIX}{index}"))
    }
}

impl Drop for RefillPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl core::fmt::Debug for RefillPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RefillPool")
            .field("live_threads", &self.live_threads())
            .field("max_threads", &self.max_threads)
            .field("queued", &self.queued())
            .field("keep_alive", &self.keep_alive)
            .finish_non_exhaustive()
    }
}

struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

fn run(task: Task) {
    if catch_unwind(AssertUnwindSafe(task)).is_err() {
        #[cfg(feature = "tracing")]
        tracing::error!("refill task panicked");
    }
}
