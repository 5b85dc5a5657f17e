//! Priority-ordered worker pool.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::config::SchedulerConfig;
use super::future::{JobFuture, Promise};

/// Priority callback, evaluated each time a worker picks a job.
///
/// Larger values run first.
pub type PriorityFn = Arc<dyn Fn() -> f32 + Send + Sync>;

/// Options for [`JobScheduler::dispatch`].
#[derive(Clone, Default)]
pub struct DispatchOptions {
    /// Human-readable job name, for logs and diagnostics.
    pub name: String,
    /// Optional dynamic priority. Jobs without one have priority 0.
    pub priority: Option<PriorityFn>,
    /// When set, the job's token is a child of this token.
    pub cancel_parent: Option<CancellationToken>,
}

impl DispatchOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: PriorityFn) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_cancel_parent(mut self, token: &CancellationToken) -> Self {
        self.cancel_parent = Some(token.clone());
        self
    }
}

impl fmt::Debug for DispatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchOptions")
            .field("name", &self.name)
            .field("has_priority", &self.priority.is_some())
            .field("has_cancel_parent", &self.cancel_parent.is_some())
            .finish()
    }
}

/// Snapshot of scheduler counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Jobs accepted by `dispatch`.
    pub dispatched: u64,
    /// Jobs that ran and published a result.
    pub completed: u64,
    /// Jobs discarded or abandoned because of cancellation.
    pub canceled: u64,
    /// Jobs currently queued.
    pub pending: usize,
}

struct QueuedJob {
    seq: u64,
    name: String,
    priority: Option<PriorityFn>,
    token: CancellationToken,
    /// Returns `true` when a result was published.
    run: Box<dyn FnOnce() -> bool + Send>,
}

impl QueuedJob {
    fn priority(&self) -> f32 {
        self.priority.as_ref().map_or(0.0, |f| f())
    }
}

#[derive(Default)]
struct Counters {
    dispatched: AtomicU64,
    completed: AtomicU64,
    canceled: AtomicU64,
}

struct Inner {
    name: String,
    queue: Mutex<Vec<QueuedJob>>,
    available: Condvar,
    shutdown: AtomicBool,
    next_seq: AtomicU64,
    counters: Counters,
}

impl Inner {
    /// Removes the best runnable job. Cancelled jobs found along the way are
    /// moved into `discarded` so the caller can drop them outside the lock.
    fn pick(
        &self,
        queue: &mut Vec<QueuedJob>,
        discarded: &mut Vec<QueuedJob>,
    ) -> Option<QueuedJob> {
        let mut i = 0;
        while i < queue.len() {
            if queue[i].token.is_cancelled() {
                discarded.push(queue.remove(i));
            } else {
                i += 1;
            }
        }
        if !discarded.is_empty() {
            self.counters
                .canceled
                .fetch_add(discarded.len() as u64, Ordering::Relaxed);
        }

        // The queue is in dispatch order, so keeping the first maximum gives
        // FIFO among equal priorities.
        let mut best: Option<(usize, f32)> = None;
        for (index, job) in queue.iter().enumerate() {
            let priority = job.priority();
            match best {
                Some((_, p)) if priority <= p => {}
                _ => best = Some((index, priority)),
            }
        }
        best.map(|(index, _)| queue.remove(index))
    }

    fn execute(&self, job: QueuedJob) {
        trace!(scheduler = %self.name, job = %job.name, seq = job.seq, "Running job");
        if (job.run)() {
            self.counters.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.canceled.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Blocks until a job is available or shutdown is requested.
    fn next_blocking(&self) -> Option<QueuedJob> {
        loop {
            let mut discarded = Vec::new();
            let job = {
                let mut queue = self.queue.lock();
                if self.shutdown.load(Ordering::Acquire) {
                    return None;
                }
                let job = self.pick(&mut queue, &mut discarded);
                if job.is_none() && discarded.is_empty() {
                    self.available.wait(&mut queue);
                    continue;
                }
                job
            };
            drop(discarded);
            if job.is_some() {
                return job;
            }
        }
    }
}

fn worker_loop(inner: Arc<Inner>) {
    while let Some(job) = inner.next_blocking() {
        inner.execute(job);
    }
    trace!(scheduler = %inner.name, "Worker exiting");
}

/// Priority thread pool returning cancelable [`JobFuture`]s.
///
/// # Example
///
/// ```
/// use terrastream::job::{DispatchOptions, JobScheduler};
///
/// let scheduler = JobScheduler::manual();
/// let future = scheduler.dispatch(DispatchOptions::named("answer"), |_token| 42);
/// assert!(future.is_working());
///
/// scheduler.run_pending();
/// assert_eq!(future.get().as_deref(), Some(&42));
/// ```
pub struct JobScheduler {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: SchedulerConfig,
}

impl JobScheduler {
    /// Creates a scheduler and starts its worker threads.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn new(config: SchedulerConfig) -> io::Result<Self> {
        let inner = Arc::new(Inner {
            name: config.name.clone(),
            queue: Mutex::new(Vec::new()),
            available: Condvar::new(),
            shutdown: AtomicBool::new(false),
            next_seq: AtomicU64::new(0),
            counters: Counters::default(),
        });

        let scheduler = Self {
            inner,
            workers: Mutex::new(Vec::with_capacity(config.workers)),
            config,
        };

        for index in 0..scheduler.config.workers {
            let inner = Arc::clone(&scheduler.inner);
            let handle = thread::Builder::new()
                .name(format!("{}-{}", scheduler.config.name, index))
                .spawn(move || worker_loop(inner))?;
            scheduler.workers.lock().push(handle);
        }

        debug!(
            scheduler = %scheduler.config.name,
            workers = scheduler.config.workers,
            "Job scheduler started"
        );
        Ok(scheduler)
    }

    /// Creates a scheduler without worker threads.
    pub fn manual() -> Self {
        Self {
            inner: Arc::new(Inner {
                name: SchedulerConfig::manual().name,
                queue: Mutex::new(Vec::new()),
                available: Condvar::new(),
                shutdown: AtomicBool::new(false),
                next_seq: AtomicU64::new(0),
                counters: Counters::default(),
            }),
            workers: Mutex::new(Vec::new()),
            config: SchedulerConfig::manual(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Queues `job` and returns a future for its result.
    ///
    /// The job receives its cancellation token and should check it between
    /// expensive steps. If cancellation is requested before the job starts,
    /// it never runs. After shutdown the returned future is already empty.
    pub fn dispatch<T, F>(&self, options: DispatchOptions, job: F) -> JobFuture<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let token = match &options.cancel_parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (promise, future) = Promise::with_token(token.clone());

        if self.inner.shutdown.load(Ordering::Acquire) {
            debug!(job = %options.name, "Dispatch after shutdown ignored");
            promise.abandon();
            return future;
        }

        let run_token = token.clone();
        let run = Box::new(move || {
            if promise.is_cancelled() {
                promise.abandon();
                return false;
            }
            let value = job(&run_token);
            promise.resolve(value)
        });

        let seq = self.inner.next_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.queue.lock().push(QueuedJob {
            seq,
            name: options.name,
            priority: options.priority,
            token,
            run,
        });
        self.inner
            .counters
            .dispatched
            .fetch_add(1, Ordering::Relaxed);
        self.inner.available.notify_one();
        future
    }

    /// Runs the best queued job on the calling thread.
    ///
    /// Returns `false` when nothing runnable was queued.
    pub fn run_next(&self) -> bool {
        let mut discarded = Vec::new();
        let job = {
            let mut queue = self.inner.queue.lock();
            self.inner.pick(&mut queue, &mut discarded)
        };
        drop(discarded);
        match job {
            Some(job) => {
                self.inner.execute(job);
                true
            }
            None => false,
        }
    }

    /// Drains the queue on the calling thread, including jobs queued by the
    /// jobs it runs. Returns how many jobs ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }

    /// Drops queued jobs whose token is cancelled.
    pub fn purge_cancelled(&self) -> usize {
        let discarded: Vec<QueuedJob> = {
            let mut queue = self.inner.queue.lock();
            let (cancelled, keep) = std::mem::take(&mut *queue)
                .into_iter()
                .partition(|job| job.token.is_cancelled());
            *queue = keep;
            cancelled
        };
        let count = discarded.len();
        self.inner
            .counters
            .canceled
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Number of queued jobs.
    pub fn pending(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Names of queued jobs in dispatch order.
    pub fn pending_job_names(&self) -> Vec<String> {
        self.inner
            .queue
            .lock()
            .iter()
            .map(|job| job.name.clone())
            .collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        let counters = &self.inner.counters;
        SchedulerStats {
            dispatched: counters.dispatched.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            canceled: counters.canceled.load(Ordering::Relaxed),
            pending: self.pending(),
        }
    }

    /// Stops the workers and abandons every queued job.
    pub fn shutdown(&self) {
        if self.inner.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.available.notify_all();

        let current = thread::current().id();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }

        let abandoned: Vec<QueuedJob> = std::mem::take(&mut *self.inner.queue.lock());
        debug!(
            scheduler = %self.config.name,
            abandoned = abandoned.len(),
            "Job scheduler stopped"
        );
        drop(abandoned);
    }
}

impl Drop for JobScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for JobScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobScheduler")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
