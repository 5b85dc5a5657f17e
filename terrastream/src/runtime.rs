//! Frame-synchronous side of the engine.
//!
//! Background jobs must not touch render state. Anything that does (merging
//! a loaded model into a tile, attaching freshly built children) is queued
//! here and executed by [`Runtime::run_update_operations`], which the owner
//! calls once per frame from its update thread.
//!
//! The runtime also carries the [`RenderBackend`], the narrow interface to
//! whatever uploads tiles to the GPU. The default [`NullRenderBackend`] does
//! nothing, which is all a headless run needs.

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::job::{DispatchOptions, JobFuture, PriorityFn, Promise};
use crate::key::TileKey;
use crate::model::RenderModel;
use crate::tile::TerrainTileNode;

/// Identifies one frame of the update loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStamp {
    pub frame_number: u64,
    /// Seconds since the loop started.
    pub simulation_time: f64,
}

impl FrameStamp {
    pub fn new(frame_number: u64) -> Self {
        Self {
            frame_number,
            simulation_time: 0.0,
        }
    }

    pub fn with_time(mut self, seconds: f64) -> Self {
        self.simulation_time = seconds;
        self
    }

    /// Stamp for the following frame.
    pub fn next(&self) -> Self {
        Self {
            frame_number: self.frame_number + 1,
            simulation_time: self.simulation_time,
        }
    }
}

/// GPU-facing hooks invoked by the paging engine.
pub trait RenderBackend: Send + Sync {
    /// Prepares a new tile's resources. Called from worker threads.
    fn compile(&self, _tile: &TerrainTileNode) {}

    /// Pushes a tile's changed textures to the GPU. Called on the update thread
    /// after merges, and once at tile creation.
    fn update_descriptors(&self, _key: &TileKey, _model: &RenderModel) {}
}

/// Backend that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRenderBackend;

impl RenderBackend for NullRenderBackend {}

/// Backend that only counts calls; used for statistics and tests.
#[derive(Debug, Default)]
pub struct CountingRenderBackend {
    compiled: AtomicU64,
    descriptor_updates: AtomicU64,
}

impl CountingRenderBackend {
    pub fn compiled(&self) -> u64 {
        self.compiled.load(Ordering::Relaxed)
    }

    pub fn descriptor_updates(&self) -> u64 {
        self.descriptor_updates.load(Ordering::Relaxed)
    }
}

impl RenderBackend for CountingRenderBackend {
    fn compile(&self, _tile: &TerrainTileNode) {
        self.compiled.fetch_add(1, Ordering::Relaxed);
    }

    fn update_descriptors(&self, _key: &TileKey, _model: &RenderModel) {
        self.descriptor_updates.fetch_add(1, Ordering::Relaxed);
    }
}

struct UpdateOperation {
    seq: u64,
    name: String,
    priority: Option<PriorityFn>,
    token: CancellationToken,
    run: Box<dyn FnOnce() + Send>,
}

/// Queue of operations that must run on the update thread.
pub struct Runtime {
    backend: Arc<dyn RenderBackend>,
    operations: Mutex<Vec<UpdateOperation>>,
    next_seq: AtomicU64,
    executed: AtomicU64,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(NullRenderBackend))
    }
}

impl Runtime {
    pub fn new(backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            backend,
            operations: Mutex::new(Vec::new()),
            next_seq: AtomicU64::new(0),
            executed: AtomicU64::new(0),
        }
    }

    pub fn backend(&self) -> &Arc<dyn RenderBackend> {
        &self.backend
    }

    /// Queues `op` for the next update pass and returns a future for its result.
    ///
    /// Operations run in priority order (largest first, FIFO among equals).
    /// An operation whose token is cancelled before its turn is dropped and
    /// its future reads as empty.
    pub fn run_during_update<T, F>(&self, options: DispatchOptions, op: F) -> JobFuture<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&CancellationToken) -> T + Send + 'static,
    {
        let token = match &options.cancel_parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        let (promise, future) = Promise::with_token(token.clone());
        let run_token = token.clone();
        self.enqueue(options.name, options.priority, token, move || {
            if promise.is_cancelled() {
                promise.abandon();
                return;
            }
            let value = op(&run_token);
            promise.resolve(value);
        });
        future
    }

    /// Queues a fire-and-forget operation for the next update pass.
    pub fn post<F>(&self, name: impl Into<String>, op: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(name.into(), None, CancellationToken::new(), op);
    }

    fn enqueue<F>(
        &self,
        name: String,
        priority: Option<PriorityFn>,
        token: CancellationToken,
        op: F,
    )
    where
        F: FnOnce() + Send + 'static,
    {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.operations.lock().push(UpdateOperation {
            seq,
            name,
            priority,
            token,
            run: Box::new(op),
        });
    }

    /// Runs every operation queued before this call. Operations queued while
    /// running wait for the next pass. Returns how many ran.
    pub fn run_update_operations(&self) -> usize {
        let queued = std::mem::take(&mut *self.operations.lock());
        if queued.is_empty() {
            return 0;
        }

        let mut ordered: Vec<(f32, UpdateOperation)> = queued
            .into_iter()
            .filter(|op| !op.token.is_cancelled())
            .map(|op| (op.priority.as_ref().map_or(0.0, |f| f()), op))
            .collect();
        ordered.sort_by(|(pa, a), (pb, b)| {
            pb.partial_cmp(pa)
                .unwrap_or(CmpOrdering::Equal)
                .then(a.seq.cmp(&b.seq))
        });

        let count = ordered.len();
        for (_, op) in ordered {
            trace!(operation = %op.name, "Running update operation");
            (op.run)();
        }
        self.executed.fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Drops queued operations whose token is cancelled.
    pub fn purge_cancelled(&self) -> usize {
        let removed: Vec<UpdateOperation> = {
            let mut operations = self.operations.lock();
            let (cancelled, keep) = std::mem::take(&mut *operations)
                .into_iter()
                .partition(|op| op.token.is_cancelled());
            *operations = keep;
            cancelled
        };
        removed.len()
    }

    pub fn pending(&self) -> usize {
        self.operations.lock().len()
    }

    /// Names of queued operations in submission order.
    pub fn pending_operation_names(&self) -> Vec<String> {
        self.operations
            .lock()
            .iter()
            .map(|op| op.name.clone())
            .collect()
    }

    /// Total operations executed so far.
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("pending", &self.pending())
            .field("executed", &self.executed())
            .finish()
    }
}
