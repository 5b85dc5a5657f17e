//! Single-assignment futures used for per-tile slots.
//!
//! A [`Promise`] is the producing side, held by the job; a [`JobFuture`] is
//! the observing side, stored in a tile slot. A future moves through
//! [`SlotState::Empty`] → [`SlotState::Working`] → [`SlotState::Available`].
//! Once available it never goes back: readers take an `Arc` to the value and
//! the slot keeps reporting `Available`.
//!
//! Cancellation flows from the observers to the job. The job's
//! [`CancellationToken`] is cancelled when any handle calls
//! [`JobFuture::cancel`], or when the last handle of a still-pending future
//! is dropped. A promise that observes cancellation settles as *abandoned*,
//! which reads as `Empty`.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Observable state of a slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SlotState {
    /// Nothing requested, or the request was abandoned.
    #[default]
    Empty,
    /// A job is queued or running.
    Working,
    /// The result is ready.
    Available,
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Working => write!(f, "working"),
            Self::Available => write!(f, "available"),
        }
    }
}

enum Outcome<T> {
    Pending,
    Resolved(Arc<T>),
    Abandoned,
}

struct Shared<T> {
    outcome: Mutex<Outcome<T>>,
    cancel: CancellationToken,
    /// Number of live `JobFuture` handles.
    handles: AtomicUsize,
}

impl<T> Shared<T> {
    fn new(outcome: Outcome<T>, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(outcome),
            cancel,
            handles: AtomicUsize::new(1),
        })
    }
}

/// Observing side of an asynchronous result.
pub struct JobFuture<T> {
    shared: Option<Arc<Shared<T>>>,
}

impl<T> JobFuture<T> {
    /// A future that was never requested.
    pub fn empty() -> Self {
        Self { shared: None }
    }

    /// A future that is already available.
    pub fn resolved(value: T) -> Self {
        Self {
            shared: Some(Shared::new(
                Outcome::Resolved(Arc::new(value)),
                CancellationToken::new(),
            )),
        }
    }

    pub fn state(&self) -> SlotState {
        match &self.shared {
            None => SlotState::Empty,
            Some(shared) => match &*shared.outcome.lock() {
                Outcome::Pending => SlotState::Working,
                Outcome::Resolved(_) => SlotState::Available,
                Outcome::Abandoned => SlotState::Empty,
            },
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.state() == SlotState::Empty
    }

    #[inline]
    pub fn is_working(&self) -> bool {
        self.state() == SlotState::Working
    }

    #[inline]
    pub fn is_available(&self) -> bool {
        self.state() == SlotState::Available
    }

    /// The result, if available.
    pub fn get(&self) -> Option<Arc<T>> {
        let shared = self.shared.as_ref()?;
        match &*shared.outcome.lock() {
            Outcome::Resolved(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Signals the job to stop.
    ///
    /// An available result stays available; only the token is cancelled, so
    /// follow-up work that shares the token can see the request was revoked.
    pub fn cancel(&self) {
        if let Some(shared) = &self.shared {
            shared.cancel.cancel();
        }
    }

    /// Cancels the job and returns this slot to `Empty`.
    pub fn reset(&mut self) {
        self.cancel();
        *self = Self::empty();
    }

    /// Token shared with the job, if one was requested.
    pub fn cancellation_token(&self) -> Option<CancellationToken> {
        self.shared.as_ref().map(|s| s.cancel.clone())
    }
}

impl<T> Default for JobFuture<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Clone for JobFuture<T> {
    fn clone(&self) -> Self {
        if let Some(shared) = &self.shared {
            shared.handles.fetch_add(1, Ordering::AcqRel);
        }
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T> Drop for JobFuture<T> {
    fn drop(&mut self) {
        let Some(shared) = self.shared.take() else {
            return;
        };
        if shared.handles.fetch_sub(1, Ordering::AcqRel) == 1
            && matches!(&*shared.outcome.lock(), Outcome::Pending)
        {
            shared.cancel.cancel();
        }
    }
}

impl<T> fmt::Debug for JobFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFuture")
            .field("state", &self.state())
            .finish()
    }
}

/// Producing side of a [`JobFuture`].
///
/// Dropping a promise without resolving it abandons the future.
pub struct Promise<T> {
    shared: Arc<Shared<T>>,
    settled: bool,
}

impl<T> Promise<T> {
    /// Creates a linked promise/future pair with a fresh token.
    pub fn new() -> (Self, JobFuture<T>) {
        Self::with_token(CancellationToken::new())
    }

    /// Creates a linked pair whose job observes `token`.
    pub fn with_token(token: CancellationToken) -> (Self, JobFuture<T>) {
        let shared = Shared::new(Outcome::Pending, token);
        let future = JobFuture {
            shared: Some(Arc::clone(&shared)),
        };
        (
            Self {
                shared,
                settled: false,
            },
            future,
        )
    }

    pub fn token(&self) -> &CancellationToken {
        &self.shared.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Publishes the value. Returns `false` and abandons the future instead
    /// if cancellation was requested while the job ran.
    pub fn resolve(mut self, value: T) -> bool {
        self.settled = true;
        let mut outcome = self.shared.outcome.lock();
        if self.shared.cancel.is_cancelled() {
            *outcome = Outcome::Abandoned;
            return false;
        }
        *outcome = Outcome::Resolved(Arc::new(value));
        true
    }

    /// Settles the future as abandoned.
    pub fn abandon(mut self) {
        self.settled = true;
        *self.shared.outcome.lock() = Outcome::Abandoned;
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.settled {
            let mut outcome = self.shared.outcome.lock();
            if matches!(*outcome, Outcome::Pending) {
                *outcome = Outcome::Abandoned;
            }
        }
    }
}
