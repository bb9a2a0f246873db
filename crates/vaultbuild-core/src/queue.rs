//! Serialized operation queue.
//!
//! A bounded-concurrency FIFO task runner with an explicit
//! `idle → processing → unloading` state machine. Each stateful service
//! (host storage writes, network requests, project list mutation) owns its
//! own instance; queues are never shared between services.
//!
//! # Examples
//!
//! ```
//! use vaultbuild_core::SerializedQueue;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> vaultbuild_core::Result<()> {
//! let queue: SerializedQueue<u32> = SerializedQueue::new("example", 1);
//! let value = queue.enqueue(|| async { Ok(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{Notify, oneshot};

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Queue state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueStatus {
    /// Nothing queued or running
    Idle,
    /// At least one operation is running
    Processing,
    /// Shut down; new work is rejected until [`SerializedQueue::reset`]
    Unloading,
}

/// One submitted operation with its response channel.
struct QueuedOperation<T> {
    run: Box<dyn FnOnce() -> BoxFuture<T> + Send>,
    respond: oneshot::Sender<Result<T>>,
}

struct QueueState<T> {
    status: QueueStatus,
    pending: VecDeque<QueuedOperation<T>>,
    in_flight: usize,
}

struct QueueInner<T> {
    name: String,
    concurrency: usize,
    state: Mutex<QueueState<T>>,
    drained: Notify,
}

impl<T> QueueInner<T> {
    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// FIFO runner that starts at most `concurrency` operations at a time.
///
/// Operations start strictly in submission order. With a concurrency of 1
/// they also complete in submission order.
pub struct SerializedQueue<T> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Send + 'static> SerializedQueue<T> {
    /// Creates a queue. A concurrency of zero is treated as one.
    #[must_use]
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                concurrency: concurrency.max(1),
                state: Mutex::new(QueueState {
                    status: QueueStatus::Idle,
                    pending: VecDeque::new(),
                    in_flight: 0,
                }),
                drained: Notify::new(),
            }),
        }
    }

    /// Submits an operation and waits for its result.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] if the queue is unloading or shut down
    /// before the operation started, or the operation's own error.
    pub async fn enqueue<F, Fut>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let (respond, response) = oneshot::channel();
        {
            let mut state = self.inner.lock();
            if state.status == QueueStatus::Unloading {
                return Err(self.shutting_down());
            }
            state.pending.push_back(QueuedOperation {
                run: Box::new(move || Box::pin(task()) as BoxFuture<T>),
                respond,
            });
            tracing::trace!(queue = %self.inner.name, pending = state.pending.len(), "Operation queued");
        }
        pump(&self.inner);

        response.await.unwrap_or_else(|_| {
            Err(Error::build(format!(
                "Operation on queue '{}' ended without a result",
                self.inner.name
            )))
        })
    }

    /// Stops accepting work and rejects every operation that has not started.
    ///
    /// Running operations finish naturally. The queue stays in
    /// [`QueueStatus::Unloading`] until [`reset`](Self::reset) is called.
    pub fn shutdown(&self) {
        let rejected: Vec<_> = {
            let mut state = self.inner.lock();
            state.status = QueueStatus::Unloading;
            state.pending.drain(..).collect()
        };
        if !rejected.is_empty() {
            tracing::debug!(queue = %self.inner.name, rejected = rejected.len(), "Rejecting queued operations");
        }
        for op in rejected {
            let _ = op.respond.send(Err(self.shutting_down()));
        }
        self.inner.drained.notify_waiters();
    }

    /// Returns an unloaded queue to service.
    pub fn reset(&self) {
        let mut state = self.inner.lock();
        if state.status == QueueStatus::Unloading {
            state.status = if state.in_flight > 0 {
                QueueStatus::Processing
            } else {
                QueueStatus::Idle
            };
        }
    }

    /// Waits until no operation is running or pending.
    pub async fn wait_idle(&self) {
        loop {
            let mut notified = std::pin::pin!(self.inner.drained.notified());
            notified.as_mut().enable();
            {
                let state = self.inner.lock();
                if state.in_flight == 0 && state.pending.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> QueueStatus {
        self.inner.lock().status
    }

    /// Number of operations waiting to start.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Number of operations currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight
    }

    /// Queue name used in logs and errors.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    fn shutting_down(&self) -> Error {
        Error::ShuttingDown {
            service: self.inner.name.clone(),
        }
    }
}

/// Decrements the in-flight count even if the operation panics.
struct InFlight<T: Send + 'static> {
    inner: Arc<QueueInner<T>>,
}

impl<T: Send + 'static> Drop for InFlight<T> {
    fn drop(&mut self) {
        let drained = {
            let mut state = self.inner.lock();
            state.in_flight = state.in_flight.saturating_sub(1);
            let drained = state.in_flight == 0 && state.pending.is_empty();
            if drained && state.status == QueueStatus::Processing {
                state.status = QueueStatus::Idle;
            }
            drained
        };
        if drained {
            self.inner.drained.notify_waiters();
        } else {
            pump(&self.inner);
        }
    }
}

fn pump<T: Send + 'static>(inner: &Arc<QueueInner<T>>) {
    loop {
        let op = {
            let mut state = inner.lock();
            if state.in_flight >= inner.concurrency {
                return;
            }
            let Some(op) = state.pending.pop_front() else {
                return;
            };
            state.in_flight += 1;
            state.status = QueueStatus::Processing;
            op
        };

        let guard = InFlight {
            inner: Arc::clone(inner),
        };
        tokio::spawn(async move {
            let _guard = guard;
            let result = (op.run)().await;
            let _ = op.respond.send(result);
        });
    }
}

impl<T> Clone for SerializedQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SerializedQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("SerializedQueue")
            .field("name", &self.inner.name)
            .field("concurrency", &self.inner.concurrency)
            .field("status", &state.status)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .finish()
    }
}
