//! Single-assignment completable future
//!
//! This module provides the core `CompletableFuture` type: a cloneable
//! handle to a shared cell that settles at most once, either with a value,
//! with an error, or by cancellation. Consumers can block on the outcome,
//! poll it, or register continuations that run when the cell settles.

use std::any::Any;
use std::fmt;
use std::panic;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use crate::error::{BoxError, FutureError, Panicked};
use crate::executor::Executor;

/// Terminal outcome of a future: the completed value or the settled error.
pub type Outcome<T> = Result<T, FutureError>;

/// A callback registered to run once the future settles.
pub(crate) type Continuation<T> = Box<dyn FnOnce(Outcome<T>) + Send>;

/// Internal state machine.
///
/// Pending holds the continuations registered so far; the settle transition
/// swaps in the outcome and takes the list in one critical section, so a
/// registration racing a settlement either lands in the flushed list or
/// observes the settled outcome. No continuation is dropped or run twice.
enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Outcome<T>),
}

/// Shared cell between all clones of a future
struct Shared<T> {
    state: Mutex<State<T>>,
    settled: Condvar,
}

/// A future that can be completed explicitly by any holder of a clone
///
/// Values and errors are handed out by clone, so `T: Clone` is required by
/// every observing operation; wrap expensive payloads in `Arc`.
pub struct CompletableFuture<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CompletableFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> CompletableFuture<T> {
    /// Create a new future in the pending state
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending(Vec::new())),
                settled: Condvar::new(),
            }),
        }
    }

    /// Create a future that is already completed with `value`
    ///
    /// No executor is involved; `get` returns immediately.
    pub fn completed(value: T) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Settled(Ok(value))),
                settled: Condvar::new(),
            }),
        }
    }

    /// Check whether the future has reached a terminal state
    /// (completed, failed or cancelled) without blocking
    pub fn is_done(&self) -> bool {
        matches!(*self.shared.state.lock().unwrap(), State::Settled(_))
    }
}

impl<T> Default for CompletableFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> CompletableFuture<T> {
    /// Perform the terminal transition and flush waiters.
    ///
    /// Exactly one caller ever wins; losers get `AlreadyCompleted`.
    /// Continuations run after the lock is released, since a continuation
    /// may touch this future again.
    pub(crate) fn settle(&self, outcome: Outcome<T>) -> Result<(), FutureError> {
        let callbacks = {
            let mut state = self.shared.state.lock().unwrap();
            match &mut *state {
                State::Pending(waiting) => {
                    let callbacks = std::mem::take(waiting);
                    match &outcome {
                        Ok(_) => tracing::trace!("future completed"),
                        Err(error) => tracing::trace!("future settled with error: {}", error),
                    }
                    *state = State::Settled(outcome.clone());
                    self.shared.settled.notify_all();
                    callbacks
                }
                State::Settled(_) => {
                    tracing::trace!("ignoring transition on settled future");
                    return Err(FutureError::AlreadyCompleted);
                }
            }
        };

        for callback in callbacks {
            callback(outcome.clone());
        }
        Ok(())
    }

    /// Fail the future with the message of a caught panic
    pub(crate) fn settle_panicked(&self, payload: Box<dyn Any + Send>) {
        let _ = self.fail(Panicked::from_payload(payload));
    }

    /// Complete the future with a value
    ///
    /// Returns `AlreadyCompleted` if the future is already terminal; the
    /// first outcome is preserved.
    pub fn complete(&self, value: T) -> Result<(), FutureError> {
        self.settle(Ok(value))
    }

    /// Fail the future, wrapping the caller's error in
    /// [`FutureError::Execution`]
    pub fn fail(&self, error: impl Into<BoxError>) -> Result<(), FutureError> {
        self.settle(Err(FutureError::Execution(Arc::from(error.into()))))
    }

    /// Cancel the future if it is still pending
    ///
    /// Returns whether cancellation took effect. A racing producer
    /// completion and a cancel have exactly one winner; cancelling a
    /// settled future is a no-op returning false.
    pub fn cancel(&self) -> bool {
        self.settle(Err(FutureError::Cancelled)).is_ok()
    }

    /// Block the calling thread until the future settles
    ///
    /// Returns the completed value, or [`FutureError::Execution`] if the
    /// future failed, or [`FutureError::Cancelled`] if it was cancelled.
    pub fn get(&self) -> Result<T, FutureError> {
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let State::Settled(outcome) = &*state {
                return outcome.clone();
            }
            state = self.shared.settled.wait(state).unwrap();
        }
    }

    /// Block until the future settles or `timeout` elapses
    ///
    /// A timeout returns [`FutureError::Timeout`] without affecting the
    /// future's state; a later `get` may still succeed.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, FutureError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().unwrap();
        loop {
            if let State::Settled(outcome) = &*state {
                return outcome.clone();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(FutureError::Timeout);
            }
            // The loop re-checks state and deadline, handling spurious wakeups
            let (next, _) = self
                .shared
                .settled
                .wait_timeout(state, deadline - now)
                .unwrap();
            state = next;
        }
    }

    /// Register a continuation to run once the future settles.
    ///
    /// If the future is already terminal the continuation runs immediately
    /// on the registering thread.
    pub(crate) fn when_settled(&self, callback: Continuation<T>) {
        let outcome = {
            let mut state = self.shared.state.lock().unwrap();
            match &mut *state {
                State::Pending(waiting) => {
                    waiting.push(callback);
                    return;
                }
                State::Settled(outcome) => outcome.clone(),
            }
        };
        callback(outcome);
    }
}

impl<T: Clone + Send + 'static> CompletableFuture<T> {
    /// Run `f` on the executor and complete the returned future with its
    /// result
    ///
    /// `f` runs exactly once. A panic inside `f` fails the future with an
    /// [`FutureError::Execution`] error wrapping the panic message.
    pub fn supply_async<F, E>(f: F, executor: &Arc<E>) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
        E: Executor + ?Sized,
    {
        let future = Self::new();
        let producer = future.clone();
        executor.execute(Box::new(move || {
            match panic::catch_unwind(panic::AssertUnwindSafe(f)) {
                Ok(value) => {
                    let _ = producer.complete(value);
                }
                Err(payload) => producer.settle_panicked(payload),
            }
        }));
        future
    }

    /// Fallible variant of [`supply_async`](Self::supply_async): an `Err`
    /// from `f` fails the future with that error
    pub fn try_supply_async<F, E>(f: F, executor: &Arc<E>) -> Self
    where
        F: FnOnce() -> Result<T, BoxError> + Send + 'static,
        E: Executor + ?Sized,
    {
        let future = Self::new();
        let producer = future.clone();
        executor.execute(Box::new(move || {
            match panic::catch_unwind(panic::AssertUnwindSafe(f)) {
                Ok(Ok(value)) => {
                    let _ = producer.complete(value);
                }
                Ok(Err(error)) => {
                    let _ = producer.fail(error);
                }
                Err(payload) => producer.settle_panicked(payload),
            }
        }));
        future
    }
}

impl<T: Clone> std::future::Future for CompletableFuture<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.shared.state.lock().unwrap();
        match &mut *state {
            State::Settled(outcome) => Poll::Ready(outcome.clone()),
            State::Pending(waiting) => {
                // Register the task waker as a continuation
                let waker = cx.waker().clone();
                waiting.push(Box::new(move |_| waker.wake()));
                Poll::Pending
            }
        }
    }
}

impl<T> fmt::Debug for CompletableFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.state.lock().unwrap() {
            State::Pending(_) => "Pending",
            State::Settled(Ok(_)) => "Completed",
            State::Settled(Err(FutureError::Cancelled)) => "Cancelled",
            State::Settled(Err(_)) => "Failed",
        };
        f.debug_struct("CompletableFuture")
            .field("state", &state)
            .finish()
    }
}
