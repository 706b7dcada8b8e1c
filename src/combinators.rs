//! Composition operators for `CompletableFuture`
//!
//! Every operator returns a new future and never blocks the calling
//! thread. A failed or cancelled input short-circuits downstream stages
//! without invoking their callbacks, propagating the same error, until
//! intercepted by [`CompletableFuture::handle`]. A callback that panics
//! fails the downstream future.
//!
//! Each operator exists in two flavors: the plain flavor runs the callback
//! on whichever thread triggers completion (or on the registering thread
//! if the input is already settled), and the `_async` flavor submits the
//! callback to an injected [`Executor`] instead.

use std::panic;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::FutureError;
use crate::executor::{Executor, Job};
use crate::future::{CompletableFuture, Outcome};

/// Where a continuation callback runs once the input future settles
#[derive(Clone)]
enum Dispatch {
    /// Inline, on the thread that performs the completing transition
    CompletingThread,
    /// Submitted to the given executor
    Executor(Arc<dyn Executor>),
}

impl Dispatch {
    fn run(&self, job: Job) {
        match self {
            Dispatch::CompletingThread => job(),
            Dispatch::Executor(executor) => executor.execute(job),
        }
    }
}

/// Type-erase any executor handle so the dispatch enum can store it.
fn erase<E>(executor: &Arc<E>) -> Arc<dyn Executor>
where
    E: Executor + ?Sized + 'static,
{
    struct Forward<E: ?Sized>(Arc<E>);

    impl<E: Executor + ?Sized> Executor for Forward<E> {
        fn execute(&self, job: Job) {
            self.0.execute(job);
        }
    }

    Arc::new(Forward(Arc::clone(executor)))
}

/// Pending inputs of a two-future combination.
///
/// The merge function fires exactly once, when the second value lands,
/// whichever input that is.
struct Both<T, U, F> {
    left: Option<T>,
    right: Option<U>,
    merge: Option<F>,
}

impl<T, U, F> Both<T, U, F> {
    fn take_if_ready(&mut self) -> Option<(F, T, U)> {
        if self.left.is_some() && self.right.is_some() {
            Some((self.merge.take()?, self.left.take()?, self.right.take()?))
        } else {
            None
        }
    }
}

fn apply_outcome<T, U, F>(outcome: Outcome<T>, f: F, result: &CompletableFuture<U>)
where
    U: Clone,
    F: FnOnce(T) -> U,
{
    match outcome {
        Ok(value) => match panic::catch_unwind(panic::AssertUnwindSafe(move || f(value))) {
            Ok(mapped) => {
                let _ = result.settle(Ok(mapped));
            }
            Err(payload) => result.settle_panicked(payload),
        },
        Err(error) => {
            let _ = result.settle(Err(error));
        }
    }
}

fn compose_outcome<T, U, F>(outcome: Outcome<T>, f: F, result: &CompletableFuture<U>)
where
    U: Clone + Send + 'static,
    F: FnOnce(T) -> CompletableFuture<U>,
{
    match outcome {
        Ok(value) => match panic::catch_unwind(panic::AssertUnwindSafe(move || f(value))) {
            Ok(inner) => {
                // Adopt the inner future's eventual outcome
                let result = result.clone();
                inner.when_settled(Box::new(move |inner_outcome| {
                    let _ = result.settle(inner_outcome);
                }));
            }
            Err(payload) => result.settle_panicked(payload),
        },
        Err(error) => {
            let _ = result.settle(Err(error));
        }
    }
}

fn handle_outcome<T, U, F>(outcome: Outcome<T>, f: F, result: &CompletableFuture<U>)
where
    U: Clone,
    F: FnOnce(Outcome<T>) -> U,
{
    match panic::catch_unwind(panic::AssertUnwindSafe(move || f(outcome))) {
        Ok(value) => {
            let _ = result.settle(Ok(value));
        }
        Err(payload) => result.settle_panicked(payload),
    }
}

fn merge_outcome<T, U, V, F>(merge: F, left: T, right: U, result: &CompletableFuture<V>)
where
    V: Clone,
    F: FnOnce(T, U) -> V,
{
    match panic::catch_unwind(panic::AssertUnwindSafe(move || merge(left, right))) {
        Ok(value) => {
            let _ = result.settle(Ok(value));
        }
        Err(payload) => result.settle_panicked(payload),
    }
}

impl<T: Clone + Send + 'static> CompletableFuture<T> {
    fn apply_via<U, F>(&self, f: F, dispatch: Dispatch) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        let downstream = CompletableFuture::new();
        let result = downstream.clone();
        self.when_settled(Box::new(move |outcome| {
            dispatch.run(Box::new(move || apply_outcome(outcome, f, &result)));
        }));
        downstream
    }

    fn compose_via<U, F>(&self, f: F, dispatch: Dispatch) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<U> + Send + 'static,
    {
        let downstream = CompletableFuture::new();
        let result = downstream.clone();
        self.when_settled(Box::new(move |outcome| {
            dispatch.run(Box::new(move || compose_outcome(outcome, f, &result)));
        }));
        downstream
    }

    fn handle_via<U, F>(&self, f: F, dispatch: Dispatch) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        let downstream = CompletableFuture::new();
        let result = downstream.clone();
        self.when_settled(Box::new(move |outcome| {
            dispatch.run(Box::new(move || handle_outcome(outcome, f, &result)));
        }));
        downstream
    }

    fn combine_via<U, V, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
        dispatch: Dispatch,
    ) -> CompletableFuture<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        let downstream = CompletableFuture::new();
        let both = Arc::new(Mutex::new(Both {
            left: None,
            right: None,
            merge: Some(f),
        }));

        {
            let result = downstream.clone();
            let both = Arc::clone(&both);
            let dispatch = dispatch.clone();
            self.when_settled(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut both = both.lock().unwrap();
                        both.left = Some(value);
                        both.take_if_ready()
                    };
                    if let Some((merge, left, right)) = ready {
                        dispatch.run(Box::new(move || {
                            merge_outcome(merge, left, right, &result);
                        }));
                    }
                }
                // First observed failure wins; a losing settle is ignored
                Err(error) => {
                    let _ = result.settle(Err(error));
                }
            }));
        }
        {
            let result = downstream.clone();
            let both = Arc::clone(&both);
            other.when_settled(Box::new(move |outcome| match outcome {
                Ok(value) => {
                    let ready = {
                        let mut both = both.lock().unwrap();
                        both.right = Some(value);
                        both.take_if_ready()
                    };
                    if let Some((merge, left, right)) = ready {
                        dispatch.run(Box::new(move || {
                            merge_outcome(merge, left, right, &result);
                        }));
                    }
                }
                Err(error) => {
                    let _ = result.settle(Err(error));
                }
            }));
        }

        downstream
    }

    /// Map the completed value through `f`
    ///
    /// Propagates the input's failure or cancellation without running `f`;
    /// a panic inside `f` fails the returned future.
    pub fn then_apply<U, F>(&self, f: F) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.apply_via(f, Dispatch::CompletingThread)
    }

    /// [`then_apply`](Self::then_apply), with `f` running on `executor`
    pub fn then_apply_async<U, F, E>(&self, f: F, executor: &Arc<E>) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.apply_via(f, Dispatch::Executor(erase(executor)))
    }

    /// Consume the completed value
    pub fn then_accept<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
    {
        self.apply_via(move |value| f(value), Dispatch::CompletingThread)
    }

    /// [`then_accept`](Self::then_accept), with `f` running on `executor`
    pub fn then_accept_async<F, E>(&self, f: F, executor: &Arc<E>) -> CompletableFuture<()>
    where
        F: FnOnce(T) + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.apply_via(move |value| f(value), Dispatch::Executor(erase(executor)))
    }

    /// Run `f` once the future completes, ignoring its value
    ///
    /// Failure and cancellation still propagate; `f` runs on success only.
    pub fn then_run<F>(&self, f: F) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.apply_via(move |_| f(), Dispatch::CompletingThread)
    }

    /// [`then_run`](Self::then_run), with `f` running on `executor`
    pub fn then_run_async<F, E>(&self, f: F, executor: &Arc<E>) -> CompletableFuture<()>
    where
        F: FnOnce() + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.apply_via(move |_| f(), Dispatch::Executor(erase(executor)))
    }

    /// Chain a dependent asynchronous step: `f` returns a future, and the
    /// returned future adopts its eventual outcome (flattening)
    pub fn then_compose<U, F>(&self, f: F) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<U> + Send + 'static,
    {
        self.compose_via(f, Dispatch::CompletingThread)
    }

    /// [`then_compose`](Self::then_compose), with `f` running on `executor`
    pub fn then_compose_async<U, F, E>(&self, f: F, executor: &Arc<E>) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> CompletableFuture<U> + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.compose_via(f, Dispatch::Executor(erase(executor)))
    }

    /// Merge the values of two independent futures once both complete
    ///
    /// If either input fails or is cancelled, the first observed error
    /// settles the returned future; there is no ordering guarantee between
    /// the two inputs.
    pub fn then_combine<U, V, F>(&self, other: &CompletableFuture<U>, f: F) -> CompletableFuture<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
    {
        self.combine_via(other, f, Dispatch::CompletingThread)
    }

    /// [`then_combine`](Self::then_combine), with `f` running on `executor`
    pub fn then_combine_async<U, V, F, E>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
        executor: &Arc<E>,
    ) -> CompletableFuture<V>
    where
        U: Clone + Send + 'static,
        V: Clone + Send + 'static,
        F: FnOnce(T, U) -> V + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.combine_via(other, f, Dispatch::Executor(erase(executor)))
    }

    /// Like [`then_combine`](Self::then_combine), but the merge function
    /// consumes the values
    pub fn then_accept_both<U, F>(
        &self,
        other: &CompletableFuture<U>,
        f: F,
    ) -> CompletableFuture<()>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T, U) + Send + 'static,
    {
        self.combine_via(other, move |a, b| f(a, b), Dispatch::CompletingThread)
    }

    /// Observe the terminal outcome, whatever it is
    ///
    /// `f` runs exactly once with the settled `Result`, on success,
    /// failure and cancellation alike, and the returned future completes
    /// with its return value. This is the sole recovery point for a failed
    /// chain.
    pub fn handle<U, F>(&self, f: F) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
    {
        self.handle_via(f, Dispatch::CompletingThread)
    }

    /// [`handle`](Self::handle), with `f` running on `executor`
    pub fn handle_async<U, F, E>(&self, f: F, executor: &Arc<E>) -> CompletableFuture<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> U + Send + 'static,
        E: Executor + ?Sized + 'static,
    {
        self.handle_via(f, Dispatch::Executor(erase(executor)))
    }
}

/// Wait for every input to reach a terminal state
///
/// The returned future completes once all inputs are terminal. If any
/// input failed or was cancelled, the first observed error settles the
/// result; the remaining errors are not reported. An empty input set
/// completes immediately.
pub fn all_of<T, I>(futures: I) -> CompletableFuture<()>
where
    T: Clone + Send + 'static,
    I: IntoIterator<Item = CompletableFuture<T>>,
{
    let inputs: Vec<_> = futures.into_iter().collect();
    let downstream = CompletableFuture::new();

    if inputs.is_empty() {
        let _ = downstream.complete(());
        return downstream;
    }

    let remaining = Arc::new(AtomicUsize::new(inputs.len()));
    let first_error = Arc::new(Mutex::new(None::<FutureError>));

    for input in &inputs {
        let result = downstream.clone();
        let remaining = Arc::clone(&remaining);
        let first_error = Arc::clone(&first_error);
        input.when_settled(Box::new(move |outcome| {
            if let Err(error) = outcome {
                let mut slot = first_error.lock().unwrap();
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
            // The last input to settle resolves the result
            if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                match first_error.lock().unwrap().take() {
                    Some(error) => {
                        let _ = result.settle(Err(error));
                    }
                    None => {
                        let _ = result.complete(());
                    }
                }
            }
        }));
    }

    downstream
}
