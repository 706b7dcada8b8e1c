//! completable: a single-assignment completable future
//!
//! This crate provides an in-process future/promise primitive with:
//! - Explicit completion: the producer calls [`CompletableFuture::complete`],
//!   [`CompletableFuture::fail`] or [`CompletableFuture::cancel`]
//! - Blocking wait with an optional timeout
//! - Non-blocking continuations and functional composition
//!   (`then_apply`, `then_compose`, `then_combine`, `handle`, ...)
//! - An injected [`Executor`] abstraction for asynchronous execution
//!
//! The future is a cloneable handle; the producer and any number of
//! consumers hold clones of the same underlying cell. Exactly one terminal
//! transition (complete, fail or cancel) ever takes effect, and every
//! registered continuation observes that same outcome exactly once.
//!
//! ## Examples
//!
//! Asynchronous supply and chaining on a thread pool:
//!
//! ```rust
//! use completable::{CompletableFuture, ThreadPool};
//! use std::sync::Arc;
//!
//! let pool = Arc::new(ThreadPool::new(2));
//!
//! let greeting = CompletableFuture::supply_async(|| "Hello".to_string(), &pool)
//!     .then_apply(|s| s + " World");
//!
//! assert_eq!(greeting.get().unwrap(), "Hello World");
//! ```
//!
//! Explicit completion from another thread:
//!
//! ```rust
//! use completable::CompletableFuture;
//!
//! let future = CompletableFuture::new();
//! let producer = future.clone();
//! std::thread::spawn(move || {
//!     producer.complete("Hello".to_string()).unwrap();
//! });
//! assert_eq!(future.get().unwrap(), "Hello");
//! ```
//!
//! Recovering from a failure with [`CompletableFuture::handle`]:
//!
//! ```rust
//! use completable::CompletableFuture;
//!
//! let future: CompletableFuture<String> = CompletableFuture::new();
//! future.fail("computation error").unwrap();
//!
//! let recovered = future.handle(|outcome| match outcome {
//!     Ok(value) => value,
//!     Err(_) => "Hello, Stranger!".to_string(),
//! });
//! assert_eq!(recovered.get().unwrap(), "Hello, Stranger!");
//! ```

#![deny(warnings)]

pub mod combinators;
pub mod executor;
pub mod future;

// Re-export core types
pub use combinators::all_of;
pub use error::{BoxError, FutureError, Panicked};
pub use executor::{DirectExecutor, Executor, Job, ThreadPool};
pub use future::{CompletableFuture, Outcome};

/// Error types for the library
pub mod error {
    use std::any::Any;
    use std::sync::Arc;
    use thiserror::Error;

    /// Failure payload accepted by [`fail`](crate::CompletableFuture::fail).
    pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

    /// The only error kinds that cross the API boundary.
    ///
    /// `Execution` and `Cancelled` are stored in the future and handed to
    /// every observer; `AlreadyCompleted` and `Timeout` are returned to the
    /// caller that provoked them and never alter the future's state.
    #[derive(Error, Debug, Clone)]
    pub enum FutureError {
        /// A second terminal transition was attempted on a settled future.
        #[error("future already completed")]
        AlreadyCompleted,

        /// The computation failed; wraps the original error.
        #[error("computation failed: {0}")]
        Execution(Arc<dyn std::error::Error + Send + Sync>),

        /// The future was cancelled before it completed.
        #[error("future was cancelled")]
        Cancelled,

        /// The deadline passed before the future settled.
        #[error("timed out waiting for the future to settle")]
        Timeout,
    }

    /// Captured message of a panic that escaped an asynchronous computation
    /// or a continuation callback.
    #[derive(Error, Debug)]
    #[error("task panicked: {0}")]
    pub struct Panicked(pub String);

    impl Panicked {
        /// Extract a printable message from a `catch_unwind` payload.
        pub fn from_payload(payload: Box<dyn Any + Send>) -> Self {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic payload".to_string()
            };
            Panicked(message)
        }
    }
}
