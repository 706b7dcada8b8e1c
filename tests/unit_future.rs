//! Core API tests: creation, explicit completion, blocking wait, failure

mod common;

use completable::{CompletableFuture, FutureError, ThreadPool};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn completed_future_returns_immediately() {
    let future = CompletableFuture::completed("Hello".to_string());
    assert_eq!(future.get().unwrap(), "Hello");
}

#[test]
fn get_waits_for_asynchronous_completion() {
    common::setup_tracing();

    let future = CompletableFuture::new();
    let producer = future.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        producer.complete("Hello".to_string()).unwrap();
    });

    assert_eq!(future.get().unwrap(), "Hello");
}

#[test]
fn supply_async_completes_with_the_return_value() {
    let pool = Arc::new(ThreadPool::new(2));
    let future = CompletableFuture::supply_async(|| "Hello".to_string(), &pool);
    assert_eq!(future.get().unwrap(), "Hello");
}

#[test]
fn supply_async_never_runs_on_the_caller_thread() {
    let pool = Arc::new(ThreadPool::new(1));
    let caller = thread::current().id();
    let future = CompletableFuture::supply_async(move || thread::current().id() != caller, &pool);
    assert!(future.get().unwrap());
}

#[test]
fn second_completion_is_rejected_and_first_value_preserved() {
    let future = CompletableFuture::new();
    future.complete("first".to_string()).unwrap();

    assert!(matches!(
        future.complete("second".to_string()),
        Err(FutureError::AlreadyCompleted)
    ));
    assert!(matches!(
        future.fail("late failure"),
        Err(FutureError::AlreadyCompleted)
    ));
    assert_eq!(future.get().unwrap(), "first");
}

#[test]
fn failed_future_surfaces_a_wrapped_execution_error() {
    let future: CompletableFuture<String> = CompletableFuture::new();
    future.fail("calculation failed").unwrap();

    match future.get() {
        Err(FutureError::Execution(cause)) => {
            assert_eq!(cause.to_string(), "calculation failed");
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
}

#[test]
fn try_supply_async_failure_fails_the_future() {
    let pool = Arc::new(ThreadPool::new(1));
    let future: CompletableFuture<String> =
        CompletableFuture::try_supply_async(|| Err("no data".into()), &pool);

    assert!(matches!(future.get(), Err(FutureError::Execution(_))));
}

#[test]
fn panicking_supplier_fails_the_future() {
    let pool = Arc::new(ThreadPool::new(1));
    let future: CompletableFuture<String> =
        CompletableFuture::supply_async(|| panic!("supplier exploded"), &pool);

    match future.get() {
        Err(FutureError::Execution(cause)) => {
            assert!(cause.to_string().contains("supplier exploded"));
        }
        other => panic!("expected an execution error, got {:?}", other),
    }
}

#[test]
fn get_timeout_expires_without_altering_the_future() {
    let future: CompletableFuture<i32> = CompletableFuture::new();

    assert!(matches!(
        future.get_timeout(Duration::from_millis(50)),
        Err(FutureError::Timeout)
    ));
    assert!(!future.is_done());

    // A later completion is still observable
    future.complete(7).unwrap();
    assert_eq!(future.get_timeout(Duration::from_millis(50)).unwrap(), 7);
}

#[test]
fn get_timeout_returns_early_when_completed_in_time() {
    let future = CompletableFuture::new();
    let producer = future.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.complete(99).unwrap();
    });

    assert_eq!(future.get_timeout(Duration::from_secs(5)).unwrap(), 99);
}

#[test]
fn is_done_is_true_for_every_terminal_state() {
    let completed = CompletableFuture::completed(1);
    assert!(completed.is_done());

    let failed: CompletableFuture<i32> = CompletableFuture::new();
    failed.fail("boom").unwrap();
    assert!(failed.is_done());

    let cancelled: CompletableFuture<i32> = CompletableFuture::new();
    assert!(cancelled.cancel());
    assert!(cancelled.is_done());
}

#[test]
fn clones_observe_the_same_outcome() {
    let future = CompletableFuture::new();
    let observer = future.clone();
    let producer = future.clone();

    producer.complete("shared".to_string()).unwrap();

    assert_eq!(future.get().unwrap(), "shared");
    assert_eq!(observer.get().unwrap(), "shared");
}
