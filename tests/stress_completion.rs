//! Stress tests interleaving completion, registration and blocking waits
//! across threads

mod common;

use completable::{CompletableFuture, FutureError};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn registration_racing_completion_runs_every_continuation_once() {
    common::setup_tracing();

    for _ in 0..500 {
        let future: CompletableFuture<u32> = CompletableFuture::new();
        let calls = Arc::new(AtomicU32::new(0));

        let producer = future.clone();
        let completer = thread::spawn(move || {
            producer.complete(7).unwrap();
        });

        // Register continuations while the completer races us
        const CONTINUATIONS: u32 = 16;
        let mut stages = Vec::new();
        for _ in 0..CONTINUATIONS {
            let calls = Arc::clone(&calls);
            stages.push(future.then_accept(move |value| {
                assert_eq!(value, 7);
                calls.fetch_add(1, Ordering::SeqCst);
            }));
        }

        completer.join().unwrap();
        for stage in stages {
            stage.get().unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), CONTINUATIONS);
    }
}

#[test]
fn concurrent_terminal_transitions_have_exactly_one_winner() {
    for _ in 0..200 {
        let future: CompletableFuture<u32> = CompletableFuture::new();

        let handles = [
            {
                let future = future.clone();
                thread::spawn(move || future.complete(1).is_ok())
            },
            {
                let future = future.clone();
                thread::spawn(move || future.fail("loser or winner").is_ok())
            },
            {
                let future = future.clone();
                thread::spawn(move || future.cancel())
            },
        ];

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1, "exactly one transition must take effect");
        assert!(future.is_done());
    }
}

#[test]
fn many_blocked_getters_observe_the_same_value() {
    let future: CompletableFuture<String> = CompletableFuture::new();

    let getters: Vec<_> = (0..8)
        .map(|_| {
            let future = future.clone();
            thread::spawn(move || future.get().unwrap())
        })
        .collect();

    let producer = future.clone();
    thread::spawn(move || {
        producer.complete("shared value".to_string()).unwrap();
    });

    for getter in getters {
        assert_eq!(getter.join().unwrap(), "shared value");
    }
}

#[test]
fn chains_built_under_concurrent_completion_settle_consistently() {
    for _ in 0..200 {
        let future: CompletableFuture<u32> = CompletableFuture::new();

        let producer = future.clone();
        let completer = thread::spawn(move || {
            let _ = producer.complete(5);
        });

        let canceller = future.clone();
        let racer = thread::spawn(move || {
            let _ = canceller.cancel();
        });

        let chained = future.then_apply(|v| v * 2).handle(|outcome| match outcome {
            Ok(value) => value,
            Err(FutureError::Cancelled) => 0,
            Err(_) => u32::MAX,
        });

        completer.join().unwrap();
        racer.join().unwrap();

        // Whichever transition won, the chain settles to a coherent value
        let value = chained.get().unwrap();
        assert!(value == 10 || value == 0, "unexpected chain value {}", value);
    }
}
