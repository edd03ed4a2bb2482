// Copyright (c) 2025 R3BL LLC. Licensed under Apache License, Version 2.0.

//! Behavior suite run against all three mutex variants through [`AsyncMutex`]. The
//! variants differ only in how they protect their internal queue, so every contract
//! test here must pass for each of them unchanged.

use std::{sync::{Arc, Mutex as StdMutex},
          time::Duration};

use pretty_assertions::assert_eq;
use serial_test::serial;
use test_case::test_case;
use tokio_util::sync::CancellationToken;

use crate::{AsyncMutex, MonitorMutex, SemaphoreMutex, SpinCasMutex, SyncError};

fn make_mutex(variant: &str) -> Arc<dyn AsyncMutex> {
    match variant {
        "spin_cas" => Arc::new(SpinCasMutex::new()),
        "monitor" => Arc::new(MonitorMutex::new()),
        "semaphore" => Arc::new(SemaphoreMutex::new()),
        other => panic!("unknown mutex variant {other}"),
    }
}

/// Returns a token that fires after `duration` (the caller-composed replacement for
/// first-class timeouts).
fn cancel_after(duration: Duration) -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(duration).await;
        trigger.cancel();
    });
    token
}

/// Mutual exclusion under contention: 20 tasks, each performing 1000
/// lock/increment/release cycles on a shared integer; the final value must be exactly
/// `20 * 1000`. The read-yield-write inside the critical section makes lost updates
/// all but certain if two holders ever coexist.
#[test_case("spin_cas"; "spin_cas_variant")]
#[test_case("monitor"; "monitor_variant")]
#[test_case("semaphore"; "semaphore_variant")]
#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
#[serial]
async fn contended_increments_are_exact(variant: &str) {
    const TASK_COUNT: usize = 20;
    const CYCLES_PER_TASK: usize = 1000;

    let mutex = make_mutex(variant);
    let value = Arc::new(StdMutex::new(0_u64));

    let tasks: Vec<_> = (0..TASK_COUNT)
        .map(|_| {
            let mutex = Arc::clone(&mutex);
            let value = Arc::clone(&value);
            tokio::spawn(async move {
                let cancel = CancellationToken::new();
                for _ in 0..CYCLES_PER_TASK {
                    let guard = mutex.lock(&cancel).await.unwrap();
                    let current = *value.lock().unwrap();
                    tokio::task::yield_now().await;
                    *value.lock().unwrap() = current + 1;
                    drop(guard);
                }
            })
        })
        .collect();

    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*value.lock().unwrap(), (TASK_COUNT * CYCLES_PER_TASK) as u64);
}

/// Double-take blocks: while held, `try_lock` fails and a second `lock` with a
/// deadline-composed token raises `Cancelled`; after the original release, a pending
/// acquirer completes promptly.
#[test_case("spin_cas"; "spin_cas_variant")]
#[test_case("monitor"; "monitor_variant")]
#[test_case("semaphore"; "semaphore_variant")]
#[tokio::test]
async fn double_take_blocks_until_release(variant: &str) {
    let mutex = make_mutex(variant);

    let holder = mutex.lock(&CancellationToken::new()).await.unwrap();
    assert!(mutex.try_lock().is_none());

    let timed_out = mutex.lock(&cancel_after(Duration::from_millis(100))).await;
    assert!(matches!(timed_out, Err(SyncError::Cancelled)));

    let pending = {
        let mutex = Arc::clone(&mutex);
        tokio::spawn(async move { mutex.lock(&CancellationToken::new()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    drop(holder);
    let acquired = tokio::time::timeout(Duration::from_secs(1), pending)
        .await
        .expect("pending acquirer must complete within the deadline")
        .unwrap();
    assert!(acquired.is_ok());
}

/// Handle idempotence across variants: N closes produce exactly one effective
/// release.
#[test_case("spin_cas"; "spin_cas_variant")]
#[test_case("monitor"; "monitor_variant")]
#[test_case("semaphore"; "semaphore_variant")]
#[tokio::test]
async fn n_closes_release_once(variant: &str) {
    let mutex = make_mutex(variant);

    let mut guard = mutex.lock(&CancellationToken::new()).await.unwrap();
    for _ in 0..5 {
        guard.close();
    }
    assert!(guard.is_released());

    // If the releases compounded, the semaphore variant would now hold spare
    // permits; a take-then-retake probe catches that.
    let reacquired = mutex.try_lock().unwrap();
    assert!(mutex.try_lock().is_none());
    drop(reacquired);
}

/// Strict FIFO among suspended acquirers (queue variants only; the semaphore variant
/// delegates its ordering to tokio's semaphore).
#[test_case("spin_cas"; "spin_cas_variant")]
#[test_case("monitor"; "monitor_variant")]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn suspended_acquirers_complete_in_arrival_order(variant: &str) {
    const WAITER_COUNT: usize = 5;

    let mutex = make_mutex(variant);
    let order = Arc::new(StdMutex::new(Vec::<usize>::new()));

    let holder = mutex.lock(&CancellationToken::new()).await.unwrap();

    let mut waiters = Vec::with_capacity(WAITER_COUNT);
    for index in 0..WAITER_COUNT {
        let mutex = Arc::clone(&mutex);
        let order = Arc::clone(&order);
        waiters.push(tokio::spawn(async move {
            let guard = mutex.lock(&CancellationToken::new()).await.unwrap();
            order.lock().unwrap().push(index);
            drop(guard);
        }));
        // Stagger arrivals so suspension order is the spawn order.
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    drop(holder);
    for waiter in waiters {
        waiter.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), (0..WAITER_COUNT).collect::<Vec<_>>());
}
