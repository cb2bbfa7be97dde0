use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cascade_rs::prelude::*;
use parking_lot::Mutex;

fn wait_for(mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        assert!(
            start.elapsed() < Duration::from_secs(10),
            "condition not reached in time"
        );
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn fulfils_in_deadline_order_at_or_after_deadline() {
    let delay = Delay::new().unwrap();
    let delays_ms = [30u64, 20, 5, 25, 10];

    let results = Arc::new(Mutex::new(Vec::new()));
    let remaining = Arc::new(AtomicUsize::new(delays_ms.len()));
    let start = Instant::now();

    for &ms in &delays_ms {
        let results = results.clone();
        let remaining = remaining.clone();
        delay
            .after(Duration::from_millis(ms))
            .then_run(move || {
                assert!(start.elapsed() >= Duration::from_millis(ms));
                results.lock().push(ms);
                remaining.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
    }

    wait_for(|| remaining.load(Ordering::SeqCst) == 0);

    let results = results.lock();
    assert_eq!(results.len(), delays_ms.len());
    let mut sorted = results.clone();
    sorted.sort_unstable();
    assert_eq!(*results, sorted);
}

#[test]
fn cancel_rejects_with_sentinel() {
    let delay = Delay::new().unwrap();

    let fulfilled = Arc::new(AtomicUsize::new(0));
    let cancelled = Arc::new(AtomicUsize::new(0));
    let remaining = Arc::new(AtomicUsize::new(4));

    let mut promises = Vec::new();
    for _ in 0..4 {
        let p = delay.after(Duration::from_millis(200));
        let fulfilled = fulfilled.clone();
        let cancelled = cancelled.clone();
        let remaining = remaining.clone();
        let remaining2 = remaining.clone();
        p.then_except(
            move |_: ()| {
                fulfilled.fetch_add(1, Ordering::SeqCst);
                remaining.fetch_sub(1, Ordering::SeqCst);
            },
            move |e| {
                assert!(e.is::<Cancelled>());
                cancelled.fetch_add(1, Ordering::SeqCst);
                remaining2.fetch_sub(1, Ordering::SeqCst);
            },
        )
        .unwrap();
        promises.push(p);
    }

    assert!(delay.cancel(&promises[1]));
    assert!(delay.cancel(&promises[2]));
    // Already removed: a second cancel finds nothing.
    assert!(!delay.cancel(&promises[1]));
    // Unknown promise.
    assert!(!delay.cancel(&Promise::new()));

    wait_for(|| remaining.load(Ordering::SeqCst) == 0);
    assert_eq!(fulfilled.load(Ordering::SeqCst), 2);
    assert_eq!(cancelled.load(Ordering::SeqCst), 2);
}

#[test]
fn cancel_with_custom_rejection() {
    #[derive(Debug, thiserror::Error)]
    #[error("gave up")]
    struct GaveUp;

    let delay = Delay::new().unwrap();
    let p = delay.after(Duration::from_millis(500));

    let caught = Arc::new(AtomicUsize::new(0));
    let c = caught.clone();
    p.except(move |e| {
        assert!(e.is::<GaveUp>());
        assert!(!e.is::<Cancelled>());
        c.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();

    assert!(delay.cancel_with(&p, Rejection::new(GaveUp)));
    wait_for(|| caught.load(Ordering::SeqCst) == 1);
}

#[test]
fn shutdown_rejects_outstanding_entries() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    {
        let delay = Delay::new().unwrap();
        for _ in 0..3 {
            let c = cancelled.clone();
            delay
                .after(Duration::from_secs(60))
                .except(move |e| {
                    assert!(e.is::<Cancelled>());
                    c.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
    }
    assert_eq!(cancelled.load(Ordering::SeqCst), 3);
}

#[test]
fn chained_work_runs_after_the_deadline() {
    let delay = Delay::new().unwrap();
    let result = Arc::new(AtomicUsize::new(0));
    let r = result.clone();
    delay
        .after(Duration::from_millis(10))
        .then_run(|| 21usize)
        .unwrap()
        .then(move |x: usize| {
            r.store(x * 2, Ordering::SeqCst);
        })
        .unwrap();

    wait_for(|| result.load(Ordering::SeqCst) == 42);
}
