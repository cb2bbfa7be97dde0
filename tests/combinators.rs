use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;

use cascade_rs::prelude::*;

#[derive(Debug, thiserror::Error)]
#[error("input failed")]
struct InputFailed;

#[test]
fn all_fulfils_with_positional_values() {
    let a = Promise::new();
    let b = Promise::new();
    let c = Promise::new();

    let result = Arc::new(AtomicI32::new(0));
    let r = result.clone();
    Promise::all([a.clone(), b.clone(), c.clone()])
        .unwrap()
        .then_tuple(move |(x, y, s): (i32, i32, String)| {
            r.store(x + y + s.len() as i32, Ordering::SeqCst);
        })
        .unwrap();

    // Settlement order must not affect positions.
    a.settle(1).unwrap();
    c.settle("foo".to_string()).unwrap();
    b.settle(2).unwrap();

    assert_eq!(result.load(Ordering::SeqCst), 6);
}

#[test]
fn all_recomposes_homogeneous_sequence() {
    let inputs: Vec<Promise> = (0..4).map(|_| Promise::new()).collect();
    let result = Arc::new(AtomicI32::new(0));
    let r = result.clone();
    Promise::all(inputs.iter().cloned())
        .unwrap()
        .then_seq(move |values: Vec<i32>| {
            r.store(values.iter().sum(), Ordering::SeqCst);
        })
        .unwrap();

    // Reverse order; positions still follow input order.
    for (i, p) in inputs.iter().enumerate().rev() {
        p.settle(i as i32 * 10).unwrap();
    }
    assert_eq!(result.load(Ordering::SeqCst), 60);
}

#[test]
fn all_rejects_with_first_rejection_only() {
    let a = Promise::new();
    let b = Promise::new();

    let caught = Arc::new(AtomicUsize::new(0));
    let c = caught.clone();
    Promise::all([a.clone(), b.clone()])
        .unwrap()
        .except(move |e| {
            assert!(e.is::<InputFailed>());
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    a.reject(Rejection::new(InputFailed)).unwrap();
    assert_eq!(caught.load(Ordering::SeqCst), 1);

    // A later fulfilment is absorbed without a second settlement.
    b.settle(1).unwrap();
    assert_eq!(caught.load(Ordering::SeqCst), 1);
}

#[test]
fn all_of_nothing_fulfils_with_empty_sequence() {
    let seen = Arc::new(AtomicUsize::new(usize::MAX));
    let s = seen.clone();
    Promise::all(std::iter::empty())
        .unwrap()
        .then_seq(move |values: Vec<i32>| {
            s.store(values.len(), Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 0);
}

#[test]
fn any_takes_the_first_fulfilment() {
    let a = Promise::new();
    let b = Promise::new();

    let result = Arc::new(AtomicI32::new(0));
    let r = result.clone();
    let combined = Promise::any([a.clone(), b.clone()]).unwrap();
    combined
        .then(move |v: i32| {
            r.store(v, Ordering::SeqCst);
        })
        .unwrap();

    // One rejection does not decide the race.
    a.reject(Rejection::new(InputFailed)).unwrap();
    assert!(!combined.settled());

    b.settle(7).unwrap();
    assert_eq!(result.load(Ordering::SeqCst), 7);
}

#[test]
fn any_forwards_only_one_winner() {
    let a = Promise::new();
    let b = Promise::new();

    let winners = Arc::new(AtomicUsize::new(0));
    let w = winners.clone();
    Promise::any([a.clone(), b.clone()])
        .unwrap()
        .then(move |_: i32| {
            w.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    a.settle(1).unwrap();
    b.settle(2).unwrap();
    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[test]
fn any_rejects_empty_once_every_input_rejected() {
    let a = Promise::new();
    let b = Promise::new();

    let caught = Arc::new(AtomicUsize::new(0));
    let c = caught.clone();
    Promise::any([a.clone(), b.clone()])
        .unwrap()
        .except(move |e| {
            assert!(e.is_empty());
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    a.reject(Rejection::new(InputFailed)).unwrap();
    assert_eq!(caught.load(Ordering::SeqCst), 0);
    b.reject(Rejection::new(InputFailed)).unwrap();
    assert_eq!(caught.load(Ordering::SeqCst), 1);
}

#[test]
fn any_of_nothing_rejects_with_empty_rejection() {
    let caught = Arc::new(AtomicUsize::new(0));
    let c = caught.clone();
    Promise::any(std::iter::empty())
        .unwrap()
        .except(move |e| {
            assert!(e.is_empty());
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    assert_eq!(caught.load(Ordering::SeqCst), 1);
}

#[test]
fn all_over_pool_results() {
    let pool = ThreadPool::with_config(Config::builder().num_threads(4).build().unwrap())
        .unwrap();

    let inputs: Vec<Promise> = (0..8).map(|i| pool.post(move || i as i32)).collect();
    let result = Arc::new(AtomicI32::new(0));
    let r = result.clone();
    let combined = Promise::all(inputs).unwrap();
    combined
        .then_seq(move |values: Vec<i32>| {
            r.store(values.iter().sum(), Ordering::SeqCst);
        })
        .unwrap();

    pool.synchronize().wait();
    assert!(combined.settled());
    assert_eq!(result.load(Ordering::SeqCst), 28);
}
