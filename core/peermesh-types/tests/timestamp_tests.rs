use peermesh_types::{wall_clock_micros, SeqGen};
use std::sync::Arc;
use std::thread;

#[test]
fn wall_clock_is_roughly_monotonic() {
    let a = wall_clock_micros();
    let b = wall_clock_micros();
    assert!(b >= a);
}

#[test]
fn wall_clock_is_in_microseconds() {
    // Anything after 2020 in microseconds exceeds 1.5e15.
    assert!(wall_clock_micros() > 1_500_000_000_000_000);
}

#[test]
fn concurrent_draws_never_collide() {
    let gen = Arc::new(SeqGen::new());
    let mut handles = Vec::new();
    for _ in 0..4 {
        let gen = gen.clone();
        handles.push(thread::spawn(move || {
            (0..1000).map(|_| gen.next()).collect::<Vec<u64>>()
        }));
    }

    let mut all: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), 4000);
}
