use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use sidekick_lib::{Decision, TokenBucket};

#[test]
fn test_new_bucket_is_full() {
    let bucket = TokenBucket::per_window(5, Duration::from_secs(10));
    assert_eq!(bucket.tokens(), 5.0);
    assert_eq!(bucket.refill_rate(), 0.5);
}

#[test]
fn test_zero_elapsed_admits_exactly_capacity() {
    let t0 = Instant::now();
    let bucket = TokenBucket::new_at(5, 0.5, t0);

    for i in 0..5 {
        assert!(bucket.allow_at(1.0, t0).is_admitted(), "request {i} should be admitted");
    }
    let rejected = bucket.allow_at(1.0, t0);
    assert!(rejected.is_rejected());
    assert_eq!(rejected.remaining(), 0);
    assert_eq!(bucket.tokens(), 0.0);
}

#[test]
fn test_rejection_leaves_tokens_unchanged() {
    let t0 = Instant::now();
    let bucket = TokenBucket::new_at(1, 1.0, t0);
    assert!(bucket.allow_at(1.0, t0).is_admitted());

    let half = t0 + Duration::from_millis(500);
    assert!(bucket.allow_at(1.0, half).is_rejected());
    assert!((bucket.tokens() - 0.5).abs() < 1e-9);
}

#[test]
fn test_partial_refill() {
    let t0 = Instant::now();
    let bucket = TokenBucket::new_at(10, 1.0, t0);
    for _ in 0..10 {
        bucket.allow_at(1.0, t0);
    }

    let later = t0 + Duration::from_secs(3);
    for _ in 0..3 {
        assert!(bucket.allow_at(1.0, later).is_admitted());
    }
    assert!(bucket.allow_at(1.0, later).is_rejected());
}

#[test]
fn test_long_idle_refills_to_capacity_only() {
    let t0 = Instant::now();
    let bucket = TokenBucket::new_at(5, 0.5, t0);
    for _ in 0..5 {
        bucket.allow_at(1.0, t0);
    }

    let much_later = t0 + Duration::from_secs(3600);
    let mut admitted = 0;
    while bucket.allow_at(1.0, much_later).is_admitted() {
        admitted += 1;
        assert!(admitted <= 5, "bucket admitted more than its capacity");
    }
    assert_eq!(admitted, 5);
}

#[test]
fn test_clock_going_backwards_is_zero_elapsed() {
    let t0 = Instant::now() + Duration::from_secs(5);
    let bucket = TokenBucket::new_at(1, 1.0, t0);
    assert!(bucket.allow_at(1.0, t0).is_admitted());
    assert!(bucket.allow_at(1.0, t0 - Duration::from_secs(2)).is_rejected());
    assert!(bucket.tokens() >= 0.0);
}

#[test]
fn test_retry_after_reflects_deficit() {
    let t0 = Instant::now();
    let bucket = TokenBucket::new_at(5, 0.5, t0);
    for _ in 0..5 {
        bucket.allow_at(1.0, t0);
    }
    match bucket.allow_at(1.0, t0) {
        Decision::Rejected { limit, retry_after } => {
            assert_eq!(limit, 5);
            assert_eq!(retry_after, Duration::from_secs(2));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn test_concurrent_same_bucket_never_over_admits() {
    // refill of 1e-9 tokens/s keeps the test independent of scheduling time
    let bucket = Arc::new(TokenBucket::new(50, 1e-9));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let bucket = Arc::clone(&bucket);
            thread::spawn(move || (0..20).filter(|_| bucket.allow(1.0).is_admitted()).count())
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap_or(0)).sum();
    assert_eq!(admitted, 50);
    let tokens = bucket.tokens();
    assert!((0.0..1.0).contains(&tokens), "tokens out of range: {tokens}");
}
