//! Concurrent reload semantics: readers must never observe a torn
//! snapshot, whatever the interleaving of writers.

use std::sync::Arc;
use std::time::Duration;

use loadvisor::reload::{PolicyOptions, ReloadBinding, ReloadingSlot, RetryBinding};
use loadvisor::{BackoffKind, RetryOptions, RetrySnapshot};

fn snapshot(options: &RetryOptions) -> RetrySnapshot {
    RetrySnapshot::from_options(options).unwrap()
}

#[test]
fn concurrent_reload_is_atomic() {
    let initial_options = RetryOptions {
        max_attempts: 3,
        base_delay: Duration::from_secs(1),
        max_delay: None,
        backoff: BackoffKind::Exponential,
        use_jitter: false,
    };
    let replacement_options = RetryOptions {
        max_attempts: 5,
        base_delay: Duration::from_secs(2),
        ..initial_options
    };
    let initial = snapshot(&initial_options);
    let replacement = snapshot(&replacement_options);

    let slot = Arc::new(ReloadingSlot::new(initial));
    let binding = Arc::new(RetryBinding::new(Arc::clone(&slot)));

    let writers: Vec<_> = (0..10)
        .map(|_| {
            let binding = Arc::clone(&binding);
            std::thread::spawn(move || {
                binding.on_configuration_changed(&PolicyOptions::Retry(replacement_options));
            })
        })
        .collect();

    let readers: Vec<_> = (0..10)
        .map(|_| {
            let slot = Arc::clone(&slot);
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let seen = *slot.load();
                    assert!(
                        seen == initial || seen == replacement,
                        "torn snapshot observed: {seen:?}"
                    );
                }
            })
        })
        .collect();

    for handle in writers.into_iter().chain(readers) {
        handle.join().unwrap();
    }

    let settled = slot.load();
    assert_eq!(settled.max_attempts, 5);
    assert_eq!(settled.base_delay, Duration::from_secs(2));
}

#[test]
fn mismatched_options_never_disturb_concurrent_readers() {
    let initial = snapshot(&RetryOptions::default());
    let slot = Arc::new(ReloadingSlot::new(initial));
    let binding = Arc::new(RetryBinding::new(Arc::clone(&slot)));
    let before = slot.load();

    let writers: Vec<_> = (0..4)
        .map(|_| {
            let binding = Arc::clone(&binding);
            std::thread::spawn(move || {
                binding.on_configuration_changed(&PolicyOptions::Timeout(Default::default()));
            })
        })
        .collect();
    for handle in writers {
        handle.join().unwrap();
    }

    // Identity-unchanged: no store happened at all.
    assert!(Arc::ptr_eq(&before, &slot.load()));
}
