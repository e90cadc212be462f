//! Run guard unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use deploy_agent::deploy::guard::RunGuard;
use deploy_agent::models::deployment::RunKey;

#[test]
fn test_only_one_concurrent_acquire_wins() {
    let guard = Arc::new(RunGuard::new());
    let winners = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let guard = guard.clone();
            let winners = winners.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                if guard.try_acquire(&RunKey::new("web", "prod")) {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
}

#[test]
fn test_keys_are_independent() {
    let guard = RunGuard::new();

    assert!(guard.try_acquire(&RunKey::new("web", "prod")));
    assert!(guard.try_acquire(&RunKey::new("web", "staging")));
    assert!(guard.try_acquire(&RunKey::new("api", "prod")));
    assert!(!guard.try_acquire(&RunKey::new("web", "prod")));

    let active = guard.active();
    assert_eq!(
        active,
        vec![
            RunKey::new("api", "prod"),
            RunKey::new("web", "prod"),
            RunKey::new("web", "staging"),
        ]
    );
}

#[test]
fn test_slot_released_when_holder_panics() {
    let guard = Arc::new(RunGuard::new());
    let key = RunKey::new("web", "prod");

    let holder = {
        let guard = guard.clone();
        let key = key.clone();
        thread::spawn(move || {
            let _slot = guard.claim(key).unwrap();
            panic!("run blew up");
        })
    };

    assert!(holder.join().is_err());
    assert!(!guard.is_busy(&key));
    assert!(guard.claim(key).is_some());
}
