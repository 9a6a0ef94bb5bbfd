use kernel_sync::SpinLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new([0_u32; 8]);

    {
        let mut g = l.lock();
        g[0] = 1;
        assert!(l.is_locked());
    }

    assert!(!l.is_locked());
    assert_eq!(l.lock()[0], 1);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());

    // a failed attempt must not release the existing holder
    assert!(l.try_lock().is_none());
    assert!(l.is_locked());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(vec![0_u32; 4]);
    let marked = l.with_lock(|table| {
        for (i, e) in table.iter_mut().enumerate().take(3) {
            *e = u32::try_from(i).unwrap() + 1;
        }
        table.iter().filter(|&&e| e != 0).count()
    });
    assert_eq!(marked, 3);
    assert_eq!(l.with_lock(|t| t.clone()), vec![1, 2, 3, 0]);
}

#[test]
fn get_mut_bypasses_the_lock() {
    let mut l = SpinLock::new(vec![1, 2, 3]);
    l.get_mut().push(4);
    assert_eq!(l.lock().as_slice(), &[1, 2, 3, 4]);
}

/// Several threads claim slots of a shared table; no slot may be claimed twice.
#[test]
fn contended_claims_are_exclusive() {
    let threads = 8;
    let per_thread = 500;

    let table = Arc::new(SpinLock::new(vec![0_usize; threads * per_thread]));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|id| {
            let table = Arc::clone(&table);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..per_thread {
                    table.with_lock(|t| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        let slot = t.iter().position(|&owner| owner == 0).unwrap();
                        t[slot] = id + 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let table = table.with_lock(|t| t.clone());
    assert!(table.iter().all(|&owner| owner != 0));
    for id in 1..=threads {
        assert_eq!(table.iter().filter(|&&o| o == id).count(), per_thread);
    }
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err(), "expected panic");
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn spinlock_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let l = SpinLock::new(0u8);
    takes_sync(&l);
}
