use std::sync::{Arc, Mutex};

use kthread::{HostArch, Lock, SchedConfig, SchedPolicy, Scheduler, Semaphore};

fn boot(config: SchedConfig) -> Arc<Scheduler<HostArch>> {
    let sched = Scheduler::new(HostArch::new(), config);
    sched.start().unwrap();
    sched
}

type Log = Arc<Mutex<Vec<(&'static str, i32)>>>;

fn record(log: &Log, who: &'static str, priority: i32) {
    log.lock().unwrap().push((who, priority));
}

#[test]
fn donation_follows_the_lock_chain() {
    let sched = boot(SchedConfig::default());
    let first = Arc::new(Lock::new(&sched));
    let second = Arc::new(Lock::new(&sched));
    let go = Arc::new(Semaphore::new(&sched, 0));
    let log = Log::default();

    let low = {
        let (s, first, go, log) = (sched.clone(), first.clone(), go.clone(), log.clone());
        sched
            .spawn("low", 10, move || {
                let guard = first.lock();
                go.acquire();
                drop(guard);
                record(&log, "low", s.get_priority());
            })
            .unwrap()
    };
    sched.sleep(1);
    assert_eq!(sched.thread_info(low).unwrap().priority, 10);

    let medium = {
        let (s, first, second, log) = (sched.clone(), first.clone(), second.clone(), log.clone());
        sched
            .spawn("medium", 20, move || {
                let _b = second.lock();
                let _a = first.lock();
                record(&log, "medium", s.get_priority());
            })
            .unwrap()
    };
    sched.sleep(1);
    assert_eq!(sched.thread_info(low).unwrap().priority, 20);
    assert_eq!(
        sched.thread_info(medium).unwrap().blocking_on,
        Some(first.id())
    );

    let high = {
        let (s, second, log) = (sched.clone(), second.clone(), log.clone());
        sched
            .spawn("high", 30, move || {
                let _b = second.lock();
                record(&log, "high", s.get_priority());
            })
            .unwrap()
    };
    sched.sleep(1);
    for tid in [low, medium, high] {
        assert_eq!(sched.thread_info(tid).unwrap().priority, 30);
    }
    assert_eq!(sched.thread_info(low).unwrap().base_priority, 10);
    assert_eq!(
        sched.thread_info(high).unwrap().blocking_on,
        Some(second.id())
    );
    assert!(sched.is_waiting(medium));
    assert!(sched.is_waiting(high));
    sched.check_invariants().unwrap();

    go.release();
    sched.sleep(1);
    assert_eq!(
        *log.lock().unwrap(),
        [("medium", 30), ("high", 30), ("low", 10)]
    );
    sched.check_invariants().unwrap();
}

#[test]
fn release_keeps_the_remaining_donations() {
    let sched = boot(SchedConfig::default());
    let first = Arc::new(Lock::new(&sched));
    let second = Arc::new(Lock::new(&sched));
    let go = Arc::new(Semaphore::new(&sched, 0));
    let log = Log::default();

    let low = {
        let (s, first, second, go, log) = (
            sched.clone(),
            first.clone(),
            second.clone(),
            go.clone(),
            log.clone(),
        );
        sched
            .spawn("low", 10, move || {
                let a = first.lock();
                let b = second.lock();
                go.acquire();
                drop(b);
                record(&log, "low", s.get_priority());
                drop(a);
                record(&log, "low", s.get_priority());
            })
            .unwrap()
    };
    sched.sleep(1);

    for (name, priority, lock) in [("medium", 20, first.clone()), ("high", 30, second.clone())] {
        let (s, log) = (sched.clone(), log.clone());
        sched
            .spawn(name, priority, move || {
                let _g = lock.lock();
                record(&log, name, s.get_priority());
            })
            .unwrap();
        sched.sleep(1);
        assert_eq!(sched.thread_info(low).unwrap().priority, priority);
    }

    go.release();
    sched.sleep(1);
    assert_eq!(
        *log.lock().unwrap(),
        [("high", 30), ("low", 20), ("medium", 20), ("low", 10)]
    );
}

#[test]
fn lowered_base_priority_waits_for_release() {
    let sched = boot(SchedConfig::default());
    let lock = Arc::new(Lock::new(&sched));
    let log = Log::default();

    let guard = lock.lock();
    let (s, waiter_lock, waiter_log) = (sched.clone(), lock.clone(), log.clone());
    sched
        .spawn("waiter", 40, move || {
            let _g = waiter_lock.lock();
            record(&waiter_log, "waiter", s.get_priority());
        })
        .unwrap();
    assert_eq!(sched.get_priority(), 40);

    sched.set_priority(20);
    assert_eq!(sched.get_priority(), 40);
    assert_eq!(sched.current().base_priority, 20);
    assert!(log.lock().unwrap().is_empty());

    drop(guard);
    assert_eq!(*log.lock().unwrap(), [("waiter", 40)]);
    assert_eq!(sched.get_priority(), 20);
}

#[test]
fn no_donation_under_mlfqs() {
    let config = SchedConfig::new(SchedPolicy::Mlfqs);
    let sched = boot(config);
    let lock = Arc::new(Lock::new(&sched));

    let guard = lock.lock();
    let waiter_lock = lock.clone();
    let waiter = sched
        .spawn("waiter", 40, move || {
            let _g = waiter_lock.lock();
        })
        .unwrap();
    assert!(sched.is_waiting(waiter));
    assert_eq!(sched.get_priority(), 31);

    drop(guard);
    assert!(!sched.is_waiting(waiter));
}

#[test]
fn exiting_holder_frees_its_lock() {
    let sched = boot(SchedConfig::default());
    let lock = sched.lock_create();
    let go = Arc::new(Semaphore::new(&sched, 0));
    let log = Log::default();

    let holder = {
        let (s, go) = (sched.clone(), go.clone());
        sched
            .spawn("holder", 10, move || {
                s.lock_acquire(lock);
                go.acquire();
            })
            .unwrap()
    };
    sched.sleep(1);

    let (s, waiter_log) = (sched.clone(), log.clone());
    sched
        .spawn("waiter", 20, move || {
            s.lock_acquire(lock);
            record(&waiter_log, "waiter", s.get_priority());
            s.lock_release(lock);
        })
        .unwrap();
    sched.sleep(1);
    assert_eq!(sched.thread_info(holder).unwrap().priority, 20);

    go.release();
    sched.sleep(1);
    assert_eq!(*log.lock().unwrap(), [("waiter", 20)]);
    assert!(sched.lock_try_acquire(lock));
    sched.lock_release(lock);
    sched.check_invariants().unwrap();
}
