use std::sync::{Arc, Mutex};

use kthread::{HostArch, PRI_MIN, SchedConfig, Scheduler, ThreadState};

fn boot() -> Arc<Scheduler<HostArch>> {
    let sched = Scheduler::new(HostArch::new(), SchedConfig::default());
    sched.start().unwrap();
    sched
}

type Log = Arc<Mutex<Vec<(&'static str, u64)>>>;

fn spawn_sleeper(
    sched: &Arc<Scheduler<HostArch>>,
    log: &Log,
    name: &'static str,
    priority: i32,
    wake_tick: u64,
) -> kthread::Tid {
    let (s, log) = (sched.clone(), log.clone());
    sched
        .spawn(name, priority, move || {
            s.sleep_until(wake_tick);
            let now = s.ticks();
            log.lock().unwrap().push((name, now));
        })
        .unwrap()
}

fn tick_until(sched: &Scheduler<HostArch>, tick: u64) {
    while sched.ticks() < tick {
        sched.timer_interrupt();
    }
}

#[test]
fn sleep_returns_on_the_wake_tick() {
    let sched = boot();
    sched.sleep(10);
    assert_eq!(sched.ticks(), 10);
    sched.sleep_until(25);
    assert_eq!(sched.ticks(), 25);
    assert_eq!(sched.stats().idle_ticks, 25);
}

#[test]
fn past_deadline_does_not_block() {
    let sched = boot();
    sched.sleep(0);
    tick_until(&sched, 5);
    sched.sleep_until(3);
    assert_eq!(sched.ticks(), 5);
}

#[test]
fn high_priority_sleeper_wakes_on_time() {
    let sched = boot();
    let log = Log::default();
    let a = spawn_sleeper(&sched, &log, "a", 5, 100);
    spawn_sleeper(&sched, &log, "b", 10, 50);
    sched.set_priority(PRI_MIN);

    tick_until(&sched, 60);
    assert_eq!(*log.lock().unwrap(), [("b", 50)]);
    let info = sched.thread_info(a).unwrap();
    assert_eq!(info.state, ThreadState::Blocked);
    assert_eq!(info.wake_tick, Some(100));

    tick_until(&sched, 100);
    assert_eq!(*log.lock().unwrap(), [("b", 50), ("a", 100)]);
}

#[test]
fn low_priority_sleeper_waits_behind_higher_one() {
    let sched = boot();
    let log = Log::default();
    spawn_sleeper(&sched, &log, "a", 10, 100);
    let b = spawn_sleeper(&sched, &log, "b", 5, 50);
    sched.set_priority(PRI_MIN);

    tick_until(&sched, 60);
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(sched.thread_info(b).unwrap().state, ThreadState::Blocked);

    tick_until(&sched, 100);
    assert_eq!(*log.lock().unwrap(), [("a", 100), ("b", 100)]);
}

#[test]
fn equal_priorities_wake_in_tick_order() {
    let sched = boot();
    let log = Log::default();
    spawn_sleeper(&sched, &log, "c", 10, 30);
    spawn_sleeper(&sched, &log, "d", 10, 10);
    spawn_sleeper(&sched, &log, "e", 10, 20);
    sched.set_priority(PRI_MIN);

    tick_until(&sched, 40);
    assert_eq!(*log.lock().unwrap(), [("d", 10), ("e", 20), ("c", 30)]);
    sched.check_invariants().unwrap();
}
