use std::sync::{Arc, Mutex};

use kthread::{
    Fixed, HostArch, PRI_DEFAULT, PRI_MAX, SchedConfig, SchedPolicy, Scheduler, mlfqs,
};

fn boot() -> Arc<Scheduler<HostArch>> {
    let sched = Scheduler::new(HostArch::new(), SchedConfig::new(SchedPolicy::Mlfqs));
    sched.start().unwrap();
    sched
}

fn run_for_one_second(runnable: i32) {
    let sched = boot();
    for i in 1..runnable {
        let s = sched.clone();
        let name = format!("busy{i}");
        sched
            .spawn(&name, PRI_DEFAULT, move || {
                while s.ticks() < 100 {
                    s.timer_interrupt();
                }
            })
            .unwrap();
    }
    while sched.ticks() < 100 {
        sched.timer_interrupt();
    }
    let expected = mlfqs::times_100(mlfqs::next_load_avg(Fixed::default(), runnable));
    assert_eq!(sched.get_load_avg(), expected);
}

#[test]
fn load_avg_after_one_second() {
    run_for_one_second(1);
    run_for_one_second(3);
}

#[test]
fn idle_system_has_no_load() {
    let sched = boot();
    sched.sleep(100);
    assert_eq!(sched.ticks(), 100);
    assert_eq!(sched.get_load_avg(), 0);
    assert_eq!(sched.get_recent_cpu(), 0);
}

#[test]
fn recent_cpu_counts_running_ticks() {
    let sched = boot();
    for _ in 0..10 {
        sched.timer_interrupt();
    }
    assert_eq!(sched.get_recent_cpu(), 1000);
    // Last recomputed on tick 8: 63 - 8/4.
    assert_eq!(sched.get_priority(), 61);
}

#[test]
fn nice_sets_priority() {
    let sched = boot();
    assert_eq!(sched.policy(), SchedPolicy::Mlfqs);
    assert_eq!(sched.get_nice(), 0);

    sched.set_nice(5);
    assert_eq!(sched.get_nice(), 5);
    assert_eq!(sched.get_priority(), 53);

    sched.set_nice(100);
    assert_eq!(sched.get_nice(), 20);
    assert_eq!(sched.get_priority(), 23);

    sched.set_nice(-50);
    assert_eq!(sched.get_nice(), -20);
    assert_eq!(sched.get_priority(), PRI_MAX);
}

#[test]
fn set_priority_is_ignored() {
    let sched = boot();
    sched.set_priority(10);
    assert_eq!(sched.get_priority(), PRI_DEFAULT);
    assert_eq!(sched.current().base_priority, PRI_DEFAULT);
}

#[test]
fn raising_nice_yields_to_others() {
    let sched = boot();
    let log = Arc::new(Mutex::new(Vec::new()));
    let worker_log = log.clone();
    sched
        .spawn("worker", PRI_DEFAULT, move || {
            worker_log.lock().unwrap().push("worker");
        })
        .unwrap();
    assert!(log.lock().unwrap().is_empty());

    sched.set_nice(20);
    log.lock().unwrap().push("main");
    assert_eq!(*log.lock().unwrap(), ["worker", "main"]);
}
