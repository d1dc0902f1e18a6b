use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use kthread::{
    HostArch, IrqSave, KError, PRI_DEFAULT, PRI_MIN, SchedConfig, SchedHooks, Scheduler,
    ThreadState, Tid,
};

fn boot() -> Arc<Scheduler<HostArch>> {
    let sched = Scheduler::new(HostArch::new(), SchedConfig::default());
    sched.start().unwrap();
    sched
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(log: &Log, what: &'static str) {
    log.lock().unwrap().push(what);
}

#[test]
fn boot_makes_main_and_idle() {
    let sched = boot();
    let me = sched.current();
    assert_eq!(me.tid, Tid::new(1));
    assert_eq!(me.name, "main");
    assert_eq!(me.priority, PRI_DEFAULT);
    assert_eq!(me.state, ThreadState::Running);
    assert_eq!(sched.name(), "main");

    let mut seen = Vec::new();
    {
        let _irq = IrqSave::new(sched.arch());
        sched.for_each_thread(|t| seen.push((t.name.clone(), t.state)));
    }
    assert_eq!(
        seen,
        [
            ("main".to_string(), ThreadState::Running),
            ("idle".to_string(), ThreadState::Blocked)
        ]
    );
    sched.check_invariants().unwrap();
}

#[test]
fn runs_in_priority_order() {
    let sched = boot();
    let log = Log::default();
    for (name, priority) in [("one", 1), ("five", 5), ("ten", 10)] {
        let log = log.clone();
        sched.spawn(name, priority, move || record(&log, name)).unwrap();
    }
    assert!(log.lock().unwrap().is_empty());

    sched.set_priority(PRI_MIN);
    assert_eq!(*log.lock().unwrap(), ["ten", "five", "one"]);
    sched.check_invariants().unwrap();
}

#[test]
fn equal_priorities_share_the_cpu() {
    let sched = boot();
    let log = Log::default();
    for name in ["a", "b"] {
        let (s, log) = (sched.clone(), log.clone());
        sched
            .spawn(name, 20, move || {
                for _ in 0..8 {
                    record(&log, name);
                    s.timer_interrupt();
                }
            })
            .unwrap();
    }
    sched.set_priority(PRI_MIN);
    assert_eq!(log.lock().unwrap().concat(), "aaaabbbbaaaabbbb");
}

#[test]
fn higher_priority_child_preempts_creator() {
    let sched = boot();
    let log = Log::default();
    let child_log = log.clone();
    sched
        .spawn("child", 40, move || record(&child_log, "child"))
        .unwrap();
    record(&log, "main");
    assert_eq!(*log.lock().unwrap(), ["child", "main"]);
}

static ENTRY_ARG: AtomicUsize = AtomicUsize::new(0);

fn entry(arg: usize) {
    ENTRY_ARG.store(arg, Ordering::SeqCst);
}

#[test]
fn create_runs_entry_with_argument() {
    let sched = boot();
    let tid = sched.create("entry", PRI_DEFAULT + 1, entry, 7).unwrap();
    assert_eq!(ENTRY_ARG.load(Ordering::SeqCst), 7);
    assert_eq!(sched.thread_info(tid), Err(KError::NoSuchThread));
}

#[derive(Default)]
struct Recorder {
    exits: Mutex<Vec<(Tid, i32)>>,
    activations: AtomicUsize,
}

struct Hooks(Arc<Recorder>);

impl SchedHooks for Hooks {
    fn thread_exit(&self, tid: Tid, status: i32) {
        self.0.exits.lock().unwrap().push((tid, status));
    }

    fn activate(&self, _tid: Tid) {
        self.0.activations.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn exit_reports_status_to_hooks() {
    let recorder = Arc::new(Recorder::default());
    let sched = Scheduler::with_hooks(
        HostArch::new(),
        SchedConfig::default(),
        Box::new(Hooks(recorder.clone())),
    );
    sched.start().unwrap();

    let s = sched.clone();
    let tid = sched.spawn("quitter", 40, move || s.exit(7)).unwrap();
    let plain = sched.spawn("plain", 40, || {}).unwrap();

    assert_eq!(*recorder.exits.lock().unwrap(), [(tid, 7), (plain, 0)]);
    assert!(recorder.activations.load(Ordering::SeqCst) >= 2);
    assert_eq!(sched.thread_info(tid), Err(KError::NoSuchThread));
}

#[test]
fn block_and_unblock() {
    let sched = boot();
    let log = Log::default();
    let (s, child_log) = (sched.clone(), log.clone());
    let child = sched
        .spawn("sleeper", 40, move || {
            {
                let _irq = IrqSave::new(s.arch());
                s.block();
            }
            record(&child_log, "resumed");
        })
        .unwrap();

    assert_eq!(sched.thread_info(child).unwrap().state, ThreadState::Blocked);
    sched.unblock(child);
    assert_eq!(sched.thread_info(child).unwrap().state, ThreadState::Ready);
    assert!(log.lock().unwrap().is_empty());
    sched.check_invariants().unwrap();

    sched.yield_now();
    assert_eq!(*log.lock().unwrap(), ["resumed"]);
}

#[test]
fn long_names_are_truncated() {
    let sched = boot();
    let tid = sched.spawn("abcdefghijklmnopqrstuvwxyz", 1, || {}).unwrap();
    assert_eq!(sched.thread_info(tid).unwrap().name, "abcdefghijklmno");
}

#[test]
fn unknown_thread() {
    let sched = boot();
    assert_eq!(sched.thread_info(Tid::new(999)), Err(KError::NoSuchThread));
    assert_eq!(
        sched.set_files(Tid::new(999), Box::new(())),
        Err(KError::NoSuchThread)
    );
}

#[test]
fn stack_exhaustion_is_no_memory() {
    let config = SchedConfig {
        stack_size: usize::MAX,
        ..SchedConfig::default()
    };
    let sched = Scheduler::new(HostArch::new(), config);
    assert_eq!(sched.spawn("big", 10, || {}), Err(KError::NoMemory));
    assert_eq!(sched.start(), Err(KError::NoMemory));
}

#[test]
fn ticks_are_accounted_per_category() {
    let sched = boot();
    let me = sched.tid();
    sched.set_address_space(me, Box::new("user space")).unwrap();
    for _ in 0..3 {
        sched.timer_interrupt();
    }
    sched.with_payload(me, |p| p.address_space = None).unwrap();
    sched.timer_interrupt();
    sched.sleep(5);

    let stats = sched.stats();
    assert_eq!(stats.ticks, 9);
    assert_eq!(stats.user_ticks, 3);
    assert_eq!(stats.kernel_ticks, 1);
    assert_eq!(stats.idle_ticks, 5);
    assert!(stats.switches > 0);
    sched.print_stats();
}

#[test]
#[should_panic(expected = "is not blocked")]
fn unblocking_a_ready_thread_panics() {
    let sched = boot();
    let tid = sched.spawn("ready", 1, || {}).unwrap();
    sched.unblock(tid);
}

#[test]
#[should_panic(expected = "interrupts must be off")]
fn blocking_with_interrupts_on_panics() {
    let sched = boot();
    sched.block();
}

#[test]
#[should_panic(expected = "timer_freq must be positive")]
fn zero_timer_frequency_is_rejected() {
    let config = SchedConfig {
        timer_freq: 0,
        ..SchedConfig::default()
    };
    let _ = Scheduler::new(HostArch::new(), config);
}

#[test]
#[should_panic(expected = "out of range")]
fn priority_out_of_range_panics() {
    let sched = boot();
    sched.set_priority(64);
}
