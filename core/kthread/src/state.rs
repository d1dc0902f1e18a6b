// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Scheduler state: every queue, the thread registry and the counters.
//!
//! A single [`SchedState`] is owned by the scheduler and only touched with
//! interrupts disabled. None of the methods here switch contexts; they move
//! threads between collections and keep the bookkeeping consistent, and the
//! caller decides when to switch.

use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};

use crate::{
    config::SchedConfig,
    donation::DonationGraph,
    mlfqs::{self, Mlfqs},
    ready_queue::ReadyQueue,
    sleep_queue::SleepQueue,
    sync::{LockId, LockState, SemaId, SemaState},
    thread::{Membership, Thread, ThreadState, Tid, WaitObject},
};

/// Tick counters, as reported by [`Scheduler::stats`].
///
/// [`Scheduler::stats`]: crate::Scheduler::stats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Timer ticks since boot.
    pub ticks: u64,
    /// Ticks spent in the idle thread.
    pub idle_ticks: u64,
    /// Ticks spent in kernel threads.
    pub kernel_ticks: u64,
    /// Ticks spent in threads with an address space.
    pub user_ticks: u64,
    /// Context switches performed.
    pub switches: u64,
}

pub(crate) struct SchedState<C> {
    pub(crate) config: SchedConfig,
    pub(crate) threads: BTreeMap<Tid, Box<Thread<C>>>,
    /// Live threads in creation order. Exited threads leave it at once, even
    /// though their control block lingers until reclaimed.
    pub(crate) all_list: Vec<Tid>,
    pub(crate) ready: ReadyQueue,
    pub(crate) sleepers: SleepQueue,
    pub(crate) donation: DonationGraph,
    pub(crate) locks: BTreeMap<LockId, LockState>,
    pub(crate) semas: BTreeMap<SemaId, SemaState>,
    pub(crate) mlfqs: Mlfqs,
    pub(crate) current: Tid,
    pub(crate) initial: Tid,
    pub(crate) idle: Option<Tid>,
    /// The thread switched away from, until switch completion runs.
    pub(crate) pending_prev: Option<Tid>,
    pub(crate) slice_ticks: u32,
    pub(crate) yield_on_return: bool,
    pub(crate) stats: SchedStats,
    next_lock: u64,
    next_sema: u64,
}

impl<C> SchedState<C> {
    /// Creates the state with `initial` as the running thread.
    pub(crate) fn new(config: SchedConfig, mut initial: Thread<C>) -> Self {
        let tid = initial.tid;
        initial.state = ThreadState::Running;
        let mut threads = BTreeMap::new();
        threads.insert(tid, Box::new(initial));
        Self {
            mlfqs: Mlfqs::new(config.timer_freq),
            config,
            threads,
            all_list: alloc::vec![tid],
            ready: ReadyQueue::new(),
            sleepers: SleepQueue::new(),
            donation: DonationGraph::new(),
            locks: BTreeMap::new(),
            semas: BTreeMap::new(),
            current: tid,
            initial: tid,
            idle: None,
            pending_prev: None,
            slice_ticks: 0,
            yield_on_return: false,
            stats: SchedStats::default(),
            next_lock: 1,
            next_sema: 1,
        }
    }

    /// # Panics
    ///
    /// Panics if `tid` has no control block.
    pub(crate) fn thread(&self, tid: Tid) -> &Thread<C> {
        match self.threads.get(&tid) {
            Some(t) => t,
            None => panic!("no thread with tid {tid}"),
        }
    }

    /// # Panics
    ///
    /// Panics if `tid` has no control block.
    pub(crate) fn thread_mut(&mut self, tid: Tid) -> &mut Thread<C> {
        match self.threads.get_mut(&tid) {
            Some(t) => t,
            None => panic!("no thread with tid {tid}"),
        }
    }

    /// Looks up a thread that has not exited.
    pub(crate) fn live_thread(&self, tid: Tid) -> Option<&Thread<C>> {
        self.threads
            .get(&tid)
            .map(|t| &**t)
            .filter(|t| t.state != ThreadState::Dying)
    }

    pub(crate) fn current(&self) -> &Thread<C> {
        self.thread(self.current)
    }

    /// # Panics
    ///
    /// Panics if the running thread's guard word or stack canary has been
    /// overwritten.
    pub(crate) fn check_current_intact(&self) {
        let t = self.current();
        assert!(
            t.is_intact(),
            "thread {} ({}): kernel stack overflow",
            t.name,
            t.tid
        );
    }

    pub(crate) fn is_idle(&self, tid: Tid) -> bool {
        self.idle == Some(tid)
    }

    /// Registers a freshly built (blocked) thread.
    pub(crate) fn insert_thread(&mut self, thread: Thread<C>) {
        let tid = thread.tid;
        debug_assert_eq!(thread.state, ThreadState::Blocked);
        self.threads.insert(tid, Box::new(thread));
        self.all_list.push(tid);
    }

    /// BLOCKED -> READY: detaches `tid` from whatever it waits on and queues
    /// it by effective priority.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is not blocked, or is the idle thread.
    pub(crate) fn make_ready(&mut self, tid: Tid) {
        let t = self.thread(tid);
        assert_eq!(
            t.state,
            ThreadState::Blocked,
            "unblock: thread {} ({}) is not blocked",
            t.name,
            t.tid
        );
        assert!(!self.is_idle(tid), "unblock: the idle thread is never made ready");
        self.detach_wait(tid);
        self.enqueue(tid);
    }

    /// Puts the running thread (or a just-detached one) into the ready queue.
    pub(crate) fn enqueue(&mut self, tid: Tid) {
        let t = self.thread_mut(tid);
        t.state = ThreadState::Ready;
        t.membership = Membership::Ready;
        let priority = t.effective_priority;
        self.ready.push(tid, priority);
    }

    /// Removes `tid` from the sleep queue or from a lock or semaphore wait
    /// queue, whichever holds it.
    pub(crate) fn detach_wait(&mut self, tid: Tid) {
        let membership = core::mem::take(&mut self.thread_mut(tid).membership);
        match membership {
            Membership::None => {}
            Membership::Ready => {
                self.ready.remove(tid);
            }
            Membership::Sleep => {
                self.sleepers.remove(tid);
            }
            Membership::Waiting(WaitObject::Sema(sema)) => {
                if let Some(s) = self.semas.get_mut(&sema) {
                    s.waiters.retain(|&w| w != tid);
                }
            }
            Membership::Waiting(WaitObject::Lock(lock)) => {
                if let Some(l) = self.locks.get_mut(&lock) {
                    l.waiters.retain(|&w| w != tid);
                }
                self.thread_mut(tid).blocking_on = None;
                self.withdraw_donor(tid, lock);
            }
        }
    }

    /// Chooses the next thread to run: the front of the ready queue, else
    /// the idle thread.
    ///
    /// # Panics
    ///
    /// Panics if neither exists.
    pub(crate) fn pick_next(&mut self) -> Tid {
        if let Some(tid) = self.ready.pop_front() {
            self.thread_mut(tid).membership = Membership::None;
            return tid;
        }
        match self.idle {
            Some(idle) => idle,
            None => panic!("schedule: no runnable thread"),
        }
    }

    /// Whether a ready thread outranks the running one.
    pub(crate) fn should_preempt(&self) -> bool {
        self.ready
            .front_priority()
            .is_some_and(|p| p > self.current().effective_priority)
    }

    /// Sets the effective priority of `tid`, moving it inside the ready queue
    /// if it is queued there. Returns whether the priority changed.
    pub(crate) fn set_effective(&mut self, tid: Tid, priority: i32) -> bool {
        let t = self.thread_mut(tid);
        if t.effective_priority == priority {
            return false;
        }
        t.effective_priority = priority;
        if t.membership == Membership::Ready {
            self.ready.reposition(tid, priority);
        }
        true
    }

    /// Places `tid` on the sleep queue until `wake_tick`, keyed by its
    /// current effective priority.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is queued elsewhere, ready, or exiting.
    pub(crate) fn register_sleep(&mut self, tid: Tid, wake_tick: u64) {
        let t = self.thread_mut(tid);
        assert!(
            matches!(t.state, ThreadState::Running | ThreadState::Blocked)
                && t.membership == Membership::None,
            "register_sleep: thread {} is {} and {:?}",
            t.name,
            t.state,
            t.membership
        );
        t.wake_tick = wake_tick;
        t.membership = Membership::Sleep;
        let priority = t.effective_priority;
        self.sleepers.insert(tid, priority, wake_tick);
    }

    /// Moves every due sleeper at the front of the sleep queue to the ready
    /// queue. Returns how many were woken.
    pub(crate) fn wake_due(&mut self) -> usize {
        let mut woken = 0;
        while let Some(tid) = self.sleepers.pop_due(self.stats.ticks) {
            self.thread_mut(tid).membership = Membership::None;
            self.make_ready(tid);
            woken += 1;
        }
        woken
    }

    /// Timer-tick accounting for the running thread.
    pub(crate) fn account_tick(&mut self) {
        self.check_current_intact();
        self.stats.ticks += 1;
        let cur = self.current;
        if self.is_idle(cur) {
            self.stats.idle_ticks += 1;
        } else if self.current().payload.has_address_space() {
            self.stats.user_ticks += 1;
        } else {
            self.stats.kernel_ticks += 1;
        }

        if self.config.mlfqs() {
            self.mlfqs_tick();
        }

        self.slice_ticks += 1;
        if self.slice_ticks >= self.config.time_slice {
            self.yield_on_return = true;
        }
    }

    fn mlfqs_tick(&mut self) {
        let cur = self.current;
        let running_idle = self.is_idle(cur);
        if !running_idle {
            let t = self.thread_mut(cur);
            t.recent_cpu = t.recent_cpu.add_int(1);
        }

        let ticks = self.stats.ticks;
        if self.mlfqs.is_second_boundary(ticks) {
            let ready_count = self.ready.len() + usize::from(!running_idle);
            self.mlfqs.update_load_avg(ready_count);
            for tid in self.all_list.clone() {
                if self.is_idle(tid) {
                    continue;
                }
                let decayed = {
                    let t = self.thread(tid);
                    self.mlfqs.decay(t.recent_cpu, t.nice)
                };
                self.thread_mut(tid).recent_cpu = decayed;
            }
        }

        if Mlfqs::is_priority_boundary(ticks) {
            self.mlfqs_recompute_all();
            if self.should_preempt() {
                self.yield_on_return = true;
            }
        }
    }

    /// Recomputes every non-idle priority from `recent_cpu` and `nice`, then
    /// re-sorts the ready queue once.
    pub(crate) fn mlfqs_recompute_all(&mut self) {
        let idle = self.idle;
        for t in self.threads.values_mut() {
            if Some(t.tid) == idle || t.state == ThreadState::Dying {
                continue;
            }
            let p = mlfqs::priority(t.recent_cpu, t.nice);
            t.base_priority = p;
            t.effective_priority = p;
        }
        let threads = &self.threads;
        self.ready
            .resort(|tid| threads.get(&tid).map_or(0, |t| t.effective_priority));
    }

    /// Recomputes one thread's MLFQS priority.
    pub(crate) fn mlfqs_recompute(&mut self, tid: Tid) {
        if self.is_idle(tid) {
            return;
        }
        let t = self.thread_mut(tid);
        let p = mlfqs::priority(t.recent_cpu, t.nice);
        t.base_priority = p;
        self.set_effective(tid, p);
    }

    /// Takes the highest-priority waiter off `obj`'s wait queue, the first
    /// one among equals.
    pub(crate) fn take_best_waiter(&mut self, obj: WaitObject) -> Option<Tid> {
        let threads = &self.threads;
        let waiters = match obj {
            WaitObject::Lock(id) => &mut self.locks.get_mut(&id)?.waiters,
            WaitObject::Sema(id) => &mut self.semas.get_mut(&id)?.waiters,
        };
        let mut best: Option<(usize, i32)> = None;
        for (i, w) in waiters.iter().enumerate() {
            let p = threads.get(w).map_or(i32::MIN, |t| t.effective_priority);
            if best.is_none_or(|(_, bp)| p > bp) {
                best = Some((i, p));
            }
        }
        let tid = waiters.remove(best?.0)?;
        self.thread_mut(tid).membership = Membership::None;
        Some(tid)
    }

    pub(crate) fn alloc_lock_id(&mut self) -> LockId {
        let id = LockId::new(self.next_lock);
        self.next_lock += 1;
        id
    }

    pub(crate) fn alloc_sema_id(&mut self) -> SemaId {
        let id = SemaId::new(self.next_sema);
        self.next_sema += 1;
        id
    }

    /// Removes the control block of `tid` if it is DYING and not the initial
    /// thread, so the caller can free it outside the lock.
    pub(crate) fn reclaim(&mut self, tid: Tid) -> Option<Box<Thread<C>>> {
        if tid == self.initial || self.threads.get(&tid)?.state != ThreadState::Dying {
            return None;
        }
        self.donation.forget(tid);
        self.threads.remove(&tid)
    }

    /// Checks the structural invariants: one RUNNING thread, ready queue
    /// membership exactly matching READY, every sleeper BLOCKED, and a
    /// sorted ready queue.
    pub(crate) fn check_invariants(&self) -> Result<(), &'static str> {
        let running = self
            .threads
            .values()
            .filter(|t| t.state == ThreadState::Running)
            .count();
        if running != 1 || self.current().state != ThreadState::Running {
            return Err("exactly one thread must be running");
        }
        for t in self.threads.values() {
            let queued = self.ready.contains(t.tid);
            if queued != (t.state == ThreadState::Ready) {
                return Err("ready queue membership must match READY");
            }
            if queued != (t.membership == Membership::Ready) {
                return Err("membership tag disagrees with ready queue");
            }
            if self.sleepers.contains(t.tid) && t.state != ThreadState::Blocked {
                return Err("sleepers must be blocked");
            }
        }
        if !self.ready.is_sorted() {
            return Err("ready queue out of order");
        }
        Ok(())
    }
}
