// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Thread attributes, priorities, timed waits and statistics.

use alloc::{boxed::Box, vec::Vec};
use core::any::Any;

use kerrno::{KResult, k_err};

use crate::{
    arch::{Arch, IntrLevel, IrqSave},
    config::{NICE_MAX, NICE_MIN, PRI_MAX, PRI_MIN, SchedPolicy},
    mlfqs,
    sched::Scheduler,
    state::SchedStats,
    thread::{Payload, ThreadInfo, Tid},
};

impl<A: Arch> Scheduler<A> {
    /// Snapshot of the running thread.
    ///
    /// # Panics
    ///
    /// Panics if the running thread's guard word or stack canary has been
    /// overwritten.
    pub fn current(&self) -> ThreadInfo {
        let _irq = IrqSave::new(&self.arch);
        let st = self.state.lock();
        st.check_current_intact();
        st.current().info()
    }

    pub fn tid(&self) -> Tid {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().current
    }

    pub fn name(&self) -> alloc::string::String {
        self.current().name
    }

    /// Looks up a live thread.
    pub fn thread_info(&self, tid: Tid) -> KResult<ThreadInfo> {
        let _irq = IrqSave::new(&self.arch);
        match self.state.lock().live_thread(tid) {
            Some(t) => Ok(t.info()),
            None => k_err!(NoSuchThread),
        }
    }

    /// Calls `visitor` on every live thread, in creation order.
    ///
    /// # Panics
    ///
    /// Panics if interrupts are on.
    pub fn for_each_thread(&self, mut visitor: impl FnMut(&ThreadInfo)) {
        assert_eq!(
            self.arch.intr_get_level(),
            IntrLevel::Off,
            "for_each_thread: interrupts must be off"
        );
        let infos: Vec<ThreadInfo> = {
            let st = self.state.lock();
            st.all_list.iter().map(|&tid| st.thread(tid).info()).collect()
        };
        infos.iter().for_each(&mut visitor);
    }

    /// The policy chosen at boot.
    pub fn policy(&self) -> SchedPolicy {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().config.policy
    }

    /// Sets the running thread's base priority. Ignored under MLFQS.
    ///
    /// Yields if the thread no longer has the highest priority.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is outside `[PRI_MIN, PRI_MAX]`.
    pub fn set_priority(&self, priority: i32) {
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "set_priority: {priority} out of range"
        );
        {
            let _irq = IrqSave::new(&self.arch);
            let mut st = self.state.lock();
            if st.config.mlfqs() {
                return;
            }
            let cur = st.current;
            st.thread_mut(cur).base_priority = priority;
            st.refresh_effective(cur);
        }
        self.preempt_if_outranked();
    }

    /// The running thread's effective priority.
    pub fn get_priority(&self) -> i32 {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().current().effective_priority
    }

    /// Sets the running thread's nice value, clamped to
    /// `[NICE_MIN, NICE_MAX]`, and recomputes its priority under MLFQS.
    pub fn set_nice(&self, nice: i32) {
        {
            let _irq = IrqSave::new(&self.arch);
            let mut st = self.state.lock();
            let cur = st.current;
            st.thread_mut(cur).nice = nice.clamp(NICE_MIN, NICE_MAX);
            if st.config.mlfqs() {
                st.mlfqs_recompute(cur);
            }
        }
        self.preempt_if_outranked();
    }

    pub fn get_nice(&self) -> i32 {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().current().nice
    }

    /// 100 times the running thread's `recent_cpu`, truncated.
    pub fn get_recent_cpu(&self) -> i32 {
        let _irq = IrqSave::new(&self.arch);
        mlfqs::times_100(self.state.lock().current().recent_cpu)
    }

    /// 100 times the system load average, truncated.
    pub fn get_load_avg(&self) -> i32 {
        let _irq = IrqSave::new(&self.arch);
        mlfqs::times_100(self.state.lock().mlfqs.load_avg())
    }

    /// Puts `tid` on the sleep queue until `wake_tick`. The caller blocks it.
    ///
    /// # Panics
    ///
    /// Panics if interrupts are on, or if `tid` is ready or already queued.
    pub fn register_sleep(&self, tid: Tid, wake_tick: u64) {
        assert_eq!(
            self.arch.intr_get_level(),
            IntrLevel::Off,
            "register_sleep: interrupts must be off"
        );
        self.state.lock().register_sleep(tid, wake_tick);
    }

    /// Blocks the running thread until the tick count reaches `wake_tick`.
    /// Returns at once if it already has.
    pub fn sleep_until(&self, wake_tick: u64) {
        let _irq = IrqSave::new(&self.arch);
        let tid = {
            let st = self.state.lock();
            if wake_tick <= st.stats.ticks {
                return;
            }
            st.current
        };
        self.register_sleep(tid, wake_tick);
        self.block();
    }

    /// Blocks the running thread for `ticks` timer ticks.
    pub fn sleep(&self, ticks: u64) {
        let now = self.ticks();
        self.sleep_until(now + ticks);
    }

    /// Timer ticks since boot.
    pub fn ticks(&self) -> u64 {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().stats.ticks
    }

    /// Attaches an address space to `tid`. Ticks it spends running then
    /// count as user ticks.
    pub fn set_address_space(&self, tid: Tid, space: Box<dyn Any + Send>) -> KResult {
        self.with_payload(tid, |p| p.address_space = Some(space))
    }

    /// Attaches an open-file table to `tid`.
    pub fn set_files(&self, tid: Tid, files: Box<dyn Any + Send>) -> KResult {
        self.with_payload(tid, |p| p.files = Some(files))
    }

    /// Runs `f` on the payload of `tid` with interrupts off. `f` must not
    /// call back into the scheduler.
    pub fn with_payload<R>(&self, tid: Tid, f: impl FnOnce(&mut Payload) -> R) -> KResult<R> {
        let _irq = IrqSave::new(&self.arch);
        let mut st = self.state.lock();
        if st.live_thread(tid).is_none() {
            return k_err!(NoSuchThread);
        }
        Ok(f(&mut st.thread_mut(tid).payload))
    }

    pub fn stats(&self) -> SchedStats {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().stats
    }

    /// Logs the tick counters.
    pub fn print_stats(&self) {
        let s = self.stats();
        info!(
            "Thread: {} idle ticks, {} kernel ticks, {} user ticks",
            s.idle_ticks, s.kernel_ticks, s.user_ticks
        );
    }

    /// Checks the scheduler's structural invariants.
    pub fn check_invariants(&self) -> Result<(), &'static str> {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().check_invariants()
    }
}
