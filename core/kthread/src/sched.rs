// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! The scheduler core: life-cycle transitions, the scheduling decision and
//! the context-switch protocol.

use alloc::{boxed::Box, sync::Arc};
use core::mem;

use kerrno::KResult;
use kspin::{SpinNoPreempt, SpinRaw};

use crate::{
    arch::{Arch, IntrLevel, IrqSave},
    config::{PRI_DEFAULT, PRI_MIN, SchedConfig},
    stack::KernelStack,
    state::SchedState,
    sync::SemaId,
    thread::{Thread, ThreadState, Tid},
};

/// Callbacks into the subsystems layered above the scheduler.
pub trait SchedHooks: Send + Sync {
    /// The running thread `tid` is about to exit with `status`.
    fn thread_exit(&self, _tid: Tid, _status: i32) {}

    /// `tid` has just been switched to; its address space, if any, should
    /// be activated.
    fn activate(&self, _tid: Tid) {}
}

/// A uniprocessor thread scheduler.
pub struct Scheduler<A: Arch> {
    pub(crate) arch: A,
    pub(crate) state: SpinRaw<SchedState<A::Context>>,
    next_tid: SpinNoPreempt<u64>,
    hooks: Option<Box<dyn SchedHooks>>,
}

impl<A: Arch> Scheduler<A> {
    /// Turns the running code into the initial thread, `main`.
    ///
    /// # Panics
    ///
    /// Panics if interrupts are enabled or `config.timer_freq` is zero.
    pub fn new(arch: A, config: SchedConfig) -> Arc<Self> {
        Self::build(arch, config, None)
    }

    /// Like [`new`](Self::new), with hooks for process management.
    pub fn with_hooks(arch: A, config: SchedConfig, hooks: Box<dyn SchedHooks>) -> Arc<Self> {
        Self::build(arch, config, Some(hooks))
    }

    fn build(arch: A, config: SchedConfig, hooks: Option<Box<dyn SchedHooks>>) -> Arc<Self> {
        assert_eq!(
            arch.intr_get_level(),
            IntrLevel::Off,
            "scheduler must be initialized with interrupts off"
        );
        assert!(config.timer_freq > 0, "scheduler: timer_freq must be positive");
        info!("Initialize scheduler: policy {}", config.policy);
        let initial = Thread::new(Tid::new(1), "main", PRI_DEFAULT, arch.boot_context(), None);
        Arc::new(Self {
            state: SpinRaw::new(SchedState::new(config, initial)),
            next_tid: SpinNoPreempt::new(2),
            hooks,
            arch,
        })
    }

    /// Starts preemptive scheduling: creates the idle thread, enables
    /// interrupts and waits until idle is up.
    pub fn start(self: &Arc<Self>) -> KResult {
        let started = self.sema_create(0);
        let sched = self.clone();
        self.spawn("idle", PRI_MIN, move || sched.idle_loop(started))?;
        self.arch.intr_enable();
        self.sema_down(started);
        info!("idle thread started");
        Ok(())
    }

    fn idle_loop(&self, started: SemaId) {
        {
            let _irq = IrqSave::new(&self.arch);
            let mut st = self.state.lock();
            let tid = st.current;
            st.idle = Some(tid);
        }
        self.sema_up(started);

        loop {
            self.arch.intr_disable();
            self.block();
            self.arch.intr_enable();
            if self.arch.wait_for_interrupt() {
                self.timer_interrupt();
            }
        }
    }

    fn alloc_tid(&self) -> Tid {
        let mut next = self.next_tid.lock();
        let tid = Tid::new(*next);
        *next += 1;
        tid
    }

    /// Creates a thread running `entry(arg)` and makes it ready.
    ///
    /// The caller is preempted at once if the new thread outranks it.
    pub fn create(
        self: &Arc<Self>,
        name: &str,
        priority: i32,
        entry: fn(usize),
        arg: usize,
    ) -> KResult<Tid> {
        self.spawn(name, priority, move || entry(arg))
    }

    /// Closure form of [`create`](Self::create).
    pub fn spawn<F>(self: &Arc<Self>, name: &str, priority: i32, f: F) -> KResult<Tid>
    where
        F: FnOnce() + Send + 'static,
    {
        let tid = self.alloc_tid();
        let stack_size = {
            let _irq = IrqSave::new(&self.arch);
            self.state.lock().config.stack_size
        };
        let stack = KernelStack::new(stack_size)?;
        let sched = self.clone();
        let start: Box<dyn FnOnce() + Send> = Box::new(move || sched.thread_trampoline(f));
        let context = self.arch.new_context(name, &stack, start)?;
        let thread = Thread::new(tid, name, priority, context, Some(stack));
        debug!("create thread {} ({tid}) at priority {priority}", thread.name());

        {
            let _irq = IrqSave::new(&self.arch);
            let mut st = self.state.lock();
            st.insert_thread(thread);
            st.make_ready(tid);
        }
        self.preempt_if_outranked();
        Ok(tid)
    }

    /// First code run by every created thread.
    fn thread_trampoline<F: FnOnce()>(&self, f: F) {
        self.schedule_tail();
        self.arch.intr_enable();
        f();
        self.exit(0);
    }

    /// Puts the running thread to sleep until [`unblock`](Self::unblock).
    ///
    /// # Panics
    ///
    /// Panics in interrupt context or with interrupts on.
    pub fn block(&self) {
        assert!(!self.arch.intr_context(), "block: called from interrupt context");
        assert_eq!(
            self.arch.intr_get_level(),
            IntrLevel::Off,
            "block: interrupts must be off"
        );
        {
            let mut st = self.state.lock();
            let cur = st.current;
            st.thread_mut(cur).state = ThreadState::Blocked;
        }
        self.schedule();
    }

    /// Makes a blocked thread ready, taking it off whatever it waits on.
    /// Never preempts the caller.
    ///
    /// # Panics
    ///
    /// Panics if `tid` is not blocked.
    pub fn unblock(&self, tid: Tid) {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().make_ready(tid);
    }

    /// Gives up the CPU. The idle thread is parked instead of queued.
    ///
    /// # Panics
    ///
    /// Panics in interrupt context.
    pub fn yield_now(&self) {
        assert!(!self.arch.intr_context(), "yield: called from interrupt context");
        let _irq = IrqSave::new(&self.arch);
        {
            let mut st = self.state.lock();
            let cur = st.current;
            if st.is_idle(cur) {
                st.thread_mut(cur).state = ThreadState::Blocked;
            } else {
                st.enqueue(cur);
            }
        }
        self.schedule();
    }

    /// Terminates the running thread with `status`.
    pub fn exit(&self, status: i32) -> ! {
        assert!(!self.arch.intr_context(), "exit: called from interrupt context");
        let tid = self.tid();
        if let Some(hooks) = &self.hooks {
            hooks.thread_exit(tid, status);
        }
        // No guard: nothing after this point runs on the exiting thread.
        self.arch.intr_disable();
        let (prev, next) = {
            let mut st = self.state.lock();
            st.all_list.retain(|&t| t != tid);
            st.release_locks_of(tid);
            let t = st.thread_mut(tid);
            t.state = ThreadState::Dying;
            t.exit_status = Some(status);
            debug!("thread {} ({tid}) exits with {status}", t.name);
            self.prepare_switch(&mut st)
        }
        .unwrap_or_else(|| panic!("exit: thread {tid} was picked to run again"));
        unsafe { self.arch.exit_to(prev, next) }
    }

    /// Requests a switch if a ready thread outranks the running one: right
    /// away from thread context, on interrupt return from a handler.
    pub(crate) fn preempt_if_outranked(&self) {
        let _irq = IrqSave::new(&self.arch);
        let outranked = {
            let mut st = self.state.lock();
            let outranked = st.should_preempt();
            if outranked && self.arch.intr_context() {
                st.yield_on_return = true;
            }
            outranked
        };
        if outranked && !self.arch.intr_context() {
            self.yield_now();
        }
    }

    /// Chooses the next thread and switches to it. The running thread must
    /// already have left the RUNNING state.
    fn schedule(&self) {
        assert_eq!(
            self.arch.intr_get_level(),
            IntrLevel::Off,
            "schedule: interrupts must be off"
        );
        let switch = {
            let mut st = self.state.lock();
            assert_ne!(
                st.current().state,
                ThreadState::Running,
                "schedule: current thread is still running"
            );
            self.prepare_switch(&mut st)
        };
        if let Some((prev, next)) = switch {
            unsafe { self.arch.switch_to(prev, next) };
        }
        self.schedule_tail();
    }

    /// Picks the next thread and makes it current. Returns the two contexts
    /// to switch between, or `None` if the current thread was picked again.
    fn prepare_switch(
        &self,
        st: &mut SchedState<A::Context>,
    ) -> Option<(*mut A::Context, *const A::Context)> {
        st.check_current_intact();
        let cur = st.current;
        let next = st.pick_next();
        if next == cur {
            return None;
        }
        trace!("switch {} -> {}", st.thread(cur).name, st.thread(next).name);
        st.current = next;
        st.pending_prev = Some(cur);
        st.stats.switches += 1;
        // Control blocks are boxed, so these stay put until reclaimed.
        let prev: *mut A::Context = &mut st.thread_mut(cur).context;
        let next: *const A::Context = &st.thread(next).context;
        Some((prev, next))
    }

    /// Switch completion: runs on the new thread right after every switch.
    fn schedule_tail(&self) {
        let (tid, reclaimed) = {
            let mut st = self.state.lock();
            let cur = st.current;
            st.thread_mut(cur).state = ThreadState::Running;
            st.slice_ticks = 0;
            let reclaimed = match st.pending_prev.take() {
                Some(prev) => st.reclaim(prev),
                None => None,
            };
            (cur, reclaimed)
        };
        if let Some(hooks) = &self.hooks {
            hooks.activate(tid);
        }
        if let Some(dead) = reclaimed {
            debug!("reclaim thread {} ({})", dead.name(), dead.tid());
            drop(dead);
        }
    }

    /// Timer tick accounting. Must run in interrupt context.
    pub fn tick(&self) {
        assert!(self.arch.intr_context(), "tick: not in interrupt context");
        self.state.lock().account_tick();
    }

    /// Readies every due sleeper at the front of the sleep queue.
    pub fn wake_scan(&self) {
        let woken = {
            let _irq = IrqSave::new(&self.arch);
            self.state.lock().wake_due()
        };
        if woken > 0 {
            self.preempt_if_outranked();
        }
    }

    /// Performs a yield requested from interrupt context, if any.
    pub fn interrupt_return(&self) {
        assert!(
            !self.arch.intr_context(),
            "interrupt_return: still in interrupt context"
        );
        let pending = {
            let _irq = IrqSave::new(&self.arch);
            mem::take(&mut self.state.lock().yield_on_return)
        };
        if pending {
            self.yield_now();
        }
    }

    /// Delivers one timer interrupt: tick, wake scan, then the deferred
    /// yield on the way out.
    pub fn timer_interrupt(&self) {
        let _irq = IrqSave::new(&self.arch);
        self.arch.irq_enter();
        self.tick();
        self.wake_scan();
        self.arch.irq_exit();
        self.interrupt_return();
    }

    /// The architecture this scheduler runs on.
    pub fn arch(&self) -> &A {
        &self.arch
    }
}

#[cfg(all(test, feature = "host"))]
mod tests {
    use super::*;
    use crate::host::HostArch;

    fn boot() -> Arc<Scheduler<HostArch>> {
        let sched = Scheduler::new(HostArch::new(), SchedConfig::default());
        sched.start().unwrap();
        sched
    }

    fn clobber_current(sched: &Scheduler<HostArch>) {
        let _irq = IrqSave::new(&sched.arch);
        let mut st = sched.state.lock();
        let cur = st.current;
        st.thread_mut(cur).clobber_magic();
    }

    #[test]
    #[should_panic(expected = "kernel stack overflow")]
    fn yield_checks_stack_guard() {
        let sched = boot();
        sched.yield_now();
        clobber_current(&sched);
        sched.yield_now();
    }

    #[test]
    #[should_panic(expected = "kernel stack overflow")]
    fn timer_tick_checks_stack_guard() {
        let sched = boot();
        sched.timer_interrupt();
        clobber_current(&sched);
        sched.timer_interrupt();
    }
}
