// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Sleeping locks and counting semaphores.
//!
//! Their state lives inside the scheduler, next to the queues, so a waiter
//! is always in exactly one collection. Waiters are served highest effective
//! priority first, FIFO among equals. Lock contention triggers priority
//! donation unless MLFQS is active.

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::fmt;

use crate::{
    arch::{Arch, IrqSave},
    sched::Scheduler,
    state::SchedState,
    thread::{Membership, ThreadState, Tid, WaitObject},
};

/// Identifies a lock owned by a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(u64);

impl LockId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lock#{}", self.0)
    }
}

/// Identifies a semaphore owned by a [`Scheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemaId(u64);

impl SemaId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sema#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct LockState {
    pub(crate) holder: Option<Tid>,
    pub(crate) waiters: VecDeque<Tid>,
}

#[derive(Debug, Default)]
pub(crate) struct SemaState {
    pub(crate) value: u32,
    pub(crate) waiters: VecDeque<Tid>,
}

impl<C> SchedState<C> {
    pub(crate) fn lock_create(&mut self) -> LockId {
        let id = self.alloc_lock_id();
        self.locks.insert(id, LockState::default());
        id
    }

    pub(crate) fn sema_create(&mut self, value: u32) -> SemaId {
        let id = self.alloc_sema_id();
        self.semas.insert(
            id,
            SemaState {
                value,
                waiters: VecDeque::new(),
            },
        );
        id
    }

    fn lock_state(&mut self, lock: LockId) -> &mut LockState {
        match self.locks.get_mut(&lock) {
            Some(l) => l,
            None => panic!("{lock} does not exist"),
        }
    }

    fn sema_state(&mut self, sema: SemaId) -> &mut SemaState {
        match self.semas.get_mut(&sema) {
            Some(s) => s,
            None => panic!("{sema} does not exist"),
        }
    }

    pub(crate) fn lock_holder(&self, lock: LockId) -> Option<Tid> {
        self.locks.get(&lock).and_then(|l| l.holder)
    }

    pub(crate) fn lock_waiters(&self, lock: LockId) -> impl Iterator<Item = Tid> + '_ {
        self.locks
            .get(&lock)
            .into_iter()
            .flat_map(|l| l.waiters.iter().copied())
    }

    /// The running thread takes `lock` if it is free. Otherwise it is queued
    /// as a waiter, donating its priority, and the caller must block it.
    ///
    /// # Panics
    ///
    /// Panics if the running thread already holds `lock`.
    pub(crate) fn lock_acquire_or_wait(&mut self, lock: LockId) -> bool {
        let cur = self.current;
        let holder = self.lock_state(lock).holder;
        assert_ne!(
            holder,
            Some(cur),
            "{} tried to acquire {lock} it already holds",
            self.thread(cur).name
        );
        match holder {
            None => {
                self.lock_state(lock).holder = Some(cur);
                self.thread_mut(cur).blocking_on = None;
                if !self.config.mlfqs() {
                    self.inherit_donations(cur, lock);
                }
                true
            }
            Some(holder) => {
                self.lock_state(lock).waiters.push_back(cur);
                let t = self.thread_mut(cur);
                t.membership = Membership::Waiting(WaitObject::Lock(lock));
                t.blocking_on = Some(lock);
                if !self.config.mlfqs() {
                    self.donate(cur, holder, lock);
                }
                false
            }
        }
    }

    /// The running thread releases `lock`, returns its loans and readies the
    /// best waiter, which is returned.
    ///
    /// # Panics
    ///
    /// Panics if the running thread does not hold `lock`.
    pub(crate) fn lock_release_by_current(&mut self, lock: LockId) -> Option<Tid> {
        let cur = self.current;
        let holder = self.lock_state(lock).holder;
        assert_eq!(
            holder,
            Some(cur),
            "{} released {lock} it does not hold",
            self.thread(cur).name
        );
        self.lock_state(lock).holder = None;
        if !self.config.mlfqs() {
            self.withdraw_donations(cur, lock);
        }
        let woken = self.take_best_waiter(WaitObject::Lock(lock))?;
        self.thread_mut(woken).blocking_on = None;
        self.make_ready(woken);
        Some(woken)
    }

    /// Frees every lock `tid` still holds and readies each lock's best
    /// waiter. Used when a holder exits without releasing.
    pub(crate) fn release_locks_of(&mut self, tid: Tid) -> usize {
        let held: Vec<LockId> = self
            .locks
            .iter()
            .filter(|(_, l)| l.holder == Some(tid))
            .map(|(&id, _)| id)
            .collect();
        for &lock in &held {
            warn!("thread {} exits holding {lock}", self.thread(tid).name);
            self.lock_state(lock).holder = None;
            self.donation.remove_lock(tid, lock);
            if let Some(woken) = self.take_best_waiter(WaitObject::Lock(lock)) {
                self.thread_mut(woken).blocking_on = None;
                self.make_ready(woken);
            }
        }
        held.len()
    }

    /// The running thread takes one unit of `sema`, or is queued and the
    /// caller must block it.
    pub(crate) fn sema_down_or_wait(&mut self, sema: SemaId) -> bool {
        let cur = self.current;
        let s = self.sema_state(sema);
        if s.value > 0 {
            s.value -= 1;
            return true;
        }
        s.waiters.push_back(cur);
        self.thread_mut(cur).membership = Membership::Waiting(WaitObject::Sema(sema));
        false
    }

    /// Adds one unit to `sema` and readies the best waiter.
    pub(crate) fn sema_up_inner(&mut self, sema: SemaId) -> Option<Tid> {
        self.sema_state(sema).value += 1;
        let woken = self.take_best_waiter(WaitObject::Sema(sema))?;
        self.make_ready(woken);
        Some(woken)
    }
}

impl<A: Arch> Scheduler<A> {
    /// Creates an unheld lock.
    pub fn lock_create(&self) -> LockId {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().lock_create()
    }

    /// Acquires `lock`, sleeping until it is available.
    ///
    /// # Panics
    ///
    /// Panics in interrupt context, or if the running thread already holds
    /// `lock`.
    pub fn lock_acquire(&self, lock: LockId) {
        assert!(!self.arch.intr_context(), "lock_acquire: called from interrupt context");
        let _irq = IrqSave::new(&self.arch);
        while !self.state.lock().lock_acquire_or_wait(lock) {
            self.block();
        }
    }

    /// Acquires `lock` only if it is free.
    pub fn lock_try_acquire(&self, lock: LockId) -> bool {
        let _irq = IrqSave::new(&self.arch);
        let mut st = self.state.lock();
        if st.lock_holder(lock).is_some() {
            return false;
        }
        st.lock_acquire_or_wait(lock)
    }

    /// Releases `lock`, yielding if a waiter now outranks the caller.
    ///
    /// # Panics
    ///
    /// Panics if the running thread does not hold `lock`.
    pub fn lock_release(&self, lock: LockId) {
        {
            let _irq = IrqSave::new(&self.arch);
            self.state.lock().lock_release_by_current(lock);
        }
        self.preempt_if_outranked();
    }

    /// Whether the running thread holds `lock`.
    pub fn lock_held_by_current(&self, lock: LockId) -> bool {
        let _irq = IrqSave::new(&self.arch);
        let st = self.state.lock();
        st.lock_holder(lock) == Some(st.current)
    }

    /// Creates a semaphore holding `value` units.
    pub fn sema_create(&self, value: u32) -> SemaId {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().sema_create(value)
    }

    /// Waits for a unit of `sema` and takes it.
    ///
    /// # Panics
    ///
    /// Panics in interrupt context.
    pub fn sema_down(&self, sema: SemaId) {
        assert!(!self.arch.intr_context(), "sema_down: called from interrupt context");
        let _irq = IrqSave::new(&self.arch);
        while !self.state.lock().sema_down_or_wait(sema) {
            self.block();
        }
    }

    /// Takes a unit of `sema` if one is available.
    pub fn sema_try_down(&self, sema: SemaId) -> bool {
        let _irq = IrqSave::new(&self.arch);
        let mut st = self.state.lock();
        let s = st.sema_state(sema);
        if s.value > 0 {
            s.value -= 1;
            true
        } else {
            false
        }
    }

    /// Adds a unit to `sema`, waking the best waiter. May be called from
    /// interrupt context.
    pub fn sema_up(&self, sema: SemaId) {
        {
            let _irq = IrqSave::new(&self.arch);
            self.state.lock().sema_up_inner(sema);
        }
        self.preempt_if_outranked();
    }

    /// Units currently available in `sema`.
    pub fn sema_value(&self, sema: SemaId) -> u32 {
        let _irq = IrqSave::new(&self.arch);
        self.state.lock().sema_state(sema).value
    }

    /// Whether `tid` is asleep on a lock or semaphore.
    pub fn is_waiting(&self, tid: Tid) -> bool {
        let _irq = IrqSave::new(&self.arch);
        let st = self.state.lock();
        st.live_thread(tid).is_some_and(|t| {
            t.state == ThreadState::Blocked && matches!(t.membership, Membership::Waiting(_))
        })
    }
}

/// A sleeping lock bound to its scheduler.
pub struct Lock<A: Arch> {
    sched: Arc<Scheduler<A>>,
    id: LockId,
}

impl<A: Arch> Lock<A> {
    pub fn new(sched: &Arc<Scheduler<A>>) -> Self {
        Self {
            id: sched.lock_create(),
            sched: sched.clone(),
        }
    }

    pub fn id(&self) -> LockId {
        self.id
    }

    /// Acquires the lock and returns a guard that releases it.
    pub fn lock(&self) -> LockGuard<'_, A> {
        self.sched.lock_acquire(self.id);
        LockGuard { lock: self }
    }

    /// Acquires the lock if it is free.
    pub fn try_lock(&self) -> Option<LockGuard<'_, A>> {
        self.sched
            .lock_try_acquire(self.id)
            .then(|| LockGuard { lock: self })
    }

    pub fn is_held_by_current(&self) -> bool {
        self.sched.lock_held_by_current(self.id)
    }
}

/// Releases its [`Lock`] on drop.
pub struct LockGuard<'a, A: Arch> {
    lock: &'a Lock<A>,
}

impl<A: Arch> Drop for LockGuard<'_, A> {
    fn drop(&mut self) {
        self.lock.sched.lock_release(self.lock.id);
    }
}

/// A counting semaphore bound to its scheduler.
pub struct Semaphore<A: Arch> {
    sched: Arc<Scheduler<A>>,
    id: SemaId,
}

impl<A: Arch> Semaphore<A> {
    /// Creates a semaphore with the given number of permits.
    pub fn new(sched: &Arc<Scheduler<A>>, permits: u32) -> Self {
        Self {
            id: sched.sema_create(permits),
            sched: sched.clone(),
        }
    }

    pub fn id(&self) -> SemaId {
        self.id
    }

    /// Acquires a permit, blocking until one is available.
    pub fn acquire(&self) {
        self.sched.sema_down(self.id);
    }

    /// Tries to acquire a permit without blocking.
    pub fn try_acquire(&self) -> bool {
        self.sched.sema_try_down(self.id)
    }

    /// Releases a permit.
    pub fn release(&self) {
        self.sched.sema_up(self.id);
    }

    /// Returns the current number of available permits.
    pub fn available_permits(&self) -> u32 {
        self.sched.sema_value(self.id)
    }
}
