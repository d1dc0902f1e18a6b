// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! The thread control block.

use alloc::{boxed::Box, string::String};
use core::{any::Any, fmt};

use strum::Display;

use crate::{
    config::{NICE_DEFAULT, PRI_MAX, PRI_MIN},
    fixed::Fixed,
    stack::KernelStack,
    sync::{LockId, SemaId},
};

/// Stack-overflow guard stored in every control block.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Longest thread name kept, in bytes.
pub const MAX_NAME_LEN: usize = 15;

/// A unique thread identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(u64);

impl Tid {
    /// Wraps a raw identifier.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Converts the thread identifier to a `u64`.
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The possible states of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ThreadState {
    /// Currently on the CPU.
    Running,
    /// In the ready queue.
    Ready,
    /// Waiting for an event.
    Blocked,
    /// Exited; reclaimed at the next switch completion.
    Dying,
}

/// A synchronization object a blocked thread is queued on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitObject {
    Lock(LockId),
    Sema(SemaId),
}

/// Which scheduler-owned collection currently holds a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Membership {
    #[default]
    None,
    Ready,
    Sleep,
    Waiting(WaitObject),
}

/// Data attached to a thread by other subsystems. The scheduler stores it and
/// checks whether an address space is present, nothing more.
#[derive(Default)]
pub struct Payload {
    pub address_space: Option<Box<dyn Any + Send>>,
    pub files: Option<Box<dyn Any + Send>>,
}

impl Payload {
    /// Whether the thread runs on behalf of a user process.
    pub fn has_address_space(&self) -> bool {
        self.address_space.is_some()
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Payload")
            .field("address_space", &self.address_space.is_some())
            .field("files", &self.files.is_some())
            .finish()
    }
}

/// The control block of a kernel thread, generic over the saved context.
pub struct Thread<C> {
    pub(crate) tid: Tid,
    pub(crate) name: String,
    pub(crate) state: ThreadState,
    pub(crate) base_priority: i32,
    pub(crate) effective_priority: i32,
    pub(crate) nice: i32,
    pub(crate) recent_cpu: Fixed,
    pub(crate) wake_tick: u64,
    pub(crate) blocking_on: Option<LockId>,
    pub(crate) membership: Membership,
    pub(crate) exit_status: Option<i32>,
    pub(crate) payload: Payload,
    pub(crate) context: C,
    /// `None` for the initial thread, which runs on the boot stack.
    pub(crate) stack: Option<KernelStack>,
    magic: u32,
}

impl<C> Thread<C> {
    /// Builds a blocked thread.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is outside `[PRI_MIN, PRI_MAX]`.
    pub(crate) fn new(
        tid: Tid,
        name: &str,
        priority: i32,
        context: C,
        stack: Option<KernelStack>,
    ) -> Self {
        assert!(
            (PRI_MIN..=PRI_MAX).contains(&priority),
            "thread {name}: priority {priority} out of range"
        );
        Self {
            tid,
            name: truncate_name(name),
            state: ThreadState::Blocked,
            base_priority: priority,
            effective_priority: priority,
            nice: NICE_DEFAULT,
            recent_cpu: Fixed::ZERO,
            wake_tick: 0,
            blocking_on: None,
            membership: Membership::None,
            exit_status: None,
            payload: Payload::default(),
            context,
            stack,
            magic: THREAD_MAGIC,
        }
    }

    pub fn tid(&self) -> Tid {
        self.tid
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn priority(&self) -> i32 {
        self.effective_priority
    }

    /// Whether the control block and the stack canary are both intact.
    pub fn is_intact(&self) -> bool {
        self.magic == THREAD_MAGIC && self.stack.as_ref().is_none_or(KernelStack::canary_intact)
    }

    /// Takes a snapshot for callers outside the scheduler.
    pub(crate) fn info(&self) -> ThreadInfo {
        ThreadInfo {
            tid: self.tid,
            name: self.name.clone(),
            state: self.state,
            priority: self.effective_priority,
            base_priority: self.base_priority,
            nice: self.nice,
            recent_cpu: self.recent_cpu,
            blocking_on: self.blocking_on,
            wake_tick: (self.membership == Membership::Sleep).then_some(self.wake_tick),
            exit_status: self.exit_status,
            user: self.payload.has_address_space(),
        }
    }

    #[cfg(test)]
    pub(crate) fn clobber_magic(&mut self) {
        self.magic = 0;
    }
}

impl<C> fmt::Debug for Thread<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("tid", &self.tid)
            .field("name", &self.name)
            .field("state", &self.state)
            .field("priority", &self.effective_priority)
            .field("membership", &self.membership)
            .finish_non_exhaustive()
    }
}

/// A copy of a thread's scheduling attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: Tid,
    pub name: String,
    pub state: ThreadState,
    /// Effective priority, including donations.
    pub priority: i32,
    pub base_priority: i32,
    pub nice: i32,
    pub recent_cpu: Fixed,
    pub blocking_on: Option<LockId>,
    /// Set while the thread is on the sleep queue.
    pub wake_tick: Option<u64>,
    pub exit_status: Option<i32>,
    /// Whether an address space is attached.
    pub user: bool,
}

fn truncate_name(name: &str) -> String {
    if name.len() <= MAX_NAME_LEN {
        return name.into();
    }
    let mut end = MAX_NAME_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_thread_is_blocked() {
        let t = Thread::new(Tid::new(3), "worker", 20, (), None);
        assert_eq!(t.state(), ThreadState::Blocked);
        assert_eq!(t.priority(), 20);
        assert_eq!(t.membership, Membership::None);
        assert!(t.is_intact());
    }

    #[test]
    fn long_names_are_truncated() {
        let t = Thread::new(Tid::new(1), "a-very-long-thread-name", 0, (), None);
        assert_eq!(t.name(), "a-very-long-thr");
        // 'é' is two bytes; byte 15 falls inside the eighth one.
        let t = Thread::new(Tid::new(2), "ééééééééé", 0, (), None);
        assert_eq!(t.name(), "ééééééé");
    }

    #[test]
    fn magic_and_canary_are_checked() {
        let mut t = Thread::new(Tid::new(1), "t", 0, (), Some(KernelStack::new(128).unwrap()));
        assert!(t.is_intact());
        t.stack.as_mut().unwrap().clobber_canary();
        assert!(!t.is_intact());

        let mut t = Thread::new(Tid::new(2), "u", 0, (), None);
        t.clobber_magic();
        assert!(!t.is_intact());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn bad_priority_panics() {
        let _ = Thread::new(Tid::new(1), "t", 64, (), None);
    }

    #[test]
    fn state_names() {
        assert_eq!(ThreadState::Running.to_string(), "RUNNING");
        assert_eq!(ThreadState::Dying.to_string(), "DYING");
    }
}
