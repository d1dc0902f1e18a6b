// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Threads blocked until a tick count.
//!
//! Entries are kept ordered by `(priority desc, wake_tick asc)`, where the
//! priority is the one the thread had when it went to sleep. The wake scan
//! only looks at the front: it stops at the first entry that is not yet due,
//! so a due low-priority sleeper can wait behind a higher-priority one whose
//! wake tick lies in the future.

use alloc::collections::VecDeque;

use crate::thread::Tid;

#[derive(Debug, Clone, Copy)]
struct Sleeper {
    tid: Tid,
    priority: i32,
    wake_tick: u64,
}

impl Sleeper {
    fn goes_before(&self, other: &Sleeper) -> bool {
        self.priority > other.priority
            || (self.priority == other.priority && self.wake_tick < other.wake_tick)
    }
}

#[derive(Debug, Default)]
pub struct SleepQueue {
    sleepers: VecDeque<Sleeper>,
}

impl SleepQueue {
    pub const fn new() -> Self {
        Self {
            sleepers: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.sleepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sleepers.is_empty()
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.sleepers.iter().any(|s| s.tid == tid)
    }

    /// Queues `tid` until `wake_tick`. Equal keys keep arrival order.
    pub fn insert(&mut self, tid: Tid, priority: i32, wake_tick: u64) {
        let new = Sleeper {
            tid,
            priority,
            wake_tick,
        };
        let pos = self
            .sleepers
            .iter()
            .position(|s| new.goes_before(s))
            .unwrap_or(self.sleepers.len());
        self.sleepers.insert(pos, new);
    }

    /// Pops the front entry if its wake tick is at or before `now`.
    pub fn pop_due(&mut self, now: u64) -> Option<Tid> {
        match self.sleepers.front() {
            Some(s) if s.wake_tick <= now => self.sleepers.pop_front().map(|s| s.tid),
            _ => None,
        }
    }

    pub fn remove(&mut self, tid: Tid) -> bool {
        match self.sleepers.iter().position(|s| s.tid == tid) {
            Some(pos) => {
                self.sleepers.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Iterates over `(tid, wake_tick)` in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (Tid, u64)> + '_ {
        self.sleepers.iter().map(|s| (s.tid, s.wake_tick))
    }
}
