// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Runnable threads, highest effective priority first.

use alloc::collections::VecDeque;

use crate::thread::Tid;

#[derive(Debug, Clone, Copy)]
struct Entry {
    tid: Tid,
    priority: i32,
}

/// Threads in the READY state, ordered by descending priority and FIFO among
/// equal priorities.
///
/// Each entry caches the priority it was queued with. Whoever changes the
/// effective priority of a queued thread must call [`reposition`] (or
/// [`resort`] after a bulk change) before the next scheduling decision.
///
/// [`reposition`]: ReadyQueue::reposition
/// [`resort`]: ReadyQueue::resort
#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: VecDeque<Entry>,
}

impl ReadyQueue {
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, tid: Tid) -> bool {
        self.entries.iter().any(|e| e.tid == tid)
    }

    /// Inserts `tid` behind every entry of equal or higher priority.
    pub fn push(&mut self, tid: Tid, priority: i32) {
        let pos = self
            .entries
            .iter()
            .position(|e| e.priority < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry { tid, priority });
    }

    /// Removes and returns the highest-priority, longest-waiting thread.
    pub fn pop_front(&mut self) -> Option<Tid> {
        self.entries.pop_front().map(|e| e.tid)
    }

    /// Priority of the thread that would be dispatched next.
    pub fn front_priority(&self) -> Option<i32> {
        self.entries.front().map(|e| e.priority)
    }

    /// Removes `tid`, returning whether it was queued.
    pub fn remove(&mut self, tid: Tid) -> bool {
        match self.entries.iter().position(|e| e.tid == tid) {
            Some(pos) => {
                self.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Moves `tid` to the back of its new priority band.
    ///
    /// Returns `false`, leaving the queue alone, if `tid` is not queued.
    pub fn reposition(&mut self, tid: Tid, priority: i32) -> bool {
        if !self.remove(tid) {
            return false;
        }
        self.push(tid, priority);
        true
    }

    /// Refreshes every cached priority from `priority_of`, then stably sorts.
    pub fn resort(&mut self, mut priority_of: impl FnMut(Tid) -> i32) {
        for e in self.entries.iter_mut() {
            e.priority = priority_of(e.tid);
        }
        self.entries
            .make_contiguous()
            .sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Iterates over `(tid, priority)` in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = (Tid, i32)> + '_ {
        self.entries.iter().map(|e| (e.tid, e.priority))
    }

    /// Whether the queue is in non-increasing priority order.
    pub fn is_sorted(&self) -> bool {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .all(|(a, b)| a.priority >= b.priority)
    }
}
