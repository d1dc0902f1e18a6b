// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Priority donation.
//!
//! A thread that waits for a held lock lends its effective priority to the
//! holder. If the holder is itself waiting for another lock the loan is
//! passed on, hop by hop, for at most `max_donation_depth` hops.
//!
//! Donor edges are kept in a [`DonationGraph`] keyed by thread id; a thread's
//! effective priority is always recomputed from its base priority and its
//! current donors rather than patched in place.

use alloc::{collections::BTreeMap, vec::Vec};

use crate::{state::SchedState, sync::LockId, thread::Tid};

/// One donor edge: `donor` waits for `lock`, which the graph key holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Donation {
    pub donor: Tid,
    pub lock: LockId,
}

/// Who donates to whom, and through which lock.
#[derive(Debug, Default)]
pub struct DonationGraph {
    donors: BTreeMap<Tid, Vec<Donation>>,
}

impl DonationGraph {
    pub const fn new() -> Self {
        Self {
            donors: BTreeMap::new(),
        }
    }

    /// Records that `donor` donates to `holder` through `lock`.
    pub fn add(&mut self, holder: Tid, donor: Tid, lock: LockId) {
        let edges = self.donors.entry(holder).or_default();
        let edge = Donation { donor, lock };
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }

    /// Drops every donation `holder` receives through `lock`.
    pub fn remove_lock(&mut self, holder: Tid, lock: LockId) -> usize {
        self.remove_where(holder, |e| e.lock == lock)
    }

    /// Drops the single edge `donor -> holder` through `lock`.
    pub fn remove_edge(&mut self, holder: Tid, donor: Tid, lock: LockId) -> bool {
        self.remove_where(holder, |e| e.donor == donor && e.lock == lock) > 0
    }

    /// Forgets `tid` entirely, as holder and as donor.
    pub fn forget(&mut self, tid: Tid) {
        self.donors.remove(&tid);
        self.donors.retain(|_, edges| {
            edges.retain(|e| e.donor != tid);
            !edges.is_empty()
        });
    }

    /// Threads currently donating to `holder`.
    pub fn donors_of(&self, holder: Tid) -> impl Iterator<Item = Tid> + '_ {
        self.donors
            .get(&holder)
            .into_iter()
            .flat_map(|edges| edges.iter().map(|e| e.donor))
    }

    pub fn has_donors(&self, holder: Tid) -> bool {
        self.donors.get(&holder).is_some_and(|edges| !edges.is_empty())
    }

    fn remove_where(&mut self, holder: Tid, mut pred: impl FnMut(&Donation) -> bool) -> usize {
        let Some(edges) = self.donors.get_mut(&holder) else {
            return 0;
        };
        let before = edges.len();
        edges.retain(|e| !pred(e));
        let removed = before - edges.len();
        if edges.is_empty() {
            self.donors.remove(&holder);
        }
        removed
    }
}

impl<C> SchedState<C> {
    /// `max(base, donors' effective priorities)` for `tid`.
    pub(crate) fn compute_effective(&self, tid: Tid) -> Option<i32> {
        let base = self.threads.get(&tid)?.base_priority;
        let priority = self
            .donation
            .donors_of(tid)
            .filter_map(|d| self.threads.get(&d))
            .map(|d| d.effective_priority)
            .fold(base, i32::max);
        Some(priority)
    }

    /// Recomputes the effective priority of `tid`. Returns whether it changed;
    /// a thread that no longer exists never changes.
    pub(crate) fn refresh_effective(&mut self, tid: Tid) -> bool {
        match self.compute_effective(tid) {
            Some(priority) => self.set_effective(tid, priority),
            None => false,
        }
    }

    /// Refreshes `tid`, then follows `blocking_on -> holder` links while the
    /// refresh keeps changing something, for a bounded number of hops.
    pub(crate) fn propagate_from(&mut self, start: Tid) {
        let mut tid = start;
        for _ in 0..self.config.max_donation_depth {
            if !self.refresh_effective(tid) {
                return;
            }
            trace!(
                "donation: {} now at priority {}",
                self.thread(tid).name,
                self.thread(tid).effective_priority
            );
            let next = self
                .thread(tid)
                .blocking_on
                .and_then(|lock| self.lock_holder(lock));
            match next {
                Some(holder) => tid = holder,
                None => return,
            }
        }
        debug!("donation chain from {start} cut at depth {}", self.config.max_donation_depth);
    }

    /// `donor` starts waiting for `lock`, which `holder` owns.
    pub(crate) fn donate(&mut self, donor: Tid, holder: Tid, lock: LockId) {
        self.donation.add(holder, donor, lock);
        self.propagate_from(holder);
    }

    /// The new holder of `lock` takes over the loans of its remaining
    /// waiters.
    pub(crate) fn inherit_donations(&mut self, holder: Tid, lock: LockId) {
        let waiters: Vec<Tid> = self.lock_waiters(lock).collect();
        for waiter in waiters {
            self.donation.add(holder, waiter, lock);
        }
        self.propagate_from(holder);
    }

    /// `holder` gives up `lock`: loans made through it are returned.
    pub(crate) fn withdraw_donations(&mut self, holder: Tid, lock: LockId) {
        self.donation.remove_lock(holder, lock);
        self.propagate_from(holder);
    }

    /// `donor` stops waiting for `lock` without acquiring it.
    pub(crate) fn withdraw_donor(&mut self, donor: Tid, lock: LockId) {
        if let Some(holder) = self.lock_holder(lock) {
            if self.donation.remove_edge(holder, donor, lock) {
                self.propagate_from(holder);
            }
        }
    }
}
