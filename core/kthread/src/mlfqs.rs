// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Multi-level feedback queue calculator.
//!
//! Priorities under MLFQS are derived, never requested:
//!
//! ```text
//! load_avg   = (59/60) * load_avg + (1/60) * ready_count      every second
//! recent_cpu = (2*load_avg) / (2*load_avg + 1) * recent_cpu + nice
//!                                                             every second
//! priority   = PRI_MAX - recent_cpu / 4 - nice * 2            every 4 ticks
//! ```
//!
//! Everything here is pure arithmetic over [`Fixed`]; the scheduler decides
//! when to apply it and to which threads.

use crate::{
    config::{PRI_MAX, PRI_MIN, TIME_SLICE},
    fixed::Fixed,
};

/// System-wide MLFQS bookkeeping.
#[derive(Debug, Clone)]
pub struct Mlfqs {
    load_avg: Fixed,
    timer_freq: u32,
}

impl Mlfqs {
    /// Starts with a zero load average.
    pub const fn new(timer_freq: u32) -> Self {
        Self {
            load_avg: Fixed::ZERO,
            timer_freq,
        }
    }

    /// Current load average.
    pub const fn load_avg(&self) -> Fixed {
        self.load_avg
    }

    /// Whether `ticks` ends a one-second period.
    pub const fn is_second_boundary(&self, ticks: u64) -> bool {
        ticks % self.timer_freq as u64 == 0
    }

    /// Whether `ticks` ends a priority-recompute period.
    pub const fn is_priority_boundary(ticks: u64) -> bool {
        ticks % TIME_SLICE as u64 == 0
    }

    /// Folds one second's sample of runnable threads into the load average.
    ///
    /// `ready_count` is the length of the ready queue plus one when the
    /// running thread is not the idle thread.
    pub fn update_load_avg(&mut self, ready_count: usize) {
        self.load_avg = next_load_avg(self.load_avg, ready_count as i32);
    }

    /// Applies the once-per-second decay to one thread's `recent_cpu`.
    pub fn decay(&self, recent_cpu: Fixed, nice: i32) -> Fixed {
        decay_recent_cpu(recent_cpu, self.load_avg, nice)
    }
}

/// `(59/60) * load_avg + (1/60) * ready_count`.
pub fn next_load_avg(load_avg: Fixed, ready_count: i32) -> Fixed {
    Fixed::from_int(59).div_int(60) * load_avg + Fixed::from_int(ready_count).div_int(60)
}

/// `(2*load_avg) / (2*load_avg + 1) * recent_cpu + nice`.
pub fn decay_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i32) -> Fixed {
    let twice = load_avg.mul_int(2);
    (twice / twice.add_int(1) * recent_cpu).add_int(nice)
}

/// `PRI_MAX - recent_cpu/4 - nice*2`, truncated and clamped to the valid
/// priority range.
pub fn priority(recent_cpu: Fixed, nice: i32) -> i32 {
    let p = Fixed::from_int(PRI_MAX) - recent_cpu.div_int(4) - Fixed::from_int(nice * 2);
    p.to_int_trunc().clamp(PRI_MIN, PRI_MAX)
}

/// Scales a fixed-point statistic by 100 for reporting, truncating.
pub fn times_100(value: Fixed) -> i32 {
    value.mul_int(100).to_int_trunc()
}
