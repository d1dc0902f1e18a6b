// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Boot-time scheduler configuration.

use core::str::FromStr;

use strum::{Display, EnumString};

/// Lowest thread priority.
pub const PRI_MIN: i32 = 0;
/// Priority given to the initial thread and to most kernel threads.
pub const PRI_DEFAULT: i32 = 31;
/// Highest thread priority.
pub const PRI_MAX: i32 = 63;

/// Lowest (most generous) nice value.
pub const NICE_MIN: i32 = -20;
/// Nice value of a freshly created thread.
pub const NICE_DEFAULT: i32 = 0;
/// Highest (least generous) nice value.
pub const NICE_MAX: i32 = 20;

/// Timer ticks given to each thread before it is preempted.
pub const TIME_SLICE: u32 = 4;
/// Timer interrupts per second.
pub const TIMER_FREQ: u32 = 100;
/// Size of each kernel stack, in bytes.
pub const KERNEL_STACK_SIZE: usize = 4096;
/// How many lock hops a donation travels before it stops.
pub const MAX_DONATION_DEPTH: usize = 8;

/// The scheduling policy, fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SchedPolicy {
    /// Strict priority scheduling with priority donation.
    #[default]
    Priority,
    /// Multi-level feedback queue scheduling.
    Mlfqs,
}

impl SchedPolicy {
    /// Picks the policy from a kernel command line.
    ///
    /// The multi-level feedback queue scheduler is selected by `-o mlfqs`;
    /// anything else keeps the priority scheduler.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut words = cmdline.split_whitespace();
        while let Some(word) = words.next() {
            if word != "-o" {
                continue;
            }
            if words.next().and_then(|opt| Self::from_str(opt).ok()) == Some(Self::Mlfqs) {
                return Self::Mlfqs;
            }
        }
        Self::Priority
    }
}

/// Scheduler parameters, read once at initialization.
#[derive(Debug, Clone)]
pub struct SchedConfig {
    /// Which policy decides priorities.
    pub policy: SchedPolicy,
    /// Timer interrupts per second; the MLFQS load average is refreshed at
    /// this period.
    pub timer_freq: u32,
    /// Ticks in one scheduling quantum.
    pub time_slice: u32,
    /// Kernel stack size for created threads.
    pub stack_size: usize,
    /// Maximum number of hops a priority donation is propagated.
    pub max_donation_depth: usize,
}

impl SchedConfig {
    /// Creates a configuration with default parameters for `policy`.
    pub const fn new(policy: SchedPolicy) -> Self {
        Self {
            policy,
            timer_freq: TIMER_FREQ,
            time_slice: TIME_SLICE,
            stack_size: KERNEL_STACK_SIZE,
            max_donation_depth: MAX_DONATION_DEPTH,
        }
    }

    /// Whether the multi-level feedback queue scheduler is active.
    pub const fn mlfqs(&self) -> bool {
        matches!(self.policy, SchedPolicy::Mlfqs)
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new(SchedPolicy::default())
    }
}
