// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! A preemptive thread scheduler for a single-CPU kernel.
//!
//! The scheduler decides which ready thread runs next and drives every
//! thread through its life cycle (created, ready, running, blocked, dying).
//! Two policies are available, chosen once at boot:
//!
//! - [`SchedPolicy::Priority`]: strict priority scheduling, round-robin among
//!   equal priorities, with priority donation through [`Lock`]s.
//! - [`SchedPolicy::Mlfqs`]: priorities derived from decayed CPU usage and
//!   niceness, computed in 17.14 [`Fixed`] point.
//!
//! Everything CPU-specific goes through the [`Arch`] trait. With the `host`
//! feature, [`HostArch`] runs kernel threads on OS threads, one at a time.
//!
//! # Cargo Features
//!
//! - `host`: Enable [`HostArch`] (needs `std`).

#![cfg_attr(not(any(test, feature = "host")), no_std)]

#[macro_use]
extern crate log;

extern crate alloc;

mod api;
mod donation;
mod sched;
mod state;
mod sync;
mod thread;

pub mod arch;
pub mod config;
pub mod fixed;
pub mod mlfqs;
pub mod ready_queue;
pub mod sleep_queue;
pub mod stack;

pub use kerrno::{KError, KErrorKind, KResult};

pub use self::{
    arch::{Arch, IntrLevel, IrqSave, ThreadStart},
    config::{
        KERNEL_STACK_SIZE, MAX_DONATION_DEPTH, NICE_DEFAULT, NICE_MAX, NICE_MIN, PRI_DEFAULT,
        PRI_MAX, PRI_MIN, SchedConfig, SchedPolicy, TIME_SLICE, TIMER_FREQ,
    },
    donation::{Donation, DonationGraph},
    fixed::Fixed,
    sched::{SchedHooks, Scheduler},
    state::SchedStats,
    sync::{Lock, LockGuard, LockId, SemaId, Semaphore},
    thread::{
        MAX_NAME_LEN, Membership, Payload, THREAD_MAGIC, ThreadInfo, ThreadState, Tid, WaitObject,
    },
};

cfg_if::cfg_if! {
    if #[cfg(feature = "host")] {
        pub mod host;
        pub use self::host::{HostArch, HostContext};
    }
}
