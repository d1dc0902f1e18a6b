// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! A hosted [`Arch`] for running the scheduler inside an ordinary process.
//!
//! Every kernel thread is backed by an OS thread, and a context is a baton:
//! switching passes the baton of the next thread and waits for one's own, so
//! exactly one kernel thread makes progress at a time. The interrupt flag is
//! a plain atomic, and the idle thread delivers a timer interrupt each time
//! it would halt, so simulated time moves whenever nothing else can run.
//!
//! An exited kernel thread hands its baton on and parks for good: its OS
//! thread is never joined and lives until the process ends. Long runs that
//! create many threads therefore accumulate parked OS threads.

use std::{
    panic::{self, AssertUnwindSafe},
    process,
    sync::{
        Arc, Condvar, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use kerrno::{KResult, k_err};

use crate::{
    arch::{Arch, IntrLevel, ThreadStart},
    stack::KernelStack,
};

#[derive(Default)]
struct Baton {
    held: Mutex<bool>,
    cond: Condvar,
}

impl Baton {
    fn pass(&self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        *held = true;
        self.cond.notify_one();
    }

    fn take(&self) {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        while !*held {
            held = self.cond.wait(held).unwrap_or_else(|e| e.into_inner());
        }
        *held = false;
    }
}

/// The saved context of a hosted kernel thread.
pub struct HostContext {
    baton: Arc<Baton>,
}

/// A simulated uniprocessor.
#[derive(Debug)]
pub struct HostArch {
    intr_on: AtomicBool,
    in_irq: AtomicBool,
}

impl HostArch {
    /// Creates a CPU with interrupts off, as at boot.
    pub const fn new() -> Self {
        Self {
            intr_on: AtomicBool::new(false),
            in_irq: AtomicBool::new(false),
        }
    }
}

impl Default for HostArch {
    fn default() -> Self {
        Self::new()
    }
}

impl Arch for HostArch {
    type Context = HostContext;

    fn intr_get_level(&self) -> IntrLevel {
        if self.intr_on.load(Ordering::SeqCst) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn intr_set_level(&self, level: IntrLevel) -> IntrLevel {
        let was_on = self.intr_on.swap(level == IntrLevel::On, Ordering::SeqCst);
        if was_on { IntrLevel::On } else { IntrLevel::Off }
    }

    fn intr_context(&self) -> bool {
        self.in_irq.load(Ordering::SeqCst)
    }

    fn irq_enter(&self) {
        let nested = self.in_irq.swap(true, Ordering::SeqCst);
        assert!(!nested, "nested external interrupt");
    }

    fn irq_exit(&self) {
        self.in_irq.store(false, Ordering::SeqCst);
    }

    fn boot_context(&self) -> HostContext {
        HostContext {
            baton: Arc::default(),
        }
    }

    fn new_context(
        &self,
        name: &str,
        _stack: &KernelStack,
        start: ThreadStart,
    ) -> KResult<HostContext> {
        let baton = Arc::<Baton>::default();
        let mine = baton.clone();
        let spawned = thread::Builder::new().name(name.into()).spawn(move || {
            mine.take();
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(start)) {
                let msg = payload
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                    .unwrap_or("<non-string payload>");
                eprintln!("kernel thread panicked: {msg}");
                process::abort();
            }
        });
        match spawned {
            Ok(_) => Ok(HostContext { baton }),
            Err(_) => k_err!(NoMemory, "cannot spawn host thread"),
        }
    }

    unsafe fn switch_to(&self, prev: *mut HostContext, next: *const HostContext) {
        // Once `next` holds the baton it may free anything, so copy first.
        let (prev, next) = unsafe { ((*prev).baton.clone(), (*next).baton.clone()) };
        next.pass();
        prev.take();
    }

    unsafe fn exit_to(&self, _prev: *mut HostContext, next: *const HostContext) -> ! {
        let next = unsafe { (*next).baton.clone() };
        next.pass();
        // The exited thread must not run again, not even destructors.
        loop {
            thread::park();
        }
    }

    fn wait_for_interrupt(&self) -> bool {
        thread::yield_now();
        true
    }
}
