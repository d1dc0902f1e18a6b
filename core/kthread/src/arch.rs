// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! The CPU operations the scheduler is built on.

use alloc::boxed::Box;

use kerrno::KResult;

use crate::stack::KernelStack;

/// Code run the first time a new context is switched to. It never returns.
pub type ThreadStart = Box<dyn FnOnce() + Send + 'static>;

/// Interrupt enable state of the CPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// A single CPU: interrupt masking and register-context switching.
///
/// There is only ever one CPU, so an implementation's interrupt flag is
/// global to every thread it runs.
pub trait Arch: Send + Sync + 'static {
    /// Saved register state of a suspended thread.
    type Context: Send;

    fn intr_get_level(&self) -> IntrLevel;

    /// Sets the interrupt level and returns the previous one.
    fn intr_set_level(&self, level: IntrLevel) -> IntrLevel;

    fn intr_disable(&self) -> IntrLevel {
        self.intr_set_level(IntrLevel::Off)
    }

    fn intr_enable(&self) -> IntrLevel {
        self.intr_set_level(IntrLevel::On)
    }

    /// Whether an external interrupt is being handled.
    fn intr_context(&self) -> bool;

    /// Marks entry into an external interrupt handler.
    fn irq_enter(&self);

    /// Marks return from an external interrupt handler.
    fn irq_exit(&self);

    /// The context of the code that is running at boot. It becomes the
    /// initial thread.
    fn boot_context(&self) -> Self::Context;

    /// Prepares a context that runs `start` on `stack` when first switched
    /// to.
    fn new_context(&self, name: &str, stack: &KernelStack, start: ThreadStart)
    -> KResult<Self::Context>;

    /// Saves the running state into `prev` and resumes `next`. Returns when
    /// something switches back to `prev`.
    ///
    /// # Safety
    ///
    /// Interrupts must be off. Both pointers must be valid and distinct, and
    /// `prev` must belong to the running thread.
    unsafe fn switch_to(&self, prev: *mut Self::Context, next: *const Self::Context);

    /// Like [`switch_to`](Arch::switch_to), but `prev` is never resumed.
    ///
    /// # Safety
    ///
    /// Same as [`switch_to`](Arch::switch_to).
    unsafe fn exit_to(&self, prev: *mut Self::Context, next: *const Self::Context) -> !;

    /// Halts until the next interrupt. Returns `true` if the caller should
    /// deliver a timer interrupt itself.
    fn wait_for_interrupt(&self) -> bool;
}

/// Disables interrupts for its lifetime and restores the previous level on
/// drop.
pub struct IrqSave<'a, A: Arch + ?Sized> {
    arch: &'a A,
    saved: IntrLevel,
}

impl<'a, A: Arch + ?Sized> IrqSave<'a, A> {
    pub fn new(arch: &'a A) -> Self {
        let saved = arch.intr_disable();
        Self { arch, saved }
    }

    /// The level that will be restored.
    pub fn saved(&self) -> IntrLevel {
        self.saved
    }
}

impl<A: Arch + ?Sized> Drop for IrqSave<'_, A> {
    fn drop(&mut self) {
        self.arch.intr_set_level(self.saved);
    }
}
