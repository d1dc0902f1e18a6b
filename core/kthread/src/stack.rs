// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 KylinSoft Co., Ltd. <https://www.kylinos.cn/>
// See LICENSES for license details.

//! Kernel stacks, allocated apart from the thread control block.

use alloc::vec::Vec;

use kerrno::{KResult, k_err};

/// Word written at the lowest address of every kernel stack. A stack that
/// grows past its end clobbers it first.
pub const STACK_CANARY: u64 = 0x5354_4143_4b5f_4f4b;

const CANARY_LEN: usize = core::mem::size_of::<u64>();

/// A kernel stack owned by exactly one thread.
pub struct KernelStack {
    mem: Vec<u8>,
}

impl KernelStack {
    /// Allocates a zeroed stack of `size` bytes and plants the canary.
    ///
    /// Returns [`NoMemory`](kerrno::KErrorKind::NoMemory) when the allocation
    /// cannot be satisfied.
    pub fn new(size: usize) -> KResult<Self> {
        let size = size.max(CANARY_LEN);
        let mut mem = Vec::new();
        if mem.try_reserve_exact(size).is_err() {
            return k_err!(NoMemory, "kernel stack allocation failed");
        }
        mem.resize(size, 0);
        mem[..CANARY_LEN].copy_from_slice(&STACK_CANARY.to_ne_bytes());
        Ok(Self { mem })
    }

    /// Size of the stack in bytes.
    pub fn size(&self) -> usize {
        self.mem.len()
    }

    /// Lowest address of the stack.
    pub fn bottom(&self) -> usize {
        self.mem.as_ptr() as usize
    }

    /// One past the highest address; the initial stack pointer.
    pub fn top(&self) -> usize {
        self.bottom() + self.size()
    }

    /// Whether the canary at the low end is still intact.
    pub fn canary_intact(&self) -> bool {
        self.mem[..CANARY_LEN] == STACK_CANARY.to_ne_bytes()
    }

    #[cfg(test)]
    pub(crate) fn clobber_canary(&mut self) {
        self.mem[0] ^= 0xff;
    }
}

impl core::fmt::Debug for KernelStack {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KernelStack")
            .field("bottom", &format_args!("{:#x}", self.bottom()))
            .field("size", &self.size())
            .finish()
    }
}
