// Copyright 2013 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! The machine-context primitive: capture, build, and atomically swap
//! the register set that identifies where a coroutine is about to run.
//!
//! The actual save/restore is hand-written assembly per architecture,
//! compiled by `build.rs` and linked in as `coroutine_swap_registers` /
//! `coroutine_bootstrap`. This module only builds the initial register
//! image for a freshly created coroutine and exposes a safe-ish `swap`.

/// Signature of the trampoline `Scheduler::resume` installs into a
/// freshly built context. Receives the scheduler pointer split across
/// two machine words (see module docs on `coroutine_bootstrap`) and
/// never returns normally -- the coroutine's own death sequence swaps
/// back into `main_context` instead.
pub type TrampolineFn = extern "C" fn(u32, u32) -> !;

extern "C" {
    fn coroutine_swap_registers(out_regs: *mut Registers, in_regs: *const Registers);
    fn coroutine_bootstrap();
}

#[cfg(target_arch = "x86_64")]
#[repr(C)]
#[derive(Debug, Default)]
struct Registers {
    rsp: u64,
    rbx: u64,
    rbp: u64,
    r12: u64,
    r13: u64,
    r14: u64,
    r15: u64,
}

#[cfg(target_arch = "aarch64")]
#[repr(C)]
#[derive(Debug, Default)]
struct Registers {
    sp: u64,
    x19: u64,
    x20: u64,
    x21: u64,
    x22: u64,
    x23: u64,
    x24: u64,
    x25: u64,
    x26: u64,
    x27: u64,
    x28: u64,
    x29: u64,
    x30: u64,
}

/// A captured machine context: a saved stack pointer plus the
/// callee-saved registers needed to resume execution at the point the
/// context was swapped out.
#[derive(Debug)]
pub struct Context {
    regs: Registers,
}

impl Context {
    /// An empty context, suitable only as the `out` side of a `swap` or
    /// as a placeholder before a real context is built.
    pub fn empty() -> Context {
        Context {
            regs: Registers::default(),
        }
    }

    /// Build a context that, when first swapped into, starts executing
    /// `trampoline(low, high)` on `stack_high` (the high, exclusive end
    /// of the stack region; the stack grows down from there).
    ///
    /// The scheduler pointer is passed through as two 32-bit halves
    /// rather than a single pointer-sized argument: some machine-context
    /// creation facilities (the `ucontext`-based `makecontext` this
    /// library's C ancestor used, in particular) only accept
    /// `int`-sized varargs, and the bootstrap stub preserves that
    /// two-word handoff on the hand-written path too.
    pub fn new(trampoline: TrampolineFn, stack_high: *mut u8, low: u32, high: u32) -> Context {
        let mut regs = Registers::default();
        let entry = trampoline as usize as u64;
        init_call_frame(&mut regs, stack_high, entry, low as u64, high as u64);
        Context { regs }
    }

    /// Suspend the current context into `self`, and resume `other`.
    ///
    /// # Safety
    /// `self` must be the context of the execution making this call
    /// (i.e. the call must happen from the stack `self` will later be
    /// resumed onto), and `other` must have been built by
    /// `Context::new` or be a context previously suspended by its own
    /// `swap`.
    #[inline]
    pub unsafe fn swap(&mut self, other: &Context) {
        coroutine_swap_registers(&mut self.regs, &other.regs);
    }
}

#[cfg(target_arch = "x86_64")]
fn init_call_frame(regs: &mut Registers, stack_high: *mut u8, entry: u64, low: u64, high: u64) {
    // The first `ret` inside coroutine_swap_registers pops the address
    // at the new rsp and jumps there, so a fresh context needs that
    // slot pre-seeded with coroutine_bootstrap's address. SysV requires
    // %rsp == 8 (mod 16) at a normal function's entry (the state right
    // after a `call` pushes its return address); this `ret` simulates
    // that push, so the slot holding coroutine_bootstrap's address must
    // itself sit at a 16-aligned address for the post-pop %rsp to land
    // on 8 (mod 16).
    let sp = ((stack_high as usize) & !0xf) as *mut u64;
    unsafe {
        *sp = coroutine_bootstrap as usize as u64;
    }

    regs.rsp = sp as u64;
    regs.r12 = low;
    regs.r13 = high;
    regs.r14 = entry;
}

#[cfg(target_arch = "aarch64")]
fn init_call_frame(regs: &mut Registers, stack_high: *mut u8, entry: u64, low: u64, high: u64) {
    // aarch64's `ret` resumes at the link register directly, no stack
    // slot needed -- only the stack pointer itself must be 16-byte
    // aligned at entry.
    let sp = (stack_high as usize) & !0xf;

    regs.sp = sp as u64;
    regs.x19 = low;
    regs.x20 = high;
    regs.x21 = entry;
    regs.x30 = coroutine_bootstrap as usize as u64;
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_context_has_zeroed_stack_pointer() {
        let ctx = Context::empty();
        assert_eq!(sp_field(&ctx.regs), 0);
    }

    #[cfg(target_arch = "x86_64")]
    fn sp_field(regs: &Registers) -> u64 {
        regs.rsp
    }

    #[cfg(target_arch = "aarch64")]
    fn sp_field(regs: &Registers) -> u64 {
        regs.sp
    }
}
