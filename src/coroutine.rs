// Copyright 2013 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! A coroutine is nothing more than a (task function, context, private
//! stack, status) tuple plus a non-owning back-reference to its
//! scheduler. It is a passive data container: all of the state-machine
//! logic lives in `Scheduler`, which is the sole addressee of
//! `resume`/`yield` transitions.

use crate::context::Context;
use crate::stack::PrivateStack;
use crate::Scheduler;

/// A coroutine's task function. Mirrors the C ancestor's
/// `void (*)(struct schedule *, void *ud)` -- the scheduler handle and
/// an opaque user datum, nothing more. Closures that need to capture
/// state do so by stashing it behind `user_data` themselves.
///
/// Takes `&mut Scheduler` rather than `&Scheduler`: a task that never
/// calls back into the scheduler (to yield, spawn, or inspect status)
/// is unusual enough not to warrant a shared-reference-only signature,
/// and `yield_now` itself requires `&mut Scheduler`.
pub type CoroutineFn = fn(&mut Scheduler, *mut ());

/// Lifecycle status of a coroutine, numbered to match the small stable
/// enumeration its C ancestor used (`COROUTINE_DEAD` == 0 and so on),
/// so that callers that persist the numeric value see it stay stable
/// across the library's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Status {
    Dead = 0,
    Ready = 1,
    Running = 2,
    Suspend = 3,
}

pub(crate) struct Coroutine {
    pub(crate) func: CoroutineFn,
    pub(crate) user_data: *mut (),
    /// Non-owning back-reference to the scheduler this coroutine lives
    /// on. Every entry point into a coroutine's code (the trampoline,
    /// `func` itself) already receives the scheduler as an argument, so
    /// nothing in this crate reads this field today; it mirrors the C
    /// ancestor's `co->sch`, which is equally write-only.
    #[allow(dead_code)]
    pub(crate) scheduler: *mut Scheduler,
    pub(crate) context: Context,
    pub(crate) private: PrivateStack,
    pub(crate) status: Status,
}

impl Coroutine {
    pub(crate) fn new(func: CoroutineFn, user_data: *mut (), scheduler: *mut Scheduler) -> Coroutine {
        Coroutine {
            func,
            user_data,
            scheduler,
            context: Context::empty(),
            private: PrivateStack::new(),
            status: Status::Ready,
        }
    }
}
