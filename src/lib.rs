// Copyright 2013 The Rust Project Developers. See the COPYRIGHT
// file at the top-level directory of this distribution and at
// http://rust-lang.org/COPYRIGHT.
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Stackful asymmetric coroutines that share one execution stack.
//!
//! A [`Scheduler`] owns a single fixed-size buffer used as the live
//! stack for whichever coroutine is currently running. When a
//! coroutine yields, its live stack frames are copied out into a
//! private heap buffer sized to exactly the live region; resuming it
//! later copies them back onto the shared stack before swapping in.
//! This trades a memcpy on every switch for memory use that scales
//! with the sum of live stack depths rather than the coroutine count
//! times a fixed per-coroutine stack size.
//!
//! Coroutines never transfer to each other directly: every switch is
//! between the scheduler's main context and exactly one coroutine. A
//! task yields back to whoever resumed it, nothing else -- there is no
//! preemption, no cross-thread coroutine migration, and no symmetric
//! transfer.
//!
//! ```
//! use coroutine::{Scheduler, Status};
//!
//! fn task(sched: &mut Scheduler, _ud: *mut ()) {
//!     println!("hello from a coroutine");
//!     sched.yield_now();
//!     println!("back again");
//! }
//!
//! let mut sched = Scheduler::open();
//! let id = sched.new_coroutine(task, std::ptr::null_mut()).unwrap();
//! assert_eq!(sched.status(id), Status::Ready);
//!
//! sched.resume(id);
//! assert_eq!(sched.status(id), Status::Suspend);
//!
//! sched.resume(id);
//! assert_eq!(sched.status(id), Status::Dead);
//! ```

mod context;
mod coroutine;
mod error;
mod scheduler;
mod stack;

#[cfg(test)]
mod tests;

pub use coroutine::{CoroutineFn, Status};
pub use error::CoroutineError;
pub use scheduler::{Scheduler, DEFAULT_CAPACITY, DEFAULT_STACK_SIZE};
