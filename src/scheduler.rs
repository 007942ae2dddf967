// The MIT License (MIT)

// Copyright (c) 2015 Rustcc Developers

//  Permission is hereby granted, free of charge, to any person obtaining a
//  copy of this software and associated documentation files (the "Software"),
//  to deal in the Software without restriction, including without limitation
//  the rights to use, copy, modify, merge, publish, distribute, sublicense,
//  and/or sell copies of the Software, and to permit persons to whom the
//  Software is furnished to do so, subject to the following conditions:
//
//  The above copyright notice and this permission notice shall be included in
//  all copies or substantial portions of the Software.
//
//  THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS
//  OR IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
//  FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
//  AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
//  LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
//  FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
//  DEALINGS IN THE SOFTWARE.

//! The scheduler: owner of the shared execution stack, the coroutine
//! slot table, and the single public entry point for resuming and
//! yielding coroutines.

use std::any::Any;
use std::panic;

use log::{debug, error, trace};

use crate::context::Context;
use crate::coroutine::{Coroutine, CoroutineFn, Status};
use crate::error::CoroutineError;
use crate::stack::SharedStack;

/// Default number of slots a freshly opened scheduler reserves.
pub const DEFAULT_CAPACITY: usize = 16;

/// Default size of the shared execution stack: large enough for most
/// coroutine workloads, small enough that a handful of them comfortably
/// fit in memory together (only suspended coroutines keep a private
/// copy; the shared buffer itself is allocated once).
pub const DEFAULT_STACK_SIZE: usize = 1024 * 1024;

/// Internal sentinel for "no coroutine is running; main is live".
/// `running_id`/`resume` expose this as `Option<usize>`/absence rather
/// than a raw `-1`, which is the idiomatic Rust rendering of the same
/// contract.
const SENTINEL: isize = -1;

/// Owns the shared execution stack and every coroutine spawned on it.
///
/// A `Scheduler` is not `Send` or `Sync`: it is restricted to the
/// thread it was opened on, and the context-switch machinery in
/// `context.rs` has no synchronization of its own to make cross-thread
/// use sound.
pub struct Scheduler {
    shared_stack: SharedStack,
    main_context: Context,
    slots: Vec<Option<Box<Coroutine>>>,
    count: usize,
    running: isize,
}

impl Scheduler {
    /// Open a scheduler with the default slot capacity and shared stack
    /// size (`DEFAULT_CAPACITY`, `DEFAULT_STACK_SIZE`).
    pub fn open() -> Scheduler {
        Scheduler::with_capacity_and_stack_size(DEFAULT_CAPACITY, DEFAULT_STACK_SIZE)
    }

    /// Open a scheduler whose shared stack is sized for coroutines
    /// whose peak live depth exceeds the default. The library has no
    /// way to detect or survive a coroutine overrunning the shared
    /// stack, so hosts running deep call chains must size this
    /// themselves.
    pub fn with_stack_size(stack_size: usize) -> Scheduler {
        Scheduler::with_capacity_and_stack_size(DEFAULT_CAPACITY, stack_size)
    }

    /// Open a scheduler with an explicit initial slot capacity and
    /// shared stack size.
    pub fn with_capacity_and_stack_size(capacity: usize, stack_size: usize) -> Scheduler {
        let mut slots = Vec::new();
        slots.resize_with(capacity, || None);

        debug!(
            "Scheduler::open: capacity {} slot(s), {} byte shared stack",
            capacity, stack_size
        );

        Scheduler {
            shared_stack: SharedStack::new(stack_size),
            main_context: Context::empty(),
            slots,
            count: 0,
            running: SENTINEL,
        }
    }

    /// Release every still-present coroutine and the scheduler itself.
    ///
    /// # Panics
    /// If a coroutine is currently RUNNING.
    pub fn close(self) {
        assert_eq!(
            self.running, SENTINEL,
            "Scheduler::close: coroutine {} is still running",
            self.running
        );
        debug!(
            "Scheduler::close: releasing {} live coroutine(s)",
            self.count
        );
        // `self` drops here; `Vec<Option<Box<Coroutine>>>`'s own Drop
        // frees every remaining coroutine's private stack and record.
        // A coroutine still SUSPENDed simply has its saved context
        // discarded.
    }

    /// Allocate a coroutine in READY state and install it into a slot,
    /// returning its id.
    pub fn new_coroutine(
        &mut self,
        func: CoroutineFn,
        user_data: *mut (),
    ) -> Result<usize, CoroutineError> {
        let co = Box::new(Coroutine::new(func, user_data, self as *mut Scheduler));

        if self.count >= self.slots.len() {
            let old_cap = self.slots.len();
            if self.slots.try_reserve(old_cap).is_err() {
                error!(
                    "new_coroutine: failed to grow slot table past {} entries",
                    old_cap
                );
                return Err(CoroutineError::AllocFailed);
            }
            self.slots.resize_with(old_cap * 2, || None);
            self.slots[old_cap] = Some(co);
            self.count += 1;
            debug!(
                "new_coroutine: grew slot table {} -> {}, placed id {}",
                old_cap,
                old_cap * 2,
                old_cap
            );
            return Ok(old_cap);
        }

        let cap = self.slots.len();
        for id in 0..cap {
            if self.slots[id].is_none() {
                self.slots[id] = Some(co);
                self.count += 1;
                trace!("new_coroutine: placed id {} (count now {})", id, self.count);
                return Ok(id);
            }
        }
        unreachable!("new_coroutine: count < capacity but no free slot found");
    }

    /// Resume the coroutine at `id`. A no-op if that id is dead.
    ///
    /// # Panics
    /// If another coroutine is already running, if `id` is out of
    /// range, or if the coroutine is in a status other than READY or
    /// SUSPEND.
    pub fn resume(&mut self, id: usize) {
        assert_eq!(
            self.running, SENTINEL,
            "resume({}): coroutine {} is already running",
            id, self.running
        );
        assert!(
            id < self.slots.len(),
            "resume({}): id out of range (capacity {})",
            id,
            self.slots.len()
        );

        if self.slots[id].is_none() {
            trace!("resume({}): already dead, no-op", id);
            return;
        }

        let status = self.slots[id].as_ref().unwrap().status;
        match status {
            Status::Ready => self.resume_ready(id),
            Status::Suspend => self.resume_suspended(id),
            other => {
                error!("resume({}): unexpected status {:?}", id, other);
                panic!("resume({}): cannot resume from status {:?}", id, other);
            }
        }
    }

    fn resume_ready(&mut self, id: usize) {
        let sched_ptr = self as *mut Scheduler as u64;
        let low = (sched_ptr & 0xffff_ffff) as u32;
        let high = (sched_ptr >> 32) as u32;
        let stack_top = self.shared_stack.top();

        {
            let co = self.slots[id].as_mut().unwrap();
            co.context = Context::new(coroutine_trampoline, stack_top, low, high);
            co.status = Status::Running;
        }
        self.running = id as isize;
        debug!("resume({}): READY -> RUNNING (fresh context)", id);

        // Safety: `co_ctx` is freshly built and not borrowed again until
        // the swap returns (to `main_context`, the next time this
        // coroutine yields or dies). `main_context` is `self`'s own
        // field, swapped from the caller's execution.
        let co_ctx: *const Context = &self.slots[id].as_ref().unwrap().context;
        unsafe {
            self.main_context.swap(&*co_ctx);
        }
    }

    fn resume_suspended(&mut self, id: usize) {
        let top = self.shared_stack.top();
        {
            let co = self.slots[id].as_mut().unwrap();
            // Safety: `top` bounds the shared stack this scheduler owns;
            // `co.private` holds exactly the bytes most recently saved
            // from that same region.
            unsafe {
                co.private.restore_to(top);
            }
            co.status = Status::Running;
        }
        self.running = id as isize;
        debug!(
            "resume({}): SUSPEND -> RUNNING (restored {} bytes)",
            id,
            self.slots[id].as_ref().unwrap().private.len()
        );

        let co_ctx: *const Context = &self.slots[id].as_ref().unwrap().context;
        unsafe {
            self.main_context.swap(&*co_ctx);
        }
    }

    /// Suspend the currently running coroutine, saving its live stack,
    /// and swap back into the caller of whichever `resume` started it.
    ///
    /// # Panics
    /// If no coroutine is currently running, or if the live stack
    /// region at the point of yielding exceeds the shared stack's size.
    pub fn yield_now(&mut self) {
        assert!(
            self.running != SENTINEL,
            "yield_now: no coroutine is currently running"
        );
        let id = self.running as usize;

        // A stack-allocated local's address stands in for the current
        // stack pointer.
        let sentinel_local: u8 = 0;
        let sp = &sentinel_local as *const u8 as usize;
        let base = self.shared_stack.base() as usize;
        let top = self.shared_stack.top() as usize;

        assert!(
            sp >= base && sp < top,
            "yield_now: current stack pointer 0x{:x} is outside the shared stack [0x{:x}, 0x{:x})",
            sp,
            base,
            top
        );

        let live_size = top - sp;
        assert!(
            live_size <= self.shared_stack.len(),
            "yield_now: live stack region ({} bytes) exceeds STACK_SIZE ({} bytes)",
            live_size,
            self.shared_stack.len()
        );

        {
            let co = self.slots[id].as_mut().unwrap();
            // Safety: `[top - live_size, top)` is exactly the live
            // region just bounded above, and lies within the shared
            // stack this scheduler owns.
            unsafe {
                co.private.save_from(top as *const u8, live_size);
            }
            co.status = Status::Suspend;
        }
        debug!("yield_now: id {} RUNNING -> SUSPEND ({} bytes)", id, live_size);

        self.running = SENTINEL;

        let co_ctx: *mut Context = &mut self.slots[id].as_mut().unwrap().context;
        unsafe {
            (&mut *co_ctx).swap(&self.main_context);
        }
    }

    /// Status of the coroutine at `id`; `Status::Dead` if the slot is
    /// empty (including ids that never held a live coroutine).
    ///
    /// # Panics
    /// If `id` is out of range.
    pub fn status(&self, id: usize) -> Status {
        assert!(
            id < self.slots.len(),
            "status({}): id out of range (capacity {})",
            id,
            self.slots.len()
        );
        match &self.slots[id] {
            None => Status::Dead,
            Some(co) => co.status,
        }
    }

    /// The id of the currently running coroutine, or `None` if main is
    /// live.
    pub fn running_id(&self) -> Option<usize> {
        if self.running == SENTINEL {
            None
        } else {
            Some(self.running as usize)
        }
    }

    /// Number of live (non-dead) coroutines.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Length of the slot table. Grows by doubling as coroutines are
    /// created past the current capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn finish_running(&mut self, id: usize) {
        self.slots[id] = None;
        self.count -= 1;
        self.running = SENTINEL;
        debug!("trampoline: id {} RUNNING -> DEAD (slot freed)", id);
    }
}

/// The fixed entry point every freshly built coroutine context starts
/// at. Reconstructs the scheduler pointer from the two machine words
/// `context::init_call_frame` packed in, runs the coroutine's task
/// function, and performs the death sequence on return -- freeing the
/// coroutine, nulling its slot, and falling back into `main_context`.
///
/// This function must never return: falling off the end of a
/// coroutine's stack has no caller to return to.
extern "C" fn coroutine_trampoline(low: u32, high: u32) -> ! {
    let sched_ptr = ((low as u64) | ((high as u64) << 32)) as usize as *mut Scheduler;

    // Safety: `resume_ready` passed `self` as this very pointer just
    // before swapping in; `self` is still alive because the `resume`
    // call that started this coroutine has not returned yet (it is
    // parked on the other side of the context swap we just arrived
    // through).
    let sched: &mut Scheduler = unsafe { &mut *sched_ptr };

    let id = sched.running as usize;
    let (func, user_data) = {
        let co = sched.slots[id]
            .as_ref()
            .expect("coroutine_trampoline: missing coroutine at running id");
        (co.func, co.user_data)
    };

    // A panic unwinding past this point would try to unwind through
    // hand-written assembly with no unwind tables -- undefined
    // behavior. Catch it here, log it, and let the coroutine die
    // cleanly instead.
    let result = panic::catch_unwind(panic::AssertUnwindSafe(|| func(sched, user_data)));
    if let Err(payload) = result {
        log_panic(id, payload);
    }

    sched.finish_running(id);

    // Safety: swapping into `main_context` resumes the `resume` call
    // that started this coroutine, right after its own swap-in. This
    // coroutine's slot is already gone, so nothing will ever swap back
    // into `scratch` or this stack frame again.
    let mut scratch = Context::empty();
    unsafe {
        scratch.swap(&sched.main_context);
    }
    unreachable!("coroutine_trampoline: resumed after death");
}

fn log_panic(id: usize, payload: Box<dyn Any + Send>) {
    let msg = payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("Box<dyn Any>");
    error!("coroutine {} panicked: {}", id, msg);
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::Cell;

    thread_local! {
        static TOUCHED: Cell<i32> = Cell::new(0);
    }

    fn touch_once(_: &mut Scheduler, _: *mut ()) {
        TOUCHED.with(|c| c.set(c.get() + 1));
    }

    #[test]
    fn open_has_default_capacity_and_no_running_coroutine() {
        let sched = Scheduler::open();
        assert_eq!(sched.capacity(), DEFAULT_CAPACITY);
        assert_eq!(sched.count(), 0);
        assert_eq!(sched.running_id(), None);
    }

    #[test]
    fn new_coroutine_reuses_first_free_slot_after_death() {
        let mut sched = Scheduler::open();
        let a = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        let _b = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        sched.resume(a);
        assert_eq!(sched.status(a), Status::Dead);

        let c = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        assert_eq!(c, a);
    }

    #[test]
    fn growth_doubles_capacity_and_places_new_id_at_old_capacity() {
        let mut sched = Scheduler::open();
        let mut last_id = 0;
        for _ in 0..DEFAULT_CAPACITY {
            last_id = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        }
        assert_eq!(last_id, DEFAULT_CAPACITY - 1);
        assert_eq!(sched.capacity(), DEFAULT_CAPACITY);

        let overflow_id = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        assert_eq!(overflow_id, DEFAULT_CAPACITY);
        assert_eq!(sched.capacity(), DEFAULT_CAPACITY * 2);
        assert_eq!(sched.count(), DEFAULT_CAPACITY + 1);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn status_out_of_range_is_fatal() {
        let sched = Scheduler::open();
        let _ = sched.status(sched.capacity());
    }

    #[test]
    fn resume_of_dead_id_is_a_silent_no_op() {
        let mut sched = Scheduler::open();
        let id = sched.new_coroutine(touch_once, std::ptr::null_mut()).unwrap();
        sched.resume(id);
        assert_eq!(sched.status(id), Status::Dead);

        sched.resume(id); // must not panic
        assert_eq!(sched.status(id), Status::Dead);
        assert_eq!(sched.running_id(), None);
    }
}
