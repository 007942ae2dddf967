// The MIT License (MIT)

// Copyright (c) 2015 Rustcc developers

// Permission is hereby granted, free of charge, to any person obtaining a copy of
// this software and associated documentation files (the "Software"), to deal in
// the Software without restriction, including without limitation the rights to
// use, copy, modify, merge, publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software is furnished to do so,
// subject to the following conditions:

// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
// IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY, FITNESS
// FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE AUTHORS OR
// COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER
// IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR IN
// CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE SOFTWARE.

//! End-to-end scenarios exercising the scheduler from the outside, the
//! way a host embedding it would. Task functions are plain `fn`s (not
//! closures), so anything a task needs to observe or report travels
//! through its `user_data` pointer -- typically the address of a
//! channel `Sender` living on the test's own stack.

use std::sync::mpsc::{channel, Sender};

use crate::{Scheduler, Status, DEFAULT_CAPACITY};

/// Surface `debug!`/`trace!` output from `scheduler.rs` under
/// `RUST_LOG=coroutine=trace cargo test -- --nocapture`. Safe to call
/// from every test: `try_init` is a no-op once a logger is installed.
fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn noop_task(_: &mut Scheduler, _: *mut ()) {}

fn task_a(sched: &mut Scheduler, ud: *mut ()) {
    let tx = unsafe { &*(ud as *const Sender<&'static str>) };
    tx.send("A1").unwrap();
    sched.yield_now();
    tx.send("A2").unwrap();
}

fn task_b(sched: &mut Scheduler, ud: *mut ()) {
    let tx = unsafe { &*(ud as *const Sender<&'static str>) };
    tx.send("B1").unwrap();
    sched.yield_now();
    tx.send("B2").unwrap();
}

#[test]
fn two_interleaved_counters_print_in_lockstep() {
    init_log();
    let mut sched = Scheduler::open();
    let (tx, rx) = channel();
    let tx_ptr = &tx as *const Sender<&'static str> as *mut ();

    let a = sched.new_coroutine(task_a, tx_ptr).unwrap();
    let b = sched.new_coroutine(task_b, tx_ptr).unwrap();

    sched.resume(a);
    sched.resume(b);
    sched.resume(a);
    sched.resume(b);
    sched.resume(a); // already dead, silent no-op
    sched.resume(b); // already dead, silent no-op

    drop(tx);
    let seen: Vec<_> = rx.try_iter().collect();
    assert_eq!(seen, vec!["A1", "B1", "A2", "B2"]);

    assert_eq!(sched.status(a), Status::Dead);
    assert_eq!(sched.status(b), Status::Dead);
}

fn status_probe_task(sched: &mut Scheduler, ud: *mut ()) {
    let tx = unsafe { &*(ud as *const Sender<Status>) };
    let id = sched.running_id().unwrap();
    tx.send(sched.status(id)).unwrap();
    sched.yield_now();
    let id = sched.running_id().unwrap();
    tx.send(sched.status(id)).unwrap();
}

#[test]
fn status_transitions_follow_ready_running_suspend_dead() {
    init_log();
    let mut sched = Scheduler::open();
    let (tx, rx) = channel();
    let tx_ptr = &tx as *const Sender<Status> as *mut ();

    let x = sched.new_coroutine(status_probe_task, tx_ptr).unwrap();
    assert_eq!(sched.status(x), Status::Ready);

    sched.resume(x);
    assert_eq!(rx.recv().unwrap(), Status::Running);
    assert_eq!(sched.status(x), Status::Suspend);

    sched.resume(x);
    assert_eq!(rx.recv().unwrap(), Status::Running);
    assert_eq!(sched.status(x), Status::Dead);
}

#[test]
fn slot_is_reused_after_its_coroutine_dies() {
    init_log();
    let mut sched = Scheduler::open();
    let a = sched.new_coroutine(noop_task, std::ptr::null_mut()).unwrap();
    let _b = sched.new_coroutine(noop_task, std::ptr::null_mut()).unwrap();

    sched.resume(a);
    assert_eq!(sched.status(a), Status::Dead);

    let c = sched.new_coroutine(noop_task, std::ptr::null_mut()).unwrap();
    assert_eq!(c, a);
}

#[test]
fn growth_triggers_once_at_seventeen_coroutines() {
    init_log();
    let mut sched = Scheduler::open();
    let ids: Vec<usize> = (0..17)
        .map(|_| sched.new_coroutine(noop_task, std::ptr::null_mut()).unwrap())
        .collect();

    assert_eq!(ids, (0..17).collect::<Vec<_>>());
    assert_eq!(sched.capacity(), DEFAULT_CAPACITY * 2);
    assert_eq!(sched.count(), 17);
    for id in ids {
        assert_eq!(sched.status(id), Status::Ready);
    }
}

fn stack_preserving_task(sched: &mut Scheduler, ud: *mut ()) {
    let tx = unsafe { &*(ud as *const Sender<bool>) };
    let mut buf = [0u8; 1024];
    for (i, b) in buf.iter_mut().enumerate() {
        *b = (i % 256) as u8;
    }
    sched.yield_now();
    let unchanged = buf.iter().enumerate().all(|(i, &b)| b == (i % 256) as u8);
    tx.send(unchanged).unwrap();
}

#[test]
fn live_stack_bytes_survive_a_yield_resume_round_trip() {
    init_log();
    let mut sched = Scheduler::open();
    let (tx, rx) = channel();
    let tx_ptr = &tx as *const Sender<bool> as *mut ();

    let id = sched.new_coroutine(stack_preserving_task, tx_ptr).unwrap();
    sched.resume(id);
    assert_eq!(sched.status(id), Status::Suspend);

    sched.resume(id);
    assert_eq!(sched.status(id), Status::Dead);

    assert!(rx.recv().unwrap());
}

#[test]
fn resuming_a_dead_coroutine_is_a_silent_no_op() {
    init_log();
    let mut sched = Scheduler::open();
    let x = sched.new_coroutine(noop_task, std::ptr::null_mut()).unwrap();

    sched.resume(x);
    assert_eq!(sched.status(x), Status::Dead);
    assert_eq!(sched.running_id(), None);

    sched.resume(x);
    assert_eq!(sched.status(x), Status::Dead);
    assert_eq!(sched.running_id(), None);
}
