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

//! The shared execution stack and the per-coroutine private copies that
//! back it up while a coroutine is suspended.

use std::ptr;

/// The scheduler's single live execution stack. Whichever coroutine is
/// RUNNING treats `[0, STACK_SIZE)` as its stack, growing down from
/// `top()`.
pub struct SharedStack {
    buf: Box<[u8]>,
}

impl SharedStack {
    pub fn new(size: usize) -> SharedStack {
        // A boxed byte slice gives us a plain heap allocation with no
        // guard page: there is no automatic stack-overflow detection
        // beyond the fixed bound, so a guard page would only catch the
        // overrun after the fact, not before corruption.
        let buf = vec![0u8; size].into_boxed_slice();
        SharedStack { buf }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Base (lowest) address of the shared stack.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.buf.as_ptr() as *mut u8
    }

    /// One-past-the-end (highest) address of the shared stack; a fresh
    /// coroutine's stack pointer starts here and grows down.
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base().add(self.len()) }
    }
}

/// A suspended coroutine's private copy of its live stack frames.
///
/// Grows to exactly the live region's size on demand and never shrinks
/// -- `cap()` is a high-water mark, `len()` is the current valid-byte
/// count.
#[derive(Default)]
pub struct PrivateStack {
    buf: Vec<u8>,
    len: usize,
}

impl PrivateStack {
    pub fn new() -> PrivateStack {
        PrivateStack {
            buf: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub fn cap(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Copy `size` live bytes ending at `top` (exclusive) out of the
    /// shared stack and into this private buffer, growing the backing
    /// allocation to exactly `size` first if it is currently smaller.
    ///
    /// # Safety
    /// `[top.sub(size), top)` must be a valid, readable range.
    pub unsafe fn save_from(&mut self, top: *const u8, size: usize) {
        if size > self.buf.len() {
            self.buf = vec![0u8; size];
        }
        let src = top.sub(size);
        ptr::copy_nonoverlapping(src, self.buf.as_mut_ptr(), size);
        self.len = size;
    }

    /// Copy the saved bytes back to the top of the shared stack, ending
    /// at `top` (exclusive).
    ///
    /// # Safety
    /// `[top.sub(self.len()), top)` must be a valid, writable range
    /// that belongs to the shared stack currently being restored onto.
    pub unsafe fn restore_to(&self, top: *mut u8) {
        let dst = top.sub(self.len);
        ptr::copy_nonoverlapping(self.buf.as_ptr(), dst, self.len);
    }
}
