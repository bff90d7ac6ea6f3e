//! Single-producer single-consumer 256 byte ring buffer.
//!
//! The indices are 8-bit, so they wrap at the buffer size without any explicit
//! modulo.  `head` is the slot most recently written, not the next free slot:
//! the producer increments `head` and then stores, and the consumer increments
//! `tail` and then loads.  Valid data therefore occupies `tail + 1 ..= head`
//! and the buffer holds at most 255 bytes.
//!
//! [`RingBuffer`] is a view over indices and storage which live elsewhere -
//! inside a [`crate::channel`] structure whose layout is fixed so the debug
//! host can find each field.  The other side of the ring is usually on the
//! far side of a debug probe, so the data bytes are accessed volatilely and
//! the indices are atomics.
//!
//! Writes never block and never fail.  When the buffer is full the oldest
//! unread byte is discarded to make room, which means a producer that outruns
//! its consumer loses data without any indication.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU8, Ordering};

/// Size of each ring buffer in bytes.
pub const RING_SIZE: usize = 256;

/// Ring buffer view over externally owned indices and storage.
pub struct RingBuffer<'a> {
    head: &'a AtomicU8,
    tail: &'a AtomicU8,
    storage: &'a [UnsafeCell<u8>; RING_SIZE],
}

impl<'a> RingBuffer<'a> {
    /// Create a ring buffer view.
    ///
    /// Arguments:
    /// - `head` - Producer index, the slot most recently written
    /// - `tail` - Consumer index, the slot most recently read
    /// - `storage` - The 256 data bytes
    pub fn new(
        head: &'a AtomicU8,
        tail: &'a AtomicU8,
        storage: &'a [UnsafeCell<u8>; RING_SIZE],
    ) -> Self {
        Self {
            head,
            tail,
            storage,
        }
    }

    /// Producer: Write bytes, overwriting the oldest unread data if full.
    ///
    /// Always writes every byte, so returns `data.len()`.
    pub fn write(&mut self, data: &[u8]) -> usize {
        for &byte in data {
            let next = self.head.load(Ordering::Relaxed).wrapping_add(1);

            if next == self.tail.load(Ordering::Acquire) {
                // Full - drop the oldest byte
                self.tail.store(next.wrapping_add(1), Ordering::Release);
            }

            unsafe { core::ptr::write_volatile(self.storage[next as usize].get(), byte) };

            // Publish only once the byte is in place
            self.head.store(next, Ordering::Release);
        }

        data.len()
    }

    /// Consumer: Read the next byte, or `None` if empty.
    pub fn read(&mut self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            return None;
        }

        let next = tail.wrapping_add(1);
        let byte = self.load(next);
        self.tail.store(next, Ordering::Release);

        Some(byte)
    }

    /// Consumer: Return the next byte without consuming it, or `None` if
    /// empty.
    pub fn peek(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        if self.head.load(Ordering::Acquire) == tail {
            None
        } else {
            Some(self.load(tail.wrapping_add(1)))
        }
    }

    /// Number of bytes waiting to be read.  Never more than 255.
    pub fn available(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail) as usize
    }

    /// Always the nominal buffer size.
    ///
    /// As writes overwrite rather than block, there is no useful free space
    /// figure to report, and callers must not use this for flow control.
    pub fn available_for_write(&self) -> usize {
        RING_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.available() == 0
    }

    fn load(&self, index: u8) -> u8 {
        unsafe { core::ptr::read_volatile(self.storage[index as usize].get()) }
    }
}
