//! Target side of the device channels.
//!
//! The structures here must live somewhere in ordinary SRAM that the debug
//! probe can reach, for the lifetime of the firmware.  Nothing else is
//! required: the host finds them by their magic number.
//!
//! ```rust,ignore
//! use swd_serial::channel::SwdStream;
//! use swd_serial::stream::Stream;
//!
//! static mut LOGGER: SwdStream = SwdStream::new();
//!
//! let logger = unsafe { &mut *core::ptr::addr_of_mut!(LOGGER) };
//! logger.write(b"Booted\r\n");
//! if let Some(key) = logger.read() {
//!     // ...
//! }
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use core::cell::UnsafeCell;
use core::convert::Infallible;
use core::sync::atomic::AtomicU8;

use crate::channel::{ChannelKind, PRINT_MAGIC, STREAM_MAGIC};
use crate::format::NumberWriter;
use crate::ring::{RING_SIZE, RingBuffer};
use crate::stream::Stream;

/// The four ring indices, which the host reads in one transaction.
///
/// The target owns `out_head` and `in_tail`, the host owns `out_tail` and
/// `in_head` - except that a full outbound buffer makes the target advance
/// `out_tail` itself, to discard the oldest byte.
#[repr(C)]
pub struct RingIndices {
    pub(super) out_head: AtomicU8,
    pub(super) out_tail: AtomicU8,
    pub(super) in_head: AtomicU8,
    pub(super) in_tail: AtomicU8,
}

impl RingIndices {
    const fn new() -> Self {
        Self {
            out_head: AtomicU8::new(0),
            out_tail: AtomicU8::new(0),
            in_head: AtomicU8::new(0),
            in_tail: AtomicU8::new(0),
        }
    }
}

/// Bidirectional virtual serial port.
#[repr(C)]
pub struct SwdStream {
    magic: u32,
    pub(super) status: RingIndices,
    pub(super) out_buffer: [UnsafeCell<u8>; RING_SIZE],
    pub(super) in_buffer: [UnsafeCell<u8>; RING_SIZE],
}

impl SwdStream {
    /// Create a new stream.  `const` so that it can be placed in a `static`.
    // We need a new() rather than a default() as it must be const.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            magic: STREAM_MAGIC,
            status: RingIndices::new(),
            out_buffer: [const { UnsafeCell::new(0) }; RING_SIZE],
            in_buffer: [const { UnsafeCell::new(0) }; RING_SIZE],
        }
    }

    /// The channel flavour, as identified by the magic number.
    pub fn kind(&self) -> Option<ChannelKind> {
        ChannelKind::from_magic(read_magic(&self.magic))
    }

    fn out_ring(&self) -> RingBuffer<'_> {
        RingBuffer::new(
            &self.status.out_head,
            &self.status.out_tail,
            &self.out_buffer,
        )
    }

    fn in_ring(&self) -> RingBuffer<'_> {
        RingBuffer::new(&self.status.in_head, &self.status.in_tail, &self.in_buffer)
    }
}

impl Stream for SwdStream {
    fn available(&self) -> usize {
        self.in_ring().available()
    }

    fn read(&mut self) -> Option<u8> {
        self.in_ring().read()
    }

    fn peek(&self) -> Option<u8> {
        self.in_ring().peek()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.out_ring().write(data)
    }

    fn available_for_write(&self) -> usize {
        self.out_ring().available_for_write()
    }
}

/// The firmware can also drive the channel through a shared reference, so
/// that no `&mut` to memory the probe writes has to be held.
impl Stream for &SwdStream {
    fn available(&self) -> usize {
        self.in_ring().available()
    }

    fn read(&mut self) -> Option<u8> {
        self.in_ring().read()
    }

    fn peek(&self) -> Option<u8> {
        self.in_ring().peek()
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.out_ring().write(data)
    }

    fn available_for_write(&self) -> usize {
        self.out_ring().available_for_write()
    }
}

/// Output only virtual serial port.  Half the size of [`SwdStream`].
#[repr(C)]
pub struct SwdPrint {
    magic: u32,
    // in_head and in_tail are reserved, keeping the layout shared with
    // SwdStream
    pub(super) status: RingIndices,
    pub(super) out_buffer: [UnsafeCell<u8>; RING_SIZE],
}

impl SwdPrint {
    /// Create a new print channel.  `const` so that it can be placed in a
    /// `static`.
    #[allow(clippy::new_without_default)]
    pub const fn new() -> Self {
        Self {
            magic: PRINT_MAGIC,
            status: RingIndices::new(),
            out_buffer: [const { UnsafeCell::new(0) }; RING_SIZE],
        }
    }

    /// The channel flavour, as identified by the magic number.
    pub fn kind(&self) -> Option<ChannelKind> {
        ChannelKind::from_magic(read_magic(&self.magic))
    }

    fn out_ring(&self) -> RingBuffer<'_> {
        RingBuffer::new(
            &self.status.out_head,
            &self.status.out_tail,
            &self.out_buffer,
        )
    }
}

impl Stream for SwdPrint {
    fn available(&self) -> usize {
        0
    }

    fn read(&mut self) -> Option<u8> {
        None
    }

    fn peek(&self) -> Option<u8> {
        None
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.out_ring().write(data)
    }

    fn available_for_write(&self) -> usize {
        self.out_ring().available_for_write()
    }
}

impl Stream for &SwdPrint {
    fn available(&self) -> usize {
        0
    }

    fn read(&mut self) -> Option<u8> {
        None
    }

    fn peek(&self) -> Option<u8> {
        None
    }

    fn write(&mut self, data: &[u8]) -> usize {
        self.out_ring().write(data)
    }

    fn available_for_write(&self) -> usize {
        self.out_ring().available_for_write()
    }
}

// The magic is only ever read by the host, so stop the compiler from
// assuming anything about it.
fn read_magic(magic: &u32) -> u32 {
    unsafe { core::ptr::read_volatile(magic) }
}

impl core::fmt::Write for SwdStream {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        Stream::write(self, s.as_bytes());
        Ok(())
    }
}

impl core::fmt::Write for SwdPrint {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        Stream::write(self, s.as_bytes());
        Ok(())
    }
}

impl NumberWriter for SwdStream {
    fn put_char(&mut self, c: u8) {
        Stream::write(self, &[c]);
    }
}

impl NumberWriter for SwdPrint {
    fn put_char(&mut self, c: u8) {
        Stream::write(self, &[c]);
    }
}

impl embedded_io::ErrorType for SwdStream {
    type Error = Infallible;
}

impl embedded_io::ErrorType for SwdPrint {
    type Error = Infallible;
}

impl embedded_io::Read for SwdStream {
    /// Blocks until at least one byte has been written by the host.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.in_ring().is_empty() {
            core::hint::spin_loop();
        }

        let mut ring = self.in_ring();
        let mut count = 0;
        while count < buf.len() {
            match ring.read() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }

        Ok(count)
    }
}

impl embedded_io::ReadReady for SwdStream {
    fn read_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(!self.in_ring().is_empty())
    }
}

impl embedded_io::Write for SwdStream {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(Stream::write(self, buf))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::WriteReady for SwdStream {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

impl embedded_io::Write for SwdPrint {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        Ok(Stream::write(self, buf))
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::WriteReady for SwdPrint {
    fn write_ready(&mut self) -> Result<bool, Self::Error> {
        Ok(true)
    }
}
