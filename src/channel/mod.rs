//! Device channels, shared between a Target and a debug Host
//!
//! [`sync`] holds the target side, [`SwdStream`] and [`SwdPrint`], which live
//! in the target's SRAM and are accessed as ordinary memory.  [`futures`]
//! holds the host side, which reaches the same memory through debug probe
//! transactions.
//!
//! See [`crate`] for the memory layout.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;
pub mod sync;

#[cfg(feature = "async")]
pub use futures::{HostChannel, ProbeIo, ReaderWriterIo};
pub use sync::{RingIndices, SwdPrint, SwdStream};

use core::mem::offset_of;

use crate::{Error, Result};

/// Magic number identifying a bidirectional [`SwdStream`]
pub const STREAM_MAGIC: u32 = 0xD571_5E0D;

/// Magic number identifying an output only [`SwdPrint`]
pub const PRINT_MAGIC: u32 = 0xD571_5E0C;

/// Offset of the four index bytes from the channel base
pub const STATUS_OFFSET: u32 = offset_of!(SwdStream, status) as u32;

/// Offset of the target to host buffer from the channel base
pub const OUT_BUFFER_OFFSET: u32 = offset_of!(SwdStream, out_buffer) as u32;

/// Offset of the host to target buffer from the channel base
pub const IN_BUFFER_OFFSET: u32 = offset_of!(SwdStream, in_buffer) as u32;

// The host relies on both flavours sharing a layout up to the out buffer
const _: () = assert!(offset_of!(SwdPrint, status) as u32 == STATUS_OFFSET);
const _: () = assert!(offset_of!(SwdPrint, out_buffer) as u32 == OUT_BUFFER_OFFSET);
const _: () = assert!(STATUS_OFFSET == 4 && OUT_BUFFER_OFFSET == 8 && IN_BUFFER_OFFSET == 264);

/// Which flavour of channel lives at an address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// [`SwdStream`] - output and input
    Stream,
    /// [`SwdPrint`] - output only
    Print,
}

impl ChannelKind {
    pub const fn magic(self) -> u32 {
        match self {
            ChannelKind::Stream => STREAM_MAGIC,
            ChannelKind::Print => PRINT_MAGIC,
        }
    }

    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            STREAM_MAGIC => Some(ChannelKind::Stream),
            PRINT_MAGIC => Some(ChannelKind::Print),
            _ => None,
        }
    }

    /// Whether the channel has a host to target buffer
    pub const fn has_input(self) -> bool {
        matches!(self, ChannelKind::Stream)
    }
}

/// Snapshot of a channel's four index bytes, as read by the host in one
/// transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusQuad {
    pub out_head: u8,
    pub out_tail: u8,
    pub in_head: u8,
    pub in_tail: u8,
}

/// StatusQuad offsets, relative to [`STATUS_OFFSET`]
impl StatusQuad {
    pub const fn out_head_offset() -> u32 {
        offset_of!(RingIndices, out_head) as u32
    }

    pub const fn out_tail_offset() -> u32 {
        offset_of!(RingIndices, out_tail) as u32
    }

    pub const fn in_head_offset() -> u32 {
        offset_of!(RingIndices, in_head) as u32
    }

    pub const fn in_tail_offset() -> u32 {
        offset_of!(RingIndices, in_tail) as u32
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            out_head: bytes[Self::out_head_offset() as usize],
            out_tail: bytes[Self::out_tail_offset() as usize],
            in_head: bytes[Self::in_head_offset() as usize],
            in_tail: bytes[Self::in_tail_offset() as usize],
        }
    }

    /// Bytes waiting in the target to host buffer
    pub fn out_pending(&self) -> usize {
        self.out_head.wrapping_sub(self.out_tail) as usize
    }

    /// Space left in the host to target buffer
    pub fn in_free(&self) -> usize {
        255 - self.in_head.wrapping_sub(self.in_tail) as usize
    }
}

/// A channel found in target memory, as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    base: u32,
    kind: ChannelKind,
}

impl Session {
    /// Arguments:
    /// - `base` - Address of the channel's magic number.  Must be word
    ///   aligned.
    /// - `kind` - Channel flavour found at `base`
    pub fn new(base: u32, kind: ChannelKind) -> Result<Self> {
        check_base_addr(base)?;
        Ok(Self { base, kind })
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    pub fn status_addr(&self) -> u32 {
        self.base + STATUS_OFFSET
    }

    pub fn out_buffer_addr(&self) -> u32 {
        self.base + OUT_BUFFER_OFFSET
    }

    /// `None` for a print channel, which has no input buffer.
    pub fn in_buffer_addr(&self) -> Option<u32> {
        self.kind
            .has_input()
            .then_some(self.base + IN_BUFFER_OFFSET)
    }
}

// Helper functions

fn check_base_addr(addr: u32) -> Result<()> {
    if addr % 4 != 0 {
        Err(Error::NotAligned)
    } else {
        Ok(())
    }
}
