//! Virtual serial port for ARM targets with no physical UART exposed, tunnelled over SWD
//! and other debug protocols, plus a line-oriented command protocol that runs on top of it.
//!
//! The firmware keeps a small structure in SRAM holding a magic number, four 8-bit ring
//! indices and two 256 byte ring buffers.  A debug host finds the structure by scanning the
//! target's RAM for the magic number, and from then on polls the indices and moves bytes in
//! each direction using nothing but debug memory reads and writes.  The target needs no
//! interrupts, DMA or peripheral for this to work - only the SWD port.
//!
//! `no_std`.  Requires `alloc` for async traits, typically used on the Host side.
//!
//! ## Architecture
//!
//! Assumes a Host (debug controller) and Target (microcontroller) architecture.
//!
//! The channel lives in the target's SRAM and looks like this:
//!
//! ```text
//!  offset  size  field
//!  0       4     magic (STREAM_MAGIC or PRINT_MAGIC, little endian)
//!  4       1     out head   - written by target
//!  5       1     out tail   - written by host
//!  6       1     in head    - written by host   (stream only)
//!  7       1     in tail    - written by target (stream only)
//!  8       256   out buffer - target to host
//!  264     256   in buffer  - host to target    (stream only)
//! ```
//!
//! Each ring buffer has a single producer, which owns `head`, and a single consumer, which
//! owns `tail`.  The producer increments `head` and then stores the byte at `head`, so valid
//! data is `tail + 1 ..= head`, modulo 256.  This is the only synchronisation between the two
//! sides - there is no lock, as the host and target share no execution context.
//!
//! The target's outbound buffer overwrites the oldest unread byte when full.  A target
//! which prints faster than the host drains will lose data, but never blocks.
//!
//! On top of the byte stream, [`command::CommandParser`] implements an ASCII protocol:
//!
//! ```text
//! [@<hex-address>] <command> [args...][;<command> [args...]]* [$<hex-crc16>] <CR|LF>
//! ```
//!
//! with responses prefixed `*<hex-address> ` when the device is on a multi-drop bus, and
//! each packet answered by a final `OK` or `ERROR` line.
//!
//! ## Modules
//!
//! - [`ring`] - 256 byte single-producer single-consumer ring buffer
//! - [`channel`] - Device channels ([`channel::SwdStream`], [`channel::SwdPrint`]), their
//!   memory layout, and the host-side probe access to them
//! - [`monitor`] - Host synchronisation engine which discovers and polls a channel
//! - [`stream`] - Byte stream trait implemented by the device channels
//! - [`format`] - Hand-rolled number formatting and float parsing
//! - [`command`] - Command protocol engine
//! - [`io`] - Async I/O traits for debug interface access and host console access
//!
//! ## Getting Started
//!
//! **Target setup**:
//! 1. Create a [`channel::SwdStream`] in a `static` (it must live in ordinary RAM which the
//!    debug probe can reach)
//! 2. Optionally wrap it with a [`command::CommandParser`] and a static command table
//! 3. Call [`command::CommandParser::poll()`] from the main loop
//!
//! **Host setup**:
//! 1. Implement [`io::Reader`] and [`io::Writer`] for the debug probe
//! 2. Implement [`io::ConsoleOut`] and [`io::ConsoleIn`] for the terminal
//! 3. Create a [`monitor::AsyncMonitor`] with [`monitor::MonitorConfig::Scan`] and the
//!    target's RAM region, then call [`monitor::AsyncMonitor::run()`]
//!
//! ## Features
//!
//! Default features:
//! - `async` - Enable the host-side channel access and monitor (requires `alloc`).
//!
//! Compile with `--no-default-features` for a Target.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![no_std]

#[cfg(feature = "async")]
extern crate alloc;

#[cfg(test)]
extern crate std;

pub mod channel;
pub mod command;
pub mod format;
pub mod io;
pub mod monitor;
pub mod ring;
pub mod stream;

/// Errors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Error {
    /// Debug probe memory transaction failed
    Io,
    /// Host console read or write failed
    Console,
    /// Channel magic number not found in the scanned RAM
    NotFound,
    /// Invalid operation for this channel or configuration
    InvalidOperation,
    /// Address not aligned
    NotAligned,
    /// Command argument missing or malformed
    InvalidArgument,
    /// Command ran but failed
    CommandFailed,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            Error::Io => "debug probe memory access failed",
            Error::Console => "console I/O failed",
            Error::NotFound => "did not find channel magic number in target RAM",
            Error::InvalidOperation => "invalid operation",
            Error::NotAligned => "address not aligned",
            Error::InvalidArgument => "invalid argument",
            Error::CommandFailed => "command failed",
        };
        f.write_str(msg)
    }
}

/// Type to represent the result of an operation
pub type Result<T> = core::result::Result<T, Error>;
