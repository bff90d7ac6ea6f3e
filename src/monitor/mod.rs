//! Host monitor, connecting the host's console to a channel in the target's
//! RAM.
//!
//! Typically run as a terminal: target output is written to stdout, and
//! keystrokes are sent to the target.  Ctrl-D (EOT) ends the session.
//!
//! See [`AsyncMonitor`] for usage.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[cfg(feature = "async")]
pub mod futures;

#[cfg(feature = "async")]
pub use futures::{AsyncDelay, AsyncMonitor};

use crate::channel::ChannelKind;

/// Maximum number of bytes of RAM scanned for the channel's magic number
pub const SCAN_WINDOW: u32 = 0x1000;

/// End of transmission.  Typed by the user to end the session, and never
/// sent to the target.
pub const EOT: u8 = 0x04;

/// Configuration for finding the channel.
/// - `Scan`: Search the start of the target's RAM for either magic number,
///   normally used when the channel's address is unknown.
/// - `Direct`: Use a channel at a known address, such as one taken from the
///   firmware's symbol table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorConfig {
    Scan {
        /// Start of the target's RAM
        ram_base: u32,
        /// Size of the target's RAM in bytes.  Only the first
        /// [`SCAN_WINDOW`] bytes are scanned.
        ram_size: u32,
    },
    Direct {
        /// Address of the channel
        base: u32,
        /// Channel flavour at that address
        kind: ChannelKind,
    },
}

/// What a single poll of the channel achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    /// No data moved in either direction
    Idle,
    /// Some data moved
    Busy,
    /// The user sent EOT.  Any data before it has been delivered.
    Finished,
}

/// Why [`AsyncMonitor::run()`] returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The stop flag was set
    Stopped,
    /// The user sent EOT
    EndOfTransmission,
}

/// Find the first channel magic number in a block of RAM read from
/// `ram_base`.
///
/// Only word aligned offsets are checked.  Returns the channel's address and
/// flavour.
pub fn scan_for_magic(ram_base: u32, ram: &[u8]) -> Option<(u32, ChannelKind)> {
    ram.chunks_exact(4).enumerate().find_map(|(ii, word)| {
        let magic = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        ChannelKind::from_magic(magic).map(|kind| (ram_base + (ii as u32 * 4), kind))
    })
}
