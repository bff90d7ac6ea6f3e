//! Command protocol engine.
//!
//! An ASCII, line-oriented protocol for driving firmware from a terminal or a
//! host program, designed to also work on a multi-drop RS485 bus:
//!
//! ```text
//! [@<hex-address>] <command> [args...][;<command> [args...]]* [$<hex-crc16>] <CR|LF>
//! ```
//!
//! - `@05` addresses device 5.  `@FF` is broadcast.  A device with a non-zero
//!   address ignores packets without one.
//! - Commands are matched against a static table of [`Command`]s.  Any
//!   unambiguous prefix of a command name works.
//! - `;` chains commands in one packet.  The chain stops at the first failure.
//! - `$xxxx` is an optional CRC-16 over everything before it.  If present and
//!   correct, responses are checksummed in the same way.
//!
//! Every line of response output is prefixed `*<hex-address> ` when the device
//! has an address, so that other devices on the bus can recognise it as
//! not being a command.  Every packet ends with an `OK` or `ERROR` line.
//!
//! ```rust,ignore
//! use swd_serial::command::{Command, CommandParser, ParserConfig, help_command};
//! use swd_serial::channel::SwdStream;
//!
//! fn version(parser: &mut CommandParser<'_, SwdStream>) -> swd_serial::Result<()> {
//!     parser.print_var("version", "1.0");
//!     Ok(())
//! }
//!
//! static COMMANDS: &[Command<SwdStream>] = &[
//!     Command { name: "help", args: None, handler: help_command, description: "Show help on all commands" },
//!     Command { name: "version", args: None, handler: version, description: "Show the firmware version" },
//! ];
//!
//! let mut parser = CommandParser::new(stream, COMMANDS, ParserConfig::default());
//! loop {
//!     parser.poll();
//! }
//! ```

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

pub mod crc;
pub mod parser;

pub use parser::CommandParser;

use crate::Result;
use crate::stream::Stream;

/// Maximum packet length in bytes, excluding the line terminator
pub const MAX_PACKET: usize = 64;

/// Address every device accepts
pub const BROADCAST_ADDRESS: u8 = 0xFF;

/// Called with the parser positioned after the command name, so it can
/// parse its own arguments.  An `Err` fails the packet and stops any chain.
pub type CommandHandler<S> = fn(&mut CommandParser<'_, S>) -> Result<()>;

/// One entry in a command table
pub struct Command<S: Stream> {
    /// Name to match
    pub name: &'static str,
    /// Argument summary shown by help
    pub args: Option<&'static str>,
    pub handler: CommandHandler<S>,
    /// One line description shown by help
    pub description: &'static str,
}

/// Parser configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Bus address, or 0 if this device is not on a multi-drop bus
    pub address: u8,
    /// Echo input, support backspace, and show a prompt
    pub interactive: bool,
    /// Check `$xxxx` CRCs on input and add them to responses
    pub crc: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            address: 0,
            interactive: false,
            crc: true,
        }
    }
}

/// Diagnostic counters.  These accumulate until cleared.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Packets dropped for exceeding [`MAX_PACKET`]
    pub overflow: u32,
    /// Control characters dropped
    pub illegal_char: u32,
    /// Packets rejected for a bad CRC
    pub crc_mismatch: u32,
    /// Packets dropped for having no address when this device has one
    pub missing_address: u32,
    /// Packets containing an unknown command
    pub invalid_command: u32,
    /// Commands which returned an error
    pub command_error: u32,
    /// Commands which succeeded
    pub command_ok: u32,
}

impl Stats {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Transmit enable line for a half-duplex bus.
///
/// The parser asserts this before its first byte of output and deasserts it,
/// after flushing the stream, once it is waiting for input again.
pub trait TxEnable {
    fn is_enabled(&self) -> bool;
    fn set_enabled(&mut self, enabled: bool);
}

/// Ready-made `help` command handler
pub fn help_command<S: Stream>(parser: &mut CommandParser<'_, S>) -> Result<()> {
    parser.show_help();
    Ok(())
}

/// Ready-made handler which outputs the [`Stats`]
pub fn stats_command<S: Stream>(parser: &mut CommandParser<'_, S>) -> Result<()> {
    parser.show_stats();
    Ok(())
}

/// Ready-made handler which clears the [`Stats`]
pub fn clear_stats_command<S: Stream>(parser: &mut CommandParser<'_, S>) -> Result<()> {
    parser.clear_stats();
    Ok(())
}
