//! Command parser - packet assembly, addressing, CRC checking, dispatch and
//! response output.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::command::crc::{CRC_INITIAL, crc_ccitt_update};
use crate::command::{BROADCAST_ADDRESS, Command, MAX_PACKET, ParserConfig, Stats, TxEnable};
use crate::format::{NumberWriter, VarValue, parse_float};
use crate::stream::Stream;

const CTRL_C: u8 = 0x03;
const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7F;

const ADDRESS_MARKER: u8 = b'@';
const RESPONSE_MARKER: u8 = b'*';
const CRC_MARKER: u8 = b'$';
const CHAIN_SEPARATOR: u8 = b';';

const PROMPT: &[u8] = b"> ";

/// Command parser, running over any [`Stream`].
///
/// Call [`Self::poll()`] regularly.  It consumes whatever input is available,
/// and when a complete line has arrived, processes it and dispatches the
/// command handler(s) before returning.
///
/// Handlers use the `parse_*()` methods to read their arguments and the
/// [`NumberWriter`] and `print_*()` methods to respond.  Responses must go
/// through the parser rather than directly to the stream, so that they get
/// the bus address prefix, CRC and transmit enable handling.
pub struct CommandParser<'a, S: Stream> {
    stream: &'a mut S,
    commands: &'a [Command<S>],
    tx_enable: Option<&'a mut dyn TxEnable>,

    buffer: [u8; MAX_PACKET],
    read_pos: usize,
    write_pos: usize,
    // Rest of an overlong line is being thrown away
    discarding: bool,

    address: u8,
    interactive: bool,
    needs_prompt: bool,
    need_response_prefix: bool,

    crc_enabled: bool,
    crc: u16,
    add_crc: bool,

    stats: Stats,
}

impl<'a, S: Stream> CommandParser<'a, S> {
    /// Create a new parser.
    ///
    /// Arguments:
    /// - `stream` - Transport to read packets from and write responses to
    /// - `commands` - Command table
    /// - `config` - Address, interactive mode and CRC support
    pub fn new(stream: &'a mut S, commands: &'a [Command<S>], config: ParserConfig) -> Self {
        Self {
            stream,
            commands,
            tx_enable: None,
            buffer: [0; MAX_PACKET],
            read_pos: 0,
            write_pos: 0,
            discarding: false,
            address: config.address,
            interactive: config.interactive,
            needs_prompt: config.interactive,
            need_response_prefix: true,
            crc_enabled: config.crc,
            crc: CRC_INITIAL,
            add_crc: false,
            stats: Stats::default(),
        }
    }

    /// Use a transmit enable line, for a half-duplex bus.
    pub fn with_tx_enable(mut self, tx_enable: &'a mut dyn TxEnable) -> Self {
        self.tx_enable = Some(tx_enable);
        self
    }

    /// Consume all available input, processing any complete packets.
    pub fn poll(&mut self) {
        while let Some(c) = self.stream.read() {
            self.accept(c);
        }

        self.release_output();
    }

    /// Whether there is input waiting.  Useful for driving an activity LED.
    pub fn input_available(&self) -> bool {
        self.stream.available() > 0
    }

    /// The underlying stream, for output which must bypass response
    /// handling
    pub fn stream(&mut self) -> &mut S {
        &mut *self.stream
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn set_address(&mut self, address: u8) {
        self.address = address;
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
        self.needs_prompt = interactive;
    }

    pub fn set_crc_enabled(&mut self, enabled: bool) {
        self.crc_enabled = enabled;
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn clear_stats(&mut self) {
        self.stats.clear();
    }

    /// Discard the current packet.
    pub fn clear_buffer(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
    }

    /// Take control of the bus.  Idempotent - only the first call after a
    /// [`Self::release_output()`] has any effect.
    ///
    /// Called automatically by all output methods.
    pub fn grab_output(&mut self) {
        if let Some(tx) = self.tx_enable.as_deref_mut() {
            if !tx.is_enabled() {
                tx.set_enabled(true);

                // Any response now must first output the response prefix
                self.need_response_prefix = true;
            }
        }
    }

    /// Release the bus once output has been sent, and show the prompt if
    /// interactive.
    ///
    /// Called automatically at the end of [`Self::poll()`].
    pub fn release_output(&mut self) {
        if self.interactive && self.needs_prompt {
            self.stream.write(PROMPT);
            self.needs_prompt = false;
        }

        if let Some(tx) = self.tx_enable.as_deref_mut() {
            if tx.is_enabled() {
                // The last byte must be on the wire before turning around
                self.stream.flush();
                tx.set_enabled(false);
            }
        }
    }

    /// Output every command with its arguments and description.
    pub fn show_help(&mut self) {
        let commands = self.commands;
        for command in commands {
            self.put_str(command.name);
            if let Some(args) = command.args {
                self.put_char(b' ');
                self.put_str(args);
            }
            self.put_str(" : ");
            self.put_str(command.description);
            self.print_line();
        }
    }

    /// Output the diagnostic counters.
    pub fn show_stats(&mut self) {
        let stats = self.stats;
        self.print_var("overflow", stats.overflow);
        self.print_var("illegal_char", stats.illegal_char);
        self.print_var("crc_mismatch", stats.crc_mismatch);
        self.print_var("missing_address", stats.missing_address);
        self.print_var("invalid_command", stats.invalid_command);
        self.print_var("command_error", stats.command_error);
        self.print_var("command_ok", stats.command_ok);
    }

    /// Output a `name=value` line.
    pub fn print_var<V: VarValue>(&mut self, name: &str, value: V) {
        self.put_str(name);
        self.put_char(b'=');
        value.write_value(self);
        self.print_line();
    }

    /// Output a `name=0xVALUE` line.
    pub fn print_var_hex(&mut self, name: &str, value: u32) {
        self.put_str(name);
        self.put_char(b'=');
        self.print_hex(value, 0, false);
        self.print_line();
    }

    /// End the current response line.
    pub fn print_line(&mut self) {
        self.put_char(b'\n');
    }
}

// Argument parsing, for use by command handlers.  Each skips leading spaces
// and returns `None` if there is no valid argument.
impl<S: Stream> CommandParser<'_, S> {
    /// Parse an unsigned decimal byte.  Overflow wraps.
    pub fn parse_byte(&mut self) -> Option<u8> {
        self.skip_space();

        let mut value: u8 = 0;
        let mut digits = 0;
        while let Some(c) = self.peek_byte() {
            if !c.is_ascii_digit() {
                break;
            }
            value = value.wrapping_mul(10).wrapping_add(c - b'0');
            self.read_pos += 1;
            digits += 1;
        }

        (digits > 0).then_some(value)
    }

    /// Parse a signed decimal integer.  Overflow wraps.
    pub fn parse_int(&mut self) -> Option<i32> {
        self.parse_signed().map(|v| v as i32)
    }

    /// Parse a signed decimal long integer.  Overflow wraps.
    pub fn parse_long(&mut self) -> Option<i64> {
        self.parse_signed()
    }

    /// Parse upper case hex digits, without a `0x` prefix.
    ///
    /// Lower case is not accepted, so that the start of a command is never
    /// mistaken for part of an address.
    pub fn parse_hex(&mut self) -> Option<u32> {
        self.skip_space();

        let mut value: u32 = 0;
        let mut digits = 0;
        while let Some(nibble) = self.peek_byte().and_then(hex_nibble) {
            value = value.wrapping_mul(16).wrapping_add(nibble as u32);
            self.read_pos += 1;
            digits += 1;
        }

        (digits > 0).then_some(value)
    }

    /// Parse a float, such as `-1.5e3`.
    pub fn parse_float(&mut self) -> Option<f32> {
        self.skip_space();

        let remaining = self.remaining();
        let end = remaining
            .iter()
            .position(|&c| c == CHAIN_SEPARATOR)
            .unwrap_or(remaining.len());

        match parse_float(&remaining[..end])? {
            (_, 0) => None,
            (value, consumed) => {
                self.read_pos += consumed;
                Some(value)
            }
        }
    }

    /// Parse a word, ending at a space or `;`, into `buf`.  Truncated to
    /// `buf.len()`.
    pub fn parse_string<'b>(&mut self, buf: &'b mut [u8]) -> Option<&'b str> {
        self.parse_text(buf, |c| c == b' ' || c == CHAIN_SEPARATOR)
    }

    /// Parse the rest of the command, including spaces, up to any `;`, into
    /// `buf`.  Truncated to `buf.len()`.
    pub fn parse_rest<'b>(&mut self, buf: &'b mut [u8]) -> Option<&'b str> {
        self.parse_text(buf, |c| c == CHAIN_SEPARATOR)
    }
}

impl<S: Stream> NumberWriter for CommandParser<'_, S> {
    /// All response output goes through here.
    fn put_char(&mut self, c: u8) {
        self.grab_output();

        if self.need_response_prefix {
            self.send_response_prefix();
        }

        if c == b'\n' {
            if self.add_crc {
                let crc = self.crc;
                let mut out = RawOut(&mut *self.stream);
                out.put_char(CRC_MARKER);
                out.put_number(crc as u32, 0, false, 16, 8, 0x1000_0000);
                self.crc = CRC_INITIAL;
            }

            self.stream.write(b"\r\n");

            // Add a prefix to the next line
            self.need_response_prefix = true;
        } else {
            if self.add_crc {
                self.crc = crc_ccitt_update(self.crc, c);
            }

            self.stream.write(&[c]);
        }
    }
}

// Internal functions
impl<'a, S: Stream> CommandParser<'a, S> {
    fn accept(&mut self, c: u8) {
        match c {
            b'\r' | b'\n' => {
                if self.interactive {
                    self.stream.write(b"\r\n");
                }

                if self.discarding {
                    self.discarding = false;
                    self.clear_buffer();
                    self.needs_prompt = true;
                } else {
                    self.process_packet();
                }
            }
            CTRL_C => {
                self.clear_buffer();
                self.discarding = false;

                if self.interactive {
                    self.stream.write(b"\r\n");
                }
                self.needs_prompt = true;
            }
            BACKSPACE | DELETE if self.interactive => {
                if self.write_pos > 0 {
                    self.stream.write(b"\x08 \x08");
                    self.write_pos -= 1;
                }
            }
            c if c < b' ' => {
                // Noise, such as NULs on an RS485 bus
                self.stats.illegal_char += 1;
            }
            _ if self.discarding => {}
            _ if self.write_pos > 0 && self.buffer[0] == RESPONSE_MARKER => {
                // Another device's response.  Drain it without buffering, as
                // long responses would otherwise overflow.
            }
            _ => {
                if self.write_pos >= MAX_PACKET {
                    debug!("Dropping packet longer than {MAX_PACKET} bytes");
                    self.stats.overflow += 1;
                    self.clear_buffer();
                    self.discarding = true;
                    return;
                }

                if self.interactive {
                    self.stream.write(&[c]);
                }

                self.buffer[self.write_pos] = c;
                self.write_pos += 1;
            }
        }
    }

    fn process_packet(&mut self) {
        // After each packet possibly output a prompt
        self.needs_prompt = true;

        if self.write_pos == 0 {
            return;
        }

        // A response from another device on the bus
        if self.buffer[0] == RESPONSE_MARKER {
            self.clear_buffer();
            return;
        }

        if self.buffer[0] == ADDRESS_MARKER {
            self.read_pos = 1;
            match self.parse_hex() {
                Some(addr) if addr == self.address as u32 || addr == BROADCAST_ADDRESS as u32 => {}
                addr => {
                    trace!("Ignoring packet for address {addr:X?}");
                    self.clear_buffer();
                    return;
                }
            }
            self.skip_space();
        } else if self.address != 0 {
            // Stops multiple devices answering at once when there are bus
            // errors
            debug!("Ignoring packet with no address");
            self.stats.missing_address += 1;
            self.clear_buffer();
            return;
        }

        if self.crc_enabled && !self.check_crc() {
            self.clear_buffer();
            self.do_status(false);
            return;
        }

        let ok = self.run_chain();

        self.clear_buffer();
        self.do_status(ok);
        self.add_crc = false;
    }

    // Validates any `$xxxx` suffix, strips it, and turns on response CRCs.
    // Returns false on mismatch, having output the diagnostic.
    fn check_crc(&mut self) -> bool {
        self.add_crc = false;

        let mut crc = CRC_INITIAL;
        let mut marker = None;
        let mut expected = Some(0u16);
        for pos in self.read_pos..self.write_pos {
            let c = self.buffer[pos];
            if c == CRC_MARKER {
                marker.get_or_insert(pos);
            } else if marker.is_some() {
                expected = expected.zip(hex_nibble(c)).map(|(e, n)| (e << 4) | n as u16);
            } else {
                crc = crc_ccitt_update(crc, c);
            }
        }

        let Some(marker) = marker else {
            return true;
        };

        if expected != Some(crc) {
            debug!("CRC mismatch: calculated {crc:04X} expected {expected:04X?}");
            self.stats.crc_mismatch += 1;

            self.put_str("CRC mismatch");
            self.print_line();
            self.print_var_hex("calculated", crc as u32);
            match expected {
                Some(expected) => self.print_var_hex("expected", expected as u32),
                None => self.print_var("expected", "invalid"),
            }
            return false;
        }

        self.write_pos = marker;
        while self.write_pos > self.read_pos && self.buffer[self.write_pos - 1] == b' ' {
            self.write_pos -= 1;
        }

        self.crc = CRC_INITIAL;
        self.add_crc = true;
        true
    }

    fn run_chain(&mut self) -> bool {
        loop {
            let Some(command) = self.match_command() else {
                self.put_str("Not valid command");
                self.print_line();
                self.stats.invalid_command += 1;
                return false;
            };

            trace!("Dispatching {}", command.name);
            let handler = command.handler;
            match handler(self) {
                Ok(()) => self.stats.command_ok += 1,
                Err(e) => {
                    debug!("Command {} failed: {e}", command.name);
                    self.stats.command_error += 1;
                    return false;
                }
            }

            self.skip_space();
            if self.peek_byte() == Some(CHAIN_SEPARATOR) {
                self.read_pos += 1;
                self.skip_space();
            } else {
                return true;
            }
        }
    }

    // Finds the longest command name matching at read_pos, and moves past it.
    //
    // A name matches if the buffer agrees with it up to the end of the name,
    // a space, or the end of the buffer - so unambiguous abbreviations work.
    // On a tie the earliest entry in the table wins.
    fn match_command(&mut self) -> Option<&'a Command<S>> {
        let commands = self.commands;
        let remaining = &self.buffer[self.read_pos..self.write_pos];

        let mut best = None;
        let mut best_len = 0;
        for command in commands {
            let name = command.name.as_bytes();
            for i in 0..=remaining.len() {
                if i >= name.len() || i == remaining.len() || remaining[i] == b' ' {
                    if i > best_len {
                        best_len = i;
                        best = Some(command);
                    }
                    break;
                } else if remaining[i] != name[i] {
                    break;
                }
            }
        }

        self.read_pos += best_len;
        best
    }

    fn do_status(&mut self, ok: bool) {
        // Always the last line of a response
        if ok {
            self.put_str("OK");
        } else {
            self.put_str("ERROR");
        }
        self.print_line();
    }

    // All responses have a prefix so other units on the bus can ignore them
    fn send_response_prefix(&mut self) {
        self.need_response_prefix = false;

        if self.interactive {
            return;
        }

        if self.address != 0 {
            let mut out = RawOut(&mut *self.stream);
            out.put_char(RESPONSE_MARKER);
            out.put_number(self.address as u32, 0, false, 16, 8, 0x1000_0000);
            out.put_char(b' ');
        }
    }

    fn remaining(&self) -> &[u8] {
        &self.buffer[self.read_pos..self.write_pos]
    }

    fn peek_byte(&self) -> Option<u8> {
        self.remaining().first().copied()
    }

    fn skip_space(&mut self) {
        while self.peek_byte() == Some(b' ') {
            self.read_pos += 1;
        }
    }

    fn parse_signed(&mut self) -> Option<i64> {
        self.skip_space();
        let start = self.read_pos;

        let negative = self.peek_byte() == Some(b'-');
        if negative {
            self.read_pos += 1;
        }

        let mut value: i64 = 0;
        let mut digits = 0;
        while let Some(c) = self.peek_byte() {
            if !c.is_ascii_digit() {
                break;
            }
            value = value.wrapping_mul(10).wrapping_add((c - b'0') as i64);
            self.read_pos += 1;
            digits += 1;
        }

        if digits == 0 {
            self.read_pos = start;
            return None;
        }

        Some(if negative { value.wrapping_neg() } else { value })
    }

    fn parse_text<'b>(&mut self, buf: &'b mut [u8], end: impl Fn(u8) -> bool) -> Option<&'b str> {
        self.skip_space();

        let mut len = 0;
        while len < buf.len() {
            match self.peek_byte() {
                Some(c) if !end(c) => {
                    buf[len] = c;
                    len += 1;
                    self.read_pos += 1;
                }
                _ => break,
            }
        }

        if len == 0 {
            return None;
        }
        core::str::from_utf8(&buf[..len]).ok()
    }
}

// Upper case only - see parse_hex()
fn hex_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

// Writes straight to the stream, bypassing prefix and CRC handling
struct RawOut<'s, S: Stream>(&'s mut S);

impl<S: Stream> NumberWriter for RawOut<'_, S> {
    fn put_char(&mut self, c: u8) {
        self.0.write(&[c]);
    }
}
