//! Byte stream trait.
//!
//! This is the contract between a byte transport and the
//! [`crate::command::CommandParser`] which runs on top of it.  The device
//! channels in [`crate::channel`] implement it, but any non-blocking byte
//! transport - a UART driver, an RS485 transceiver, a test harness - can too.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Non-blocking byte stream.
pub trait Stream {
    /// Number of bytes that can be read without waiting.
    fn available(&self) -> usize;

    /// Read one byte, or `None` if none is available.
    fn read(&mut self) -> Option<u8>;

    /// Return the next byte without consuming it, or `None` if none is
    /// available.
    fn peek(&self) -> Option<u8>;

    /// Write bytes, returning how many were accepted.
    fn write(&mut self, data: &[u8]) -> usize;

    /// Number of bytes which may be written.  Implementations which overwrite
    /// rather than block may report nominal capacity here.
    fn available_for_write(&self) -> usize;

    /// Wait until every written byte has physically left the transport.
    ///
    /// Used before turning a half-duplex bus around.  Transports with no
    /// transmit hardware can leave this as a no-op.
    fn flush(&mut self) {}
}
