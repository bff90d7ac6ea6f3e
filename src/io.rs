//! I/O traits used by the host side.
//!
//! [`Reader`] and [`Writer`] access the target's RAM, typically over SWD via
//! a debug probe.  They are async, and are not tied to any particular probe
//! or async runtime.
//!
//! [`ConsoleOut`] and [`ConsoleIn`] are the host's local end of the virtual
//! serial port - usually stdout and a raw mode stdin.
//!
//! # Address Space
//!
//! Reader and Writer use absolute addresses as they appear in the target's
//! memory map.  For example, RAM on STM32 and RP2040 devices starts at
//! `0x20000000`.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

/// Reader trait.
pub trait Reader {
    /// The error type returned by read operations.
    ///
    /// This allows implementations to use their own error types, such as
    /// a probe driver's error.
    type Error: core::fmt::Debug;

    /// Read bytes from the target at the specified absolute address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The absolute address to read from (e.g., `0x20000104`)
    /// * `buf` - Buffer to fill with the read data
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transaction fails.  The host makes
    /// no attempt to retry.
    ///
    /// # Performance Notes
    ///
    /// The host issues one call per contiguous run of data, of up to 256
    /// bytes, plus a 4 byte status read per poll.  Each call should be a
    /// single probe transaction where possible.  The byte-wide index reads
    /// rely on the probe not tearing a 4 byte read.
    fn read(
        &mut self,
        addr: u32,
        buf: &mut [u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Writer trait.
pub trait Writer {
    /// The error type returned by write operations.
    type Error: core::fmt::Debug;

    /// Write bytes to the target at the specified absolute address.
    ///
    /// # Arguments
    ///
    /// * `addr` - The absolute address to write to (e.g., `0x20000106`)
    /// * `data` - Data to write
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transaction fails.
    ///
    /// Index updates are written as single bytes, and must not disturb the
    /// neighbouring bytes, which the target may be updating concurrently.
    fn write(
        &mut self,
        addr: u32,
        data: &[u8],
    ) -> impl core::future::Future<Output = Result<(), Self::Error>> + Send;
}

/// Host side sink for data received from the target.
pub trait ConsoleOut {
    type Error: core::fmt::Debug;

    /// Write all of `data`, which may contain arbitrary bytes.
    fn write_all(&mut self, data: &[u8]) -> Result<(), Self::Error>;
}

/// Host side source of data to send to the target.
pub trait ConsoleIn {
    type Error: core::fmt::Debug;

    /// Read whatever input is pending into `buf`, without blocking.
    ///
    /// Returns the number of bytes read, 0 if nothing was pending.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}
