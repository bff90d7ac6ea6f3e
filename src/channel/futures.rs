//! Asynchronous Channel access - used by the Host.
//!
//! The host never shares memory with the target directly.  Every access is a
//! discrete probe transaction, so the ordering rules matter:
//!
//! - Outbound data is copied out of the target before `out_tail` is
//!   published, and `out_tail` never moves past what was copied.
//! - Inbound data is written before `in_head` is published.
//! - Index updates are single byte writes, so they never clobber the index
//!   bytes the target owns.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::boxed::Box;
use async_trait::async_trait;
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::channel::{ChannelKind, Session, StatusQuad};
use crate::io::{Reader, Writer};
use crate::ring::RING_SIZE;
use crate::{Error, Result};

/// Trait for accessing the target's memory.
///
/// Async, as it is typically implemented over SWD.  See [`ReaderWriterIo`]
/// for an implementation using the [`Reader`] and [`Writer`] traits.
#[async_trait(?Send)]
pub trait ProbeIo {
    /// Read a contiguous block of target memory in one transaction
    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write a contiguous block of target memory in one transaction
    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()>;
}

/// Host's handle on a channel in the target's memory
pub struct HostChannel<'a, I: ProbeIo> {
    io: &'a mut I,
    session: Session,
}

impl<'a, I: ProbeIo> HostChannel<'a, I> {
    /// Use a channel already known to be at `session`.
    pub fn new(io: &'a mut I, session: Session) -> Self {
        Self { io, session }
    }

    /// Connect to an existing channel, checking its magic number.
    ///
    /// Arguments:
    /// - `io` - Object implementing [`ProbeIo`] to access the target
    /// - `base` - Address of the channel
    /// - `kind` - Expected channel flavour
    pub async fn from_target(io: &'a mut I, base: u32, kind: ChannelKind) -> Result<Self> {
        let mut channel = Self::new(io, Session::new(base, kind)?);

        let magic = channel.read_magic().await?;
        if magic != kind.magic() {
            debug!("Found {magic:#010X} at {base:#010X}, expected {kind:?} channel");
            return Err(Error::NotFound);
        }

        debug!("Connected to {kind:?} channel at {base:#010X}");
        Ok(channel)
    }

    pub fn session(&self) -> Session {
        self.session
    }

    /// Read the channel's magic number.
    pub async fn read_magic(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.io.read_bytes(self.session.base(), &mut buf).await?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Read all four ring indices in one transaction.
    pub async fn read_status(&mut self) -> Result<StatusQuad> {
        let mut buf = [0u8; 4];
        self.io
            .read_bytes(self.session.status_addr(), &mut buf)
            .await?;
        Ok(StatusQuad::from_bytes(buf))
    }

    /// Copy the outbound bytes `status` says are pending into `buf`,
    /// without consuming them.
    ///
    /// Returns the number of bytes copied.  Follow up with
    /// [`Self::consume_output()`] once they have been dealt with.
    pub async fn read_output(
        &mut self,
        status: &StatusQuad,
        buf: &mut [u8; RING_SIZE],
    ) -> Result<usize> {
        let count = status.out_pending();
        if count == 0 {
            return Ok(0);
        }

        // Data runs from out_tail+1 to out_head inclusive
        let start = status.out_tail.wrapping_add(1) as usize;
        let first = count.min(RING_SIZE - start);
        let base = self.session.out_buffer_addr();

        self.io
            .read_bytes(base + start as u32, &mut buf[..first])
            .await?;
        if first < count {
            // Wrapped - the rest runs from 0 to out_head inclusive
            self.io.read_bytes(base, &mut buf[first..count]).await?;
        }

        trace!(
            "Read {count} bytes {}..={}",
            status.out_tail.wrapping_add(1),
            status.out_head
        );
        Ok(count)
    }

    /// Publish `out_tail`, releasing the space used by output copied with
    /// [`Self::read_output()`].
    pub async fn consume_output(&mut self, out_tail: u8) -> Result<()> {
        let addr = self.session.status_addr() + StatusQuad::out_tail_offset();
        self.io.write_bytes(addr, &[out_tail]).await
    }

    /// Write as much of `data` as there is space for into the inbound
    /// buffer, then publish the new `in_head`.
    ///
    /// Returns the number of bytes written.
    pub async fn write_input(&mut self, status: &StatusQuad, data: &[u8]) -> Result<usize> {
        let Some(base) = self.session.in_buffer_addr() else {
            return Err(Error::InvalidOperation);
        };

        let count = data.len().min(status.in_free());
        if count == 0 {
            return Ok(0);
        }

        // Fill in_head+1 to the end of the buffer, then wrap to 0
        let start = status.in_head.wrapping_add(1) as usize;
        let first = count.min(RING_SIZE - start);

        self.io
            .write_bytes(base + start as u32, &data[..first])
            .await?;
        if first < count {
            self.io.write_bytes(base, &data[first..count]).await?;
        }

        let in_head = status.in_head.wrapping_add(count as u8);
        let addr = self.session.status_addr() + StatusQuad::in_head_offset();
        self.io.write_bytes(addr, &[in_head]).await?;

        trace!("Wrote {count} bytes, in_head now {in_head}");
        Ok(count)
    }
}

/// Channel I/O implementation using [`crate::io::Reader`] and
/// [`crate::io::Writer`] traits.
pub struct ReaderWriterIo<'a, R: Reader, W: Writer> {
    reader: &'a mut R,
    writer: &'a mut W,
}

impl<'a, R: Reader, W: Writer> ReaderWriterIo<'a, R, W> {
    /// Create new instance
    pub fn new(reader: &'a mut R, writer: &'a mut W) -> Self {
        Self { reader, writer }
    }
}

#[async_trait(?Send)]
impl<R: Reader, W: Writer> ProbeIo for ReaderWriterIo<'_, R, W> {
    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.reader.read(addr, buf).await.map_err(|e| {
            debug!("Read of {} bytes at {addr:#010X} failed: {e:?}", buf.len());
            Error::Io
        })
    }

    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.writer.write(addr, data).await.map_err(|e| {
            debug!("Write of {} bytes at {addr:#010X} failed: {e:?}", data.len());
            Error::Io
        })
    }
}
