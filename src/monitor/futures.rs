//! Asynchronous Monitor - used by a Host.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use alloc::vec;
use core::sync::atomic::{AtomicBool, Ordering};
#[allow(unused_imports)]
use log::{debug, error, info, trace, warn};

use crate::channel::{ChannelKind, HostChannel, ProbeIo, Session};
use crate::io::{ConsoleIn, ConsoleOut};
use crate::monitor::{Activity, EOT, ExitReason, MonitorConfig, SCAN_WINDOW, scan_for_magic};
use crate::ring::RING_SIZE;
use crate::{Error, Result};

/// Yield delay for async polling loops.
///
/// Application must provide an implementation of this trait in order for the
/// monitor to be able to yield when the channel is idle.
///
/// This trait keeps `swd-serial` free of any specific async runtime.
///
/// Example:
///
/// ```rust,ignore
/// use embassy_time::{Duration, Timer};
/// struct Delay;
/// impl AsyncDelay for Delay {
///     async fn delay() {
///         Timer::after(Duration::from_millis(10)).await;
///     }
/// }
/// ```
pub trait AsyncDelay {
    fn delay() -> impl Future<Output = ()>;
}

/// Async Monitor, moving data between the host's console and a channel in
/// the target's RAM.
///
/// See [`AsyncDelay`] for required delay trait.
///
/// Example usage:
///
/// ```rust,ignore
/// use swd_serial::channel::ReaderWriterIo;
/// use swd_serial::monitor::{AsyncMonitor, MonitorConfig};
///
/// let config = MonitorConfig::Scan {
///     ram_base: 0x2000_0000,
///     ram_size: 0x1_0000,
/// };
/// let io = ReaderWriterIo::new(&mut reader, &mut writer);
/// let mut monitor = AsyncMonitor::<_, Delay>::connect(io, config).await?;
/// let reason = monitor.run(&mut stdout, &mut stdin, &STOP).await?;
/// ```
pub struct AsyncMonitor<I: ProbeIo, D: AsyncDelay> {
    io: I,
    session: Session,
    out_buf: [u8; RING_SIZE],
    in_buf: [u8; RING_SIZE],
    _delay: core::marker::PhantomData<D>,
}

impl<I: ProbeIo, D: AsyncDelay> AsyncMonitor<I, D> {
    /// Find the channel and create a new AsyncMonitor
    ///
    /// Arguments:
    /// - `io`: Object implementing [`ProbeIo`] to access the target
    /// - `config`: How to find the channel
    pub async fn connect(mut io: I, config: MonitorConfig) -> Result<Self> {
        let session = match config {
            MonitorConfig::Scan { ram_base, ram_size } => {
                Self::scan(&mut io, ram_base, ram_size).await?
            }
            MonitorConfig::Direct { base, kind } => {
                HostChannel::from_target(&mut io, base, kind)
                    .await?
                    .session()
            }
        };

        Ok(Self {
            io,
            session,
            out_buf: [0; RING_SIZE],
            in_buf: [0; RING_SIZE],
            _delay: core::marker::PhantomData,
        })
    }

    /// The channel being monitored
    pub fn session(&self) -> Session {
        self.session
    }

    /// Consume the monitor, returning the probe I/O object
    pub fn into_inner(self) -> I {
        self.io
    }

    /// Poll the channel once, moving whatever data is waiting in each
    /// direction.
    ///
    /// Arguments:
    /// - `sink`: Receives the target's output
    /// - `source`: Polled for input to send to the target
    ///
    /// Returns:
    /// - `Ok(activity)`: Whether any data moved, or the user sent EOT
    /// - `Err(Error::Io)`: A probe transaction failed.  The session should
    ///   be abandoned.
    /// - `Err(Error::Console)`: The sink or source failed
    pub async fn poll<O, N>(&mut self, sink: &mut O, source: &mut N) -> Result<Activity>
    where
        O: ConsoleOut,
        N: ConsoleIn,
    {
        let mut channel = HostChannel::new(&mut self.io, self.session);
        let status = channel.read_status().await?;
        trace!("Status {status:?}");

        let mut busy = false;

        // Target to host
        if status.out_pending() > 0 {
            let count = channel.read_output(&status, &mut self.out_buf).await?;
            sink.write_all(&self.out_buf[..count]).map_err(|e| {
                debug!("Console write failed: {e:?}");
                Error::Console
            })?;
            channel.consume_output(status.out_head).await?;
            busy = true;
        }

        // Host to target.  Input is still checked for EOT with a print
        // channel, so the user can end the session.
        let free = match self.session.kind() {
            ChannelKind::Stream => status.in_free(),
            ChannelKind::Print => RING_SIZE - 1,
        };
        if free == 0 {
            return Ok(activity(busy));
        }

        let count = source
            .read_available(&mut self.in_buf[..free])
            .map_err(|e| {
                debug!("Console read failed: {e:?}");
                Error::Console
            })?;
        let (count, finished) = match self.in_buf[..count].iter().position(|&b| b == EOT) {
            Some(pos) => (pos, true),
            None => (count, false),
        };

        if count > 0 {
            if self.session.kind().has_input() {
                channel.write_input(&status, &self.in_buf[..count]).await?;
                busy = true;
            } else {
                warn!("Ignoring {count} bytes of input - print channel has no input");
            }
        }

        if finished {
            warn!("End of transmission received, finishing");
            Ok(Activity::Finished)
        } else {
            Ok(activity(busy))
        }
    }

    /// Poll the channel until stopped.
    ///
    /// Yields via [`AsyncDelay::delay()`] whenever a poll moves no data.
    ///
    /// The console is not read while the target's input ring is full, so an
    /// EOT typed then is only seen once the firmware reads some input.  Until
    /// it does, `stop` is the only way out.
    ///
    /// Arguments:
    /// - `sink`: Receives the target's output
    /// - `source`: Polled for input to send to the target
    /// - `stop`: Checked before every poll, for example set by a Ctrl-C
    ///   handler
    ///
    /// Returns:
    /// - `Ok(reason)`: The stop flag was set, or the user sent EOT
    /// - `Err(error)`: A probe transaction, or the console, failed
    pub async fn run<O, N>(
        &mut self,
        sink: &mut O,
        source: &mut N,
        stop: &AtomicBool,
    ) -> Result<ExitReason>
    where
        O: ConsoleOut,
        N: ConsoleIn,
    {
        debug!(
            "Monitoring {:?} channel at {:#010X}",
            self.session.kind(),
            self.session.base()
        );

        loop {
            if stop.load(Ordering::Relaxed) {
                debug!("Monitor stopped");
                return Ok(ExitReason::Stopped);
            }

            match self.poll(sink, source).await {
                Ok(Activity::Idle) => D::delay().await,
                Ok(Activity::Busy) => (),
                Ok(Activity::Finished) => return Ok(ExitReason::EndOfTransmission),
                Err(e) => {
                    debug!("Monitor failed: {e}");
                    return Err(e);
                }
            }
        }
    }
}

// Internal functions
impl<I: ProbeIo, D: AsyncDelay> AsyncMonitor<I, D> {
    async fn scan(io: &mut I, ram_base: u32, ram_size: u32) -> Result<Session> {
        let len = ram_size.min(SCAN_WINDOW) as usize;
        let mut ram = vec![0u8; len];
        io.read_bytes(ram_base, &mut ram).await?;

        let Some((base, kind)) = scan_for_magic(ram_base, &ram) else {
            debug!("No channel found in {len} bytes from {ram_base:#010X}");
            return Err(Error::NotFound);
        };

        debug!("Found {kind:?} channel at {base:#010X}");
        Session::new(base, kind)
    }
}

fn activity(busy: bool) -> Activity {
    if busy { Activity::Busy } else { Activity::Idle }
}
