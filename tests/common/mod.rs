//! Simulated target for the host side: a real [`SwdStream`] placed in a
//! block of fake RAM, reached only through [`ProbeIo`] transactions.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::convert::Infallible;
use std::rc::Rc;

use async_trait::async_trait;
use swd_serial::channel::{ProbeIo, SwdStream};
use swd_serial::io::{ConsoleIn, ConsoleOut};
use swd_serial::monitor::AsyncDelay;
use swd_serial::stream::Stream;
use swd_serial::{Error, Result};

pub const RAM_BASE: u32 = 0x2000_0000;
pub const RAM_SIZE: u32 = 0x2_0000;
pub const CHANNEL_ADDR: u32 = 0x2000_0140;

const CHANNEL_SIZE: usize = core::mem::size_of::<SwdStream>();

/// The target: background RAM plus the channel, which lives on the heap.
///
/// The firmware and the probe both reach the channel through one shared
/// reference, and the probe only writes its atomics and `UnsafeCell`s.  The
/// channel is leaked so that it outlives every probe.
pub struct Target {
    stream: &'static SwdStream,
}

impl Target {
    pub fn new() -> Self {
        Self {
            stream: Box::leak(Box::new(SwdStream::new())),
        }
    }

    /// The firmware's view of the channel
    pub fn stream(&mut self) -> &mut &'static SwdStream {
        &mut self.stream
    }

    pub fn probe(&self) -> SimProbe {
        self.probe_at(CHANNEL_ADDR)
    }

    /// A probe which sees the channel at `channel_addr`
    pub fn probe_at(&self, channel_addr: u32) -> SimProbe {
        // Background RAM full of a pattern which can't be taken for a magic
        // number
        SimProbe {
            channel: core::ptr::from_ref(self.stream).cast::<u8>().cast_mut(),
            channel_addr,
            ram: (0..0x2000u32).map(|i| (i * 7) as u8).collect(),
            fail: Rc::new(Cell::new(false)),
            reads: Rc::new(RefCell::new(Vec::new())),
            writes: Rc::new(RefCell::new(Vec::new())),
        }
    }
}

pub struct SimProbe {
    channel: *mut u8,
    channel_addr: u32,
    pub ram: Vec<u8>,
    /// Set to make every transaction fail
    pub fail: Rc<Cell<bool>>,
    /// Every read's address and length
    pub reads: Rc<RefCell<Vec<(u32, usize)>>>,
    /// Every write's address and length
    pub writes: Rc<RefCell<Vec<(u32, usize)>>>,
}

impl SimProbe {
    fn channel_offset(&self, addr: u32) -> Option<usize> {
        let offset = addr.checked_sub(self.channel_addr)? as usize;
        (offset < CHANNEL_SIZE).then_some(offset)
    }

    fn check_fault(&self) -> Result<()> {
        if self.fail.get() {
            Err(Error::Io)
        } else {
            Ok(())
        }
    }
}

#[async_trait(?Send)]
impl ProbeIo for SimProbe {
    async fn read_bytes(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.check_fault()?;
        self.reads.borrow_mut().push((addr, buf.len()));

        for (ii, byte) in buf.iter_mut().enumerate() {
            let addr = addr + ii as u32;
            *byte = match self.channel_offset(addr) {
                Some(offset) => unsafe { core::ptr::read_volatile(self.channel.add(offset)) },
                None => self.ram[(addr - RAM_BASE) as usize],
            };
        }
        Ok(())
    }

    async fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.check_fault()?;
        self.writes.borrow_mut().push((addr, data.len()));

        match self.channel_offset(addr) {
            Some(offset) => {
                // The magic is the only field outside an UnsafeCell
                assert!(offset >= 4 && offset + data.len() <= CHANNEL_SIZE);
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        data.as_ptr(),
                        self.channel.add(offset),
                        data.len(),
                    );
                }
            }
            None => {
                let start = (addr - RAM_BASE) as usize;
                self.ram[start..start + data.len()].copy_from_slice(data);
            }
        }
        Ok(())
    }
}

/// The host's terminal output
#[derive(Default)]
pub struct Sink(pub Vec<u8>);

impl ConsoleOut for Sink {
    type Error = Infallible;

    fn write_all(&mut self, data: &[u8]) -> core::result::Result<(), Self::Error> {
        self.0.extend_from_slice(data);
        Ok(())
    }
}

/// The host's keyboard
#[derive(Default)]
pub struct Source(pub VecDeque<u8>);

impl Source {
    pub fn push(&mut self, data: &[u8]) {
        self.0.extend(data);
    }
}

impl ConsoleIn for Source {
    type Error = Infallible;

    fn read_available(&mut self, buf: &mut [u8]) -> core::result::Result<usize, Self::Error> {
        let count = buf.len().min(self.0.len());
        for byte in buf[..count].iter_mut() {
            *byte = self.0.pop_front().unwrap();
        }
        Ok(count)
    }
}

pub struct NoDelay;

impl AsyncDelay for NoDelay {
    async fn delay() {}
}

/// Drain everything the firmware has received
pub fn device_read_all<S: Stream>(stream: &mut S) -> Vec<u8> {
    let mut data = Vec::new();
    while let Some(byte) = Stream::read(stream) {
        data.push(byte);
    }
    data
}
