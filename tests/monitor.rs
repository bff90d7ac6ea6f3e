//! Host monitor against a simulated target.

// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

#![cfg(feature = "async")]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};

use common::{CHANNEL_ADDR, NoDelay, RAM_BASE, RAM_SIZE, SimProbe, Sink, Source, Target};
use swd_serial::Error;
use swd_serial::channel::{ChannelKind, IN_BUFFER_OFFSET, PRINT_MAGIC, STREAM_MAGIC};
use swd_serial::io::ConsoleOut;
use swd_serial::monitor::{
    Activity, AsyncDelay, AsyncMonitor, EOT, ExitReason, MonitorConfig, SCAN_WINDOW,
};
use swd_serial::stream::Stream;

type Monitor = AsyncMonitor<SimProbe, NoDelay>;

fn scan_config() -> MonitorConfig {
    MonitorConfig::Scan {
        ram_base: RAM_BASE,
        ram_size: RAM_SIZE,
    }
}

// Test data, never containing EOT
fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .map(|b| if b == EOT { EOT + 1 } else { b })
        .collect()
}

#[tokio::test]
async fn test_scan_finds_channel() {
    let target = Target::new();
    let probe = target.probe();
    let reads = probe.reads.clone();

    let monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    assert_eq!(monitor.session().base(), CHANNEL_ADDR);
    assert_eq!(monitor.session().kind(), ChannelKind::Stream);

    // One read of the scan window, however big the RAM
    assert_eq!(*reads.borrow(), vec![(RAM_BASE, SCAN_WINDOW as usize)]);
}

#[tokio::test]
async fn test_scan_small_ram() {
    let target = Target::new();
    let probe = target.probe();
    let reads = probe.reads.clone();

    let config = MonitorConfig::Scan {
        ram_base: RAM_BASE,
        ram_size: 0x400,
    };
    let monitor = Monitor::connect(probe, config).await.unwrap();
    assert_eq!(monitor.session().base(), CHANNEL_ADDR);
    assert_eq!(reads.borrow()[0], (RAM_BASE, 0x400));
}

#[tokio::test]
async fn test_scan_skips_unaligned_magic() {
    let target = Target::new();
    let mut probe = target.probe();
    probe.ram[0x22..0x26].copy_from_slice(&STREAM_MAGIC.to_le_bytes());

    let monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    assert_eq!(monitor.session().base(), CHANNEL_ADDR);
}

#[tokio::test]
async fn test_scan_first_match_wins() {
    let target = Target::new();
    let mut probe = target.probe();
    probe.ram[0x20..0x24].copy_from_slice(&PRINT_MAGIC.to_le_bytes());

    let monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    assert_eq!(monitor.session().base(), RAM_BASE + 0x20);
    assert_eq!(monitor.session().kind(), ChannelKind::Print);
}

#[tokio::test]
async fn test_channel_beyond_scan_window_not_found() {
    let target = Target::new();
    let probe = target.probe_at(RAM_BASE + SCAN_WINDOW + 0x100);

    let result = Monitor::connect(probe, scan_config()).await;
    assert!(matches!(result, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_direct_config() {
    let target = Target::new();

    let config = MonitorConfig::Direct {
        base: CHANNEL_ADDR,
        kind: ChannelKind::Stream,
    };
    let monitor = Monitor::connect(target.probe(), config).await.unwrap();
    assert_eq!(monitor.session().base(), CHANNEL_ADDR);

    // Wrong address
    let config = MonitorConfig::Direct {
        base: CHANNEL_ADDR + 4,
        kind: ChannelKind::Stream,
    };
    let result = Monitor::connect(target.probe(), config).await;
    assert!(matches!(result, Err(Error::NotFound)));
}

#[tokio::test]
async fn test_probe_failure_during_scan() {
    let target = Target::new();
    let probe = target.probe();
    probe.fail.set(true);

    let result = Monitor::connect(probe, scan_config()).await;
    assert!(matches!(result, Err(Error::Io)));
}

#[tokio::test]
async fn test_idle_poll() {
    let target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();

    let mut sink = Sink::default();
    let mut source = Source::default();
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Idle
    );
    assert!(sink.0.is_empty());
}

#[tokio::test]
async fn test_round_trip_device_to_host_across_wrap() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    let first = pattern(200, 1);
    let second = pattern(200, 2);

    Stream::write(target.stream(), &first);
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Busy
    );
    assert_eq!(sink.0, first);

    // The second batch wraps the ring
    Stream::write(target.stream(), &second);
    monitor.poll(&mut sink, &mut source).await.unwrap();
    assert_eq!(sink.0[200..], second[..]);

    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Idle
    );
    assert_eq!(sink.0.len(), 400);
}

#[tokio::test]
async fn test_round_trip_host_to_device_across_wrap() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    let first = pattern(200, 3);
    let second = pattern(200, 4);

    source.push(&first);
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Busy
    );
    assert_eq!(target.stream().available(), 200);
    assert_eq!(common::device_read_all(target.stream()), first);

    source.push(&second);
    monitor.poll(&mut sink, &mut source).await.unwrap();
    assert_eq!(common::device_read_all(target.stream()), second);
}

#[tokio::test]
async fn test_input_limited_to_free_space() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    // More than the ring can hold - the rest waits at the host
    let data = pattern(300, 5);
    source.push(&data);
    monitor.poll(&mut sink, &mut source).await.unwrap();
    assert_eq!(target.stream().available(), 255);
    assert_eq!(source.0.len(), 45);

    // Full, so nothing moves
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Idle
    );

    let mut received = common::device_read_all(target.stream());
    monitor.poll(&mut sink, &mut source).await.unwrap();
    received.extend(common::device_read_all(target.stream()));
    assert_eq!(received, data);
}

#[tokio::test]
async fn test_eot_delivers_preceding_bytes_only() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    source.push(b"bye\x04ignored");
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Finished
    );
    assert_eq!(common::device_read_all(target.stream()), b"bye");
}

#[tokio::test]
async fn test_eot_in_wrapped_segment() {
    let mut target = Target::new();
    let probe = target.probe();
    let writes = probe.writes.clone();
    let mut monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    // Move in_head to 250
    source.push(&[b'z'; 250]);
    monitor.poll(&mut sink, &mut source).await.unwrap();
    assert_eq!(common::device_read_all(target.stream()), [b'z'; 250]);
    writes.borrow_mut().clear();

    // 5 bytes fill the end of the ring, the next 3 wrap, then EOT
    source.push(b"abcdefgh\x04xyz");
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Finished
    );
    assert_eq!(common::device_read_all(target.stream()), b"abcdefgh");
    assert!(source.0.is_empty());

    let in_buffer = CHANNEL_ADDR + IN_BUFFER_OFFSET;
    assert_eq!(
        writes.borrow()[..2],
        [(in_buffer + 251, 5), (in_buffer, 3)]
    );
}

#[tokio::test]
async fn test_eot_waits_while_input_full() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    source.push(&pattern(255, 7));
    monitor.poll(&mut sink, &mut source).await.unwrap();

    // The firmware isn't reading, so the EOT stays with the console
    source.push(&[EOT]);
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Idle
    );
    assert_eq!(source.0, [EOT]);

    common::device_read_all(target.stream());
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Finished
    );
}

#[tokio::test]
async fn test_output_still_drained_with_eot() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    Stream::write(target.stream(), b"last words");
    source.push(b"\x04");
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Finished
    );
    assert_eq!(sink.0, b"last words");
}

#[tokio::test]
async fn test_probe_failure_ends_session() {
    let mut target = Target::new();
    let probe = target.probe();
    let fail = probe.fail.clone();
    let mut monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    Stream::write(target.stream(), b"pending");
    fail.set(true);
    assert_eq!(monitor.poll(&mut sink, &mut source).await, Err(Error::Io));

    // Nothing was consumed
    assert!(sink.0.is_empty());
    fail.set(false);
    monitor.poll(&mut sink, &mut source).await.unwrap();
    assert_eq!(sink.0, b"pending");
}

struct BrokenSink;

impl ConsoleOut for BrokenSink {
    type Error = ();

    fn write_all(&mut self, _data: &[u8]) -> Result<(), Self::Error> {
        Err(())
    }
}

#[tokio::test]
async fn test_console_failure() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut source = Source::default();

    Stream::write(target.stream(), b"x");
    assert_eq!(
        monitor.poll(&mut BrokenSink, &mut source).await,
        Err(Error::Console)
    );
}

#[tokio::test]
async fn test_print_channel_is_output_only() {
    let target = Target::new();
    let mut probe = target.probe();

    // A print channel, holding "hi", ahead of the stream in RAM
    probe.ram[0x40..0x44].copy_from_slice(&PRINT_MAGIC.to_le_bytes());
    probe.ram[0x44..0x48].copy_from_slice(&[2, 0, 0, 0]);
    probe.ram[0x49..0x4B].copy_from_slice(b"hi");

    let mut monitor = Monitor::connect(probe, scan_config()).await.unwrap();
    assert_eq!(monitor.session().kind(), ChannelKind::Print);
    assert_eq!(monitor.session().in_buffer_addr(), None);
    let mut sink = Sink::default();
    let mut source = Source::default();

    source.push(b"typed");
    assert_eq!(
        monitor.poll(&mut sink, &mut source).await.unwrap(),
        Activity::Busy
    );
    assert_eq!(sink.0, b"hi");
    assert!(source.0.is_empty());

    // Only out_tail was written
    let probe = monitor.into_inner();
    assert_eq!(&probe.ram[0x44..0x48], &[2, 2, 0, 0]);
}

#[tokio::test]
async fn test_print_channel_eot() {
    let target = Target::new();
    let config = MonitorConfig::Direct {
        base: RAM_BASE + 0x40,
        kind: ChannelKind::Print,
    };
    let mut probe = target.probe();
    probe.ram[0x40..0x44].copy_from_slice(&PRINT_MAGIC.to_le_bytes());
    probe.ram[0x44..0x48].copy_from_slice(&[0; 4]);

    let mut monitor = Monitor::connect(probe, config).await.unwrap();
    let mut source = Source::default();
    source.push(b"\x04");
    assert_eq!(
        monitor.poll(&mut Sink::default(), &mut source).await.unwrap(),
        Activity::Finished
    );
}

static STOP: AtomicBool = AtomicBool::new(false);

struct StopWhenIdle;

impl AsyncDelay for StopWhenIdle {
    async fn delay() {
        STOP.store(true, Ordering::Relaxed);
    }
}

#[tokio::test]
async fn test_run_until_stopped() {
    let mut target = Target::new();
    let mut monitor = AsyncMonitor::<SimProbe, StopWhenIdle>::connect(target.probe(), scan_config())
        .await
        .unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();

    Stream::write(target.stream(), b"hello");
    source.push(b"world");
    let reason = monitor.run(&mut sink, &mut source, &STOP).await.unwrap();

    assert_eq!(reason, ExitReason::Stopped);
    assert_eq!(sink.0, b"hello");
    assert_eq!(common::device_read_all(target.stream()), b"world");
}

#[tokio::test]
async fn test_run_until_eot() {
    let mut target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let mut sink = Sink::default();
    let mut source = Source::default();
    let stop = AtomicBool::new(false);

    source.push(b"q\x04");
    let reason = monitor.run(&mut sink, &mut source, &stop).await.unwrap();

    assert_eq!(reason, ExitReason::EndOfTransmission);
    assert_eq!(common::device_read_all(target.stream()), b"q");
}

#[tokio::test]
async fn test_run_already_stopped() {
    let target = Target::new();
    let mut monitor = Monitor::connect(target.probe(), scan_config()).await.unwrap();
    let stop = AtomicBool::new(true);

    let reason = monitor
        .run(&mut Sink::default(), &mut Source::default(), &stop)
        .await
        .unwrap();
    assert_eq!(reason, ExitReason::Stopped);
}
