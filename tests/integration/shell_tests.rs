//! Full wiring: context, timer service, stream task and simulated UART.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blinkshell::adapters::uart::SimUart;
use blinkshell::app::context::AppContext;
use blinkshell::config::SystemConfig;
use blinkshell::drivers::hw_timer::TimerState;

use crate::mock_hw::RecordingSink;

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + Duration::from_secs(3);
    while Instant::now() < end {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn period_command_over_serial_retunes_blink() {
    let blinks = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&blinks);
    let ctx = AppContext::init(SystemConfig::default(), move |_| {
        counter.fetch_add(1, Ordering::Relaxed);
    })
    .unwrap();
    assert_eq!(ctx.blink().period_ms(), 500);

    let (port, line) = SimUart::new(&ctx.config().uart);
    let sink = RecordingSink::new();
    let _task = ctx.spawn_stream_task(port, sink.clone()).unwrap();

    line.receive(b"period=20\n");
    assert!(eventually(|| ctx.blink().period_ms() == 20));
    assert_eq!(ctx.blink().state(), TimerState::Running);
    assert!(eventually(|| line.transmitted() == b"period=20\n"));

    // 20 ms period: several expiries well within the wait.
    assert!(eventually(|| blinks.load(Ordering::Relaxed) >= 3));
    assert_eq!(sink.count_matching("PeriodChanged"), 1);
}

#[test]
fn rejected_period_leaves_blink_untouched() {
    let ctx = AppContext::init(SystemConfig::default(), |_| {}).unwrap();
    let (port, line) = SimUart::new(&ctx.config().uart);
    let sink = RecordingSink::new();
    let _task = ctx.spawn_stream_task(port, sink.clone()).unwrap();

    line.receive(b"period=-5");
    assert!(eventually(|| sink.count_matching("PeriodRejected") == 1));
    assert_eq!(ctx.blink().period_ms(), 500);
    assert!(eventually(|| line.transmitted() == b"period=-5"));
}
