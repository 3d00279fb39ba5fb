//! Simulated UART → stream router → command parser → timer port.

use std::time::Duration;

use blinkshell::adapters::uart::{SimLine, SimUart};
use blinkshell::app::commands::CommandParser;
use blinkshell::app::ports::SerialPort;
use blinkshell::app::stream::{RouteOutcome, StreamEvent, StreamEventRouter};
use blinkshell::config::UartConfig;
use blinkshell::error::TimerError;

use crate::mock_hw::{MockTimer, PeriodCall, RecordingSink};

const WAIT: Duration = Duration::from_millis(500);
const NOW: Option<Duration> = Some(Duration::ZERO);

struct Rig {
    port: SimUart,
    line: SimLine,
    router: StreamEventRouter,
    timer: MockTimer,
    sink: RecordingSink,
}

impl Rig {
    fn new(cfg: &UartConfig) -> Self {
        let (port, line) = SimUart::new(cfg);
        Self {
            port,
            line,
            router: StreamEventRouter::new(CommandParser::new(WAIT), cfg.pattern_len),
            timer: MockTimer::new(),
            sink: RecordingSink::new(),
        }
    }

    /// Route the next pending event, if any.
    fn step(&mut self) -> Option<RouteOutcome> {
        let event = self.port.next_event(NOW)?;
        Some(self.router.handle(event, &mut self.port, &mut self.timer, &mut self.sink))
    }
}

#[test]
fn period_command_among_words_changes_period_and_echoes() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.receive(b"foo period=1500 bar\r\n");

    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 21, requests: 1 }));
    assert_eq!(rig.timer.calls, vec![PeriodCall { period_ms: 1500, wait: WAIT }]);
    assert_eq!(rig.line.transmitted(), b"foo period=1500 bar\r\n");
    assert_eq!(rig.step(), None);
}

#[test]
fn zero_period_is_echoed_but_not_applied() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.receive(b"period=0");

    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 8, requests: 0 }));
    assert!(rig.timer.calls.is_empty());
    assert_eq!(rig.sink.count_matching("PeriodRejected"), 1);
}

#[test]
fn plain_text_round_trips_unchanged() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.receive(b"no command here");
    rig.step();
    assert_eq!(rig.line.transmitted(), b"no command here");
    assert!(rig.timer.calls.is_empty());
}

#[test]
fn timer_failure_is_logged_and_routing_continues() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.timer = MockTimer::failing(TimerError::CommandTimeout);

    rig.line.receive(b"period=100");
    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 10, requests: 1 }));
    assert_eq!(rig.sink.count_matching("PeriodChangeFailed"), 1);

    rig.line.receive(b"hi");
    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 2, requests: 0 }));
}

#[test]
fn overflow_recovery_then_normal_data() {
    let cfg = UartConfig { rx_buffer: 16, ..UartConfig::default() };
    let mut rig = Rig::new(&cfg);

    rig.line.receive(&[b'x'; 40]);
    // The Data event for what fit, then the overflow.
    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 16, requests: 0 }));
    assert_eq!(rig.step(), Some(RouteOutcome::Flushed));
    assert_eq!(rig.line.pending_events(), 0);

    rig.line.receive(b"period=75");
    assert_eq!(rig.step(), Some(RouteOutcome::Echoed { len: 9, requests: 1 }));
    assert_eq!(rig.timer.periods(), vec![75]);
}

#[test]
fn fifo_overflow_discards_stale_events() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.raise(StreamEvent::FifoOverflow);
    rig.line.receive(b"stale");

    assert_eq!(rig.step(), Some(RouteOutcome::Flushed));
    assert_eq!(rig.line.buffered(), 0);
    assert_eq!(rig.step(), None);
}

#[test]
fn pattern_reads_payload_then_marker() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.receive(b"hello+++");

    assert_eq!(rig.step(), Some(RouteOutcome::Pattern { payload_len: 5, marker_len: 3 }));
    let events = rig.sink.events();
    assert_eq!(events.len(), 1);
    assert!(events[0].contains("pos: 5"));
    assert!(events[0].contains("buffered: 8"));
    assert_eq!(rig.line.buffered(), 0);
}

#[test]
fn pattern_with_lost_position_flushes() {
    let cfg = UartConfig { pattern_queue_len: 0, ..UartConfig::default() };
    let mut rig = Rig::new(&cfg);
    rig.line.receive(b"abc+++def");

    assert_eq!(rig.step(), Some(RouteOutcome::Flushed));
    assert_eq!(rig.line.buffered(), 0);
    assert_eq!(rig.sink.count_matching("PatternLost"), 1);
    assert_eq!(rig.sink.count_matching("Pattern {"), 0);
}

#[test]
fn line_errors_are_logged_only() {
    let mut rig = Rig::new(&UartConfig::default());
    rig.line.raise(StreamEvent::ParityError);
    rig.line.raise(StreamEvent::Break);
    assert_eq!(rig.step(), Some(RouteOutcome::Logged));
    assert_eq!(rig.step(), Some(RouteOutcome::Logged));
    assert_eq!(rig.sink.count_matching("LineError"), 2);
}
