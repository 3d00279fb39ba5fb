//! Serial stream event routing.
//!
//! The UART driver reports what happened on the line through a bounded
//! event queue; the router is its single consumer.
//!
//! | Event                            | Action                                   |
//! |----------------------------------|------------------------------------------|
//! | `Data`                           | read, run `period=` parser, echo back    |
//! | `FifoOverflow`, `RingBufferFull` | flush RX, reset event queue              |
//! | `Break`, `ParityError`, `FrameError` | log                                  |
//! | `PatternDetected`                | read payload, then the marker, log both  |
//! | `Unknown`                        | log the raw code                         |
//!
//! Nothing here is fatal: every path logs and returns to the queue.

use core::time::Duration;

use log::warn;

use crate::app::commands::CommandParser;
use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, PeriodPort, SerialPort};
use crate::config::MAX_PATTERN_LEN;
use crate::error::Result;

/// Size of the router's transient read buffer.
pub const RD_BUF_SIZE: usize = 1024;

/// How long a pattern payload/marker read may wait for bytes.
const PATTERN_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// How long a data read may wait. The driver has already buffered the bytes
/// it announced, so this only guards against a misbehaving driver.
const DATA_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Driver notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    /// `size` bytes arrived.
    Data { size: usize },
    /// The hardware FIFO overflowed before the driver could drain it.
    FifoOverflow,
    /// The driver's RX ring buffer is full.
    RingBufferFull,
    /// RX break condition.
    Break,
    ParityError,
    FrameError,
    /// A pattern marker was seen; its position is queued in the driver.
    PatternDetected { size: usize },
    /// Raw driver event type this firmware does not know.
    Unknown(u32),
}

/// What the router did with one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Bytes were parsed and echoed. `requests` counts period requests.
    Echoed { len: usize, requests: usize },
    /// RX was flushed (and the event queue reset on overflow).
    Flushed,
    /// Pattern payload and marker were read back.
    Pattern { payload_len: usize, marker_len: usize },
    /// Logged only.
    Logged,
    /// The driver failed a read; nothing was consumed.
    ReadFailed,
}

/// Single consumer of the serial leaf's event queue.
pub struct StreamEventRouter {
    parser: CommandParser,
    pattern_len: usize,
    buf: [u8; RD_BUF_SIZE],
}

impl StreamEventRouter {
    pub fn new(parser: CommandParser, pattern_len: u8) -> Self {
        Self {
            parser,
            pattern_len: usize::from(pattern_len).min(MAX_PATTERN_LEN),
            buf: [0; RD_BUF_SIZE],
        }
    }

    /// Block on the driver queue forever, routing every event.
    pub fn run<S, P, E>(&mut self, serial: &mut S, timer: &mut P, sink: &mut E) -> !
    where
        S: SerialPort,
        P: PeriodPort,
        E: EventSink,
    {
        loop {
            if let Some(event) = serial.next_event(None) {
                self.handle(event, serial, timer, sink);
            }
        }
    }

    /// Route one event.
    pub fn handle<S, P, E>(
        &mut self,
        event: StreamEvent,
        serial: &mut S,
        timer: &mut P,
        sink: &mut E,
    ) -> RouteOutcome
    where
        S: SerialPort,
        P: PeriodPort,
        E: EventSink,
    {
        match event {
            StreamEvent::Data { size } => self.on_data(size, serial, timer, sink),

            StreamEvent::FifoOverflow | StreamEvent::RingBufferFull => {
                serial.flush_input();
                serial.reset_event_queue();
                sink.emit(&AppEvent::InputFlushed { cause: event });
                RouteOutcome::Flushed
            }

            StreamEvent::Break | StreamEvent::ParityError | StreamEvent::FrameError => {
                sink.emit(&AppEvent::LineError(event));
                RouteOutcome::Logged
            }

            StreamEvent::PatternDetected { .. } => self.on_pattern(serial, sink),

            StreamEvent::Unknown(code) => {
                sink.emit(&AppEvent::UnknownStreamEvent(code));
                RouteOutcome::Logged
            }
        }
    }

    fn on_data<S, P, E>(&mut self, size: usize, serial: &mut S, timer: &mut P, sink: &mut E) -> RouteOutcome
    where
        S: SerialPort,
        P: PeriodPort,
        E: EventSink,
    {
        let want = size.min(RD_BUF_SIZE);
        if want < size {
            warn!("uart: data event of {} bytes truncated to {}", size, want);
        }

        let len = match serial.read_bytes(&mut self.buf[..want], DATA_READ_TIMEOUT) {
            Ok(n) => n,
            Err(e) => {
                warn!("uart: data read failed: {}", e);
                return RouteOutcome::ReadFailed;
            }
        };
        let line = &self.buf[..len];

        let requests = self.parser.handle(line, timer, sink);

        match serial.write_bytes(line) {
            Ok(_) => sink.emit(&AppEvent::DataEchoed { len }),
            Err(e) => warn!("uart: echo failed: {}", e),
        }
        RouteOutcome::Echoed { len, requests }
    }

    fn on_pattern<S, E>(&mut self, serial: &mut S, sink: &mut E) -> RouteOutcome
    where
        S: SerialPort,
        E: EventSink,
    {
        let buffered = serial.buffered_len();
        let Some(pos) = serial.pattern_pop_pos() else {
            // Position queue overflowed; the marker can no longer be located.
            serial.flush_input();
            sink.emit(&AppEvent::PatternLost { buffered });
            return RouteOutcome::Flushed;
        };

        let want = pos.min(RD_BUF_SIZE);
        let payload_len = match serial.read_bytes(&mut self.buf[..want], PATTERN_READ_TIMEOUT) {
            Ok(n) => n,
            Err(e) => {
                warn!("uart: pattern payload read failed: {}", e);
                return RouteOutcome::ReadFailed;
            }
        };

        // Payload longer than the buffer: drop the rest so the marker read
        // starts at the marker.
        if payload_len == want && pos > want {
            warn!("uart: pattern payload of {} bytes truncated to {}", pos, want);
            if let Err(e) = discard(serial, pos - want) {
                warn!("uart: pattern payload drain failed: {}", e);
                return RouteOutcome::ReadFailed;
            }
        }

        let mut marker = [0u8; MAX_PATTERN_LEN];
        let marker_len = match serial.read_bytes(&mut marker[..self.pattern_len], PATTERN_READ_TIMEOUT) {
            Ok(n) => n,
            Err(e) => {
                warn!("uart: pattern marker read failed: {}", e);
                return RouteOutcome::ReadFailed;
            }
        };

        sink.emit(&AppEvent::Pattern {
            pos,
            buffered,
            payload: &self.buf[..payload_len],
            marker: &marker[..marker_len],
        });
        RouteOutcome::Pattern { payload_len, marker_len }
    }
}

/// Read and drop up to `count` bytes.
fn discard<S: SerialPort>(serial: &mut S, mut count: usize) -> Result<()> {
    let mut scratch = [0u8; 64];
    while count > 0 {
        let chunk = count.min(scratch.len());
        let n = serial.read_bytes(&mut scratch[..chunk], PATTERN_READ_TIMEOUT)?;
        if n == 0 {
            break;
        }
        count -= n;
    }
    Ok(())
}
