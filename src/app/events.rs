//! Outbound application events.
//!
//! The router, the command parser and the press handler emit these through
//! the [`EventSink`](super::ports::EventSink) port. Adapters on the other
//! side decide what to do with them; in production they go to the log.

use crate::app::stream::StreamEvent;
use crate::drivers::button::PressClass;
use crate::error::Error;

/// Structured events emitted by the application logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent<'a> {
    /// A classified press reached the dispatcher.
    Press(PressClass),

    /// A `period=` request was accepted by the timer service.
    PeriodChanged { period_ms: u32 },

    /// A `period=` request could not be delivered.
    PeriodChangeFailed { period_ms: u32, error: Error },

    /// A `period=` value was zero or negative.
    PeriodRejected { value: i64 },

    /// A `period=` value does not fit the timer's period type.
    PeriodOutOfRange { value: i64 },

    /// Received bytes were written back to the stream.
    DataEchoed { len: usize },

    /// The RX buffer was discarded. `cause` is the event that forced it.
    InputFlushed { cause: StreamEvent },

    /// Break, parity or framing error on the line.
    LineError(StreamEvent),

    /// A pattern marker was read back together with the payload before it.
    Pattern {
        pos: usize,
        buffered: usize,
        payload: &'a [u8],
        marker: &'a [u8],
    },

    /// A pattern event arrived but its position had already been dropped.
    PatternLost { buffered: usize },

    /// The driver reported an event type this firmware does not know.
    UnknownStreamEvent(u32),
}
