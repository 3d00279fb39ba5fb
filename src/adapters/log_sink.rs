//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing application events to the ESP-IDF
//! logger (UART0 in production). Payload bytes are printed escaped so a
//! stray control byte cannot garble the console.

use log::{debug, error, info, warn};

use crate::app::events::AppEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AppEvent`] to the serial console.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        match *event {
            AppEvent::Press(class) => {
                info!("press: {} press detected", class.label());
            }
            AppEvent::PeriodChanged { period_ms } => {
                info!("cmd: blink period set to {} ms", period_ms);
            }
            AppEvent::PeriodChangeFailed { period_ms, error } => {
                error!("cmd: failed to set blink period to {} ms: {}", period_ms, error);
            }
            AppEvent::PeriodRejected { value } => {
                warn!("cmd: non-positive period {}, ignored", value);
            }
            AppEvent::PeriodOutOfRange { value } => {
                warn!("cmd: period {} out of range, ignored", value);
            }
            AppEvent::DataEchoed { len } => {
                debug!("uart: echoed {} bytes", len);
            }
            AppEvent::InputFlushed { cause } => {
                warn!("uart: {:?}, input flushed and event queue reset", cause);
            }
            AppEvent::LineError(kind) => {
                warn!("uart: line error {:?}", kind);
            }
            AppEvent::Pattern { pos, buffered, payload, marker } => {
                info!(
                    "uart: pattern at pos {} (buffered {}) | data '{}' | pat '{}'",
                    pos,
                    buffered,
                    payload.escape_ascii(),
                    marker.escape_ascii()
                );
            }
            AppEvent::PatternLost { buffered } => {
                warn!("uart: pattern position lost, flushed {} buffered bytes", buffered);
            }
            AppEvent::UnknownStreamEvent(code) => {
                info!("uart: unhandled event type {}", code);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::stream::StreamEvent;
    use crate::drivers::button::PressClass;
    use crate::error::{Error, TimerError};

    #[test]
    fn every_event_renders() {
        let mut sink = LogEventSink::new();
        let events = [
            AppEvent::Press(PressClass::Long),
            AppEvent::PeriodChanged { period_ms: 250 },
            AppEvent::PeriodChangeFailed { period_ms: 9, error: Error::Timer(TimerError::CommandTimeout) },
            AppEvent::PeriodRejected { value: -1 },
            AppEvent::PeriodOutOfRange { value: i64::MAX },
            AppEvent::DataEchoed { len: 3 },
            AppEvent::InputFlushed { cause: StreamEvent::FifoOverflow },
            AppEvent::LineError(StreamEvent::Break),
            AppEvent::Pattern { pos: 2, buffered: 5, payload: b"\x01a", marker: b"+++" },
            AppEvent::PatternLost { buffered: 0 },
            AppEvent::UnknownStreamEvent(99),
        ];
        for e in &events {
            sink.emit(e);
        }
    }
}
