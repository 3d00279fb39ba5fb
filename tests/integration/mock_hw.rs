//! Mock adapters for integration tests.
//!
//! Record every call crossing a port so tests can assert on the full
//! history without touching real GPIO or UART registers.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use blinkshell::app::events::AppEvent;
use blinkshell::app::ports::{EventSink, PeriodPort, PressHandler};
use blinkshell::drivers::button::PressClass;
use blinkshell::error::{Result, TimerError};

// ── Event sink ────────────────────────────────────────────────

/// Records the `Debug` rendering of every event. Clones share the log, so
/// one copy can move into a task while the test keeps the other.
#[derive(Clone, Default)]
pub struct RecordingSink {
    log: Arc<Mutex<Vec<String>>>,
}

#[allow(dead_code)]
impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count_matching(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AppEvent<'_>) {
        self.log.lock().unwrap().push(format!("{event:?}"));
    }
}

// ── Period port ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCall {
    pub period_ms: u32,
    pub wait: Duration,
}

/// Records change requests; optionally fails every one of them.
#[derive(Default)]
pub struct MockTimer {
    pub calls: Vec<PeriodCall>,
    pub fail_with: Option<TimerError>,
}

#[allow(dead_code)]
impl MockTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(err: TimerError) -> Self {
        Self { calls: Vec::new(), fail_with: Some(err) }
    }

    pub fn periods(&self) -> Vec<u32> {
        self.calls.iter().map(|c| c.period_ms).collect()
    }
}

impl PeriodPort for MockTimer {
    fn change_period(&mut self, period_ms: u32, wait: Duration) -> Result<()> {
        self.calls.push(PeriodCall { period_ms, wait });
        match self.fail_with {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

// ── Press handler ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingHandler {
    pub presses: Vec<PressClass>,
}

impl PressHandler for RecordingHandler {
    fn on_press(&mut self, class: PressClass) {
        self.presses.push(class);
    }
}
