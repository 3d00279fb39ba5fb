//! `period=<N>` shell command.
//!
//! The only command the serial shell understands. Everything runs on the
//! explicit-length slice handed over by the stream router; a missing line
//! terminator is never an issue.
//!
//! Parsing is permissive: every numeric token after the `=`
//! issues its own change request, so `period=100 200` asks for 100 ms and
//! then 200 ms, and the last accepted request wins.

use core::time::Duration;

use log::debug;

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, PeriodPort};

/// Marker that makes a line a period command.
pub const PERIOD_DIRECTIVE: &[u8] = b"period=";

/// Keyword skipped when scanning tokens for values.
const PERIOD_KEYWORD: &[u8] = b"period";

/// One candidate value found in a command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodToken<'a> {
    /// A usable period in milliseconds.
    Period(u32),
    /// Zero or negative.
    NonPositive(i64),
    /// Positive but larger than `u32::MAX`.
    OutOfRange(i64),
    /// Not a decimal integer.
    Invalid(&'a [u8]),
}

/// Split a received line into period candidates.
///
/// Yields nothing unless the line contains `period=`. The line is split once
/// on `=`; the head and each whitespace-separated word of the remainder is a
/// candidate unless it contains `period`.
pub fn period_tokens(line: &[u8]) -> impl Iterator<Item = PeriodToken<'_>> {
    let (head, rest): (&[u8], &[u8]) = if contains(line, PERIOD_DIRECTIVE) {
        match line.iter().position(|&b| b == b'=') {
            Some(eq) => (&line[..eq], &line[eq + 1..]),
            None => (&[], &[]),
        }
    } else {
        (&[], &[])
    };

    core::iter::once(head)
        .chain(rest.split(u8::is_ascii_whitespace))
        .filter(|tok| !tok.is_empty() && !contains(tok, PERIOD_KEYWORD))
        .map(classify)
}

fn classify(tok: &[u8]) -> PeriodToken<'_> {
    let Ok(text) = core::str::from_utf8(tok) else {
        return PeriodToken::Invalid(tok);
    };
    match text.trim().parse::<i64>() {
        Ok(v) if v <= 0 => PeriodToken::NonPositive(v),
        Ok(v) => u32::try_from(v).map_or(PeriodToken::OutOfRange(v), PeriodToken::Period),
        Err(_) => PeriodToken::Invalid(tok),
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// Turns received lines into timer period requests.
#[derive(Debug, Clone, Copy)]
pub struct CommandParser {
    wait: Duration,
}

impl CommandParser {
    /// `wait` bounds how long each request may block on the timer service.
    pub fn new(wait: Duration) -> Self {
        Self { wait }
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Scan `line` and issue one change request per valid value.
    /// Returns the number of requests issued, successful or not.
    pub fn handle<P: PeriodPort, E: EventSink>(
        &self,
        line: &[u8],
        timer: &mut P,
        sink: &mut E,
    ) -> usize {
        let mut issued = 0;
        for token in period_tokens(line) {
            match token {
                PeriodToken::Period(period_ms) => {
                    issued += 1;
                    match timer.change_period(period_ms, self.wait) {
                        Ok(()) => sink.emit(&AppEvent::PeriodChanged { period_ms }),
                        Err(error) => sink.emit(&AppEvent::PeriodChangeFailed { period_ms, error }),
                    }
                }
                PeriodToken::NonPositive(value) => sink.emit(&AppEvent::PeriodRejected { value }),
                PeriodToken::OutOfRange(value) => sink.emit(&AppEvent::PeriodOutOfRange { value }),
                PeriodToken::Invalid(tok) => debug!("cmd: ignoring token '{}'", tok.escape_ascii()),
            }
        }
        issued
    }
}
