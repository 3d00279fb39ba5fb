//! Fuzz target: `CommandParser::handle`
//!
//! Drives arbitrary received bytes through the `period=` parser and asserts
//! that it never panics, never requests a zero period and issues at most
//! one request per candidate token.
//!
//! cargo fuzz run fuzz_command_parser

#![no_main]

use core::time::Duration;

use blinkshell::app::commands::{period_tokens, CommandParser, PeriodToken};
use blinkshell::app::events::AppEvent;
use blinkshell::app::ports::{EventSink, PeriodPort};
use blinkshell::error::Result;
use libfuzzer_sys::fuzz_target;

struct Count(usize);

impl PeriodPort for Count {
    fn change_period(&mut self, period_ms: u32, _wait: Duration) -> Result<()> {
        assert!(period_ms > 0, "zero period reached the timer");
        self.0 += 1;
        Ok(())
    }
}

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AppEvent<'_>) {}
}

fuzz_target!(|data: &[u8]| {
    let mut timer = Count(0);
    let issued = CommandParser::new(Duration::from_millis(500)).handle(data, &mut timer, &mut Discard);
    assert_eq!(issued, timer.0);

    let valid = period_tokens(data)
        .filter(|t| matches!(t, PeriodToken::Period(_)))
        .count();
    assert_eq!(issued, valid);
});
