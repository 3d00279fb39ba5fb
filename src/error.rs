//! Unified error types for the blinkshell firmware.
//!
//! A single `Error` enum that every subsystem converts into. All variants are
//! `Copy` so they can cross the timer service and task boundaries without
//! allocation.
//!
//! Only task-context code returns these. Interrupt handlers never fail: they
//! finish their bounded work or drop the event.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level firmware error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A resource could not be created at startup. Always fatal.
    Init(InitError),
    /// A timer-service request failed. Recoverable.
    Timer(TimerError),
    /// The serial leaf reported a failure. Recoverable.
    Serial(SerialError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init(e) => write!(f, "init: {e}"),
            Self::Timer(e) => write!(f, "timer: {e}"),
            Self::Serial(e) => write!(f, "serial: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Initialisation errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A platform timer could not be created (ESP-IDF return code).
    TimerService(i32),
    /// A worker task could not be spawned.
    TaskSpawn(&'static str),
    /// GPIO configuration failed (ESP-IDF return code).
    Gpio(i32),
    /// GPIO ISR service install or handler registration failed.
    IsrService(i32),
    /// UART driver install or configuration failed.
    Uart(i32),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TimerService(rc) => write!(f, "timer creation failed (rc={rc})"),
            Self::TaskSpawn(name) => write!(f, "task '{name}' could not be spawned"),
            Self::Gpio(rc) => write!(f, "GPIO config failed (rc={rc})"),
            Self::IsrService(rc) => write!(f, "GPIO ISR service failed (rc={rc})"),
            Self::Uart(rc) => write!(f, "UART driver failed (rc={rc})"),
        }
    }
}

impl From<InitError> for Error {
    fn from(e: InitError) -> Self {
        Self::Init(e)
    }
}

// ---------------------------------------------------------------------------
// Timer errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The command could not be delivered within the caller's wait budget.
    CommandTimeout,
    /// A period of zero was requested.
    ZeroPeriod,
    /// The timer service has shut down.
    ServiceStopped,
    /// The platform timer refused the command (ESP-IDF return code).
    Rejected(i32),
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandTimeout => write!(f, "command not delivered in time"),
            Self::ZeroPeriod => write!(f, "period must be greater than zero"),
            Self::ServiceStopped => write!(f, "timer service stopped"),
            Self::Rejected(rc) => write!(f, "command rejected (rc={rc})"),
        }
    }
}

impl From<TimerError> for Error {
    fn from(e: TimerError) -> Self {
        Self::Timer(e)
    }
}

// ---------------------------------------------------------------------------
// Serial errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// A driver read returned an error code.
    ReadFailed(i32),
    /// A driver write returned an error code.
    WriteFailed(i32),
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed(rc) => write!(f, "read failed (rc={rc})"),
            Self::WriteFailed(rc) => write!(f, "write failed (rc={rc})"),
        }
    }
}

impl From<SerialError> for Error {
    fn from(e: SerialError) -> Self {
        Self::Serial(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Firmware-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_subsystem_prefix() {
        let e: Error = TimerError::CommandTimeout.into();
        assert_eq!(e.to_string(), "timer: command not delivered in time");

        let e: Error = InitError::TaskSpawn("dispatcher").into();
        assert_eq!(e.to_string(), "init: task 'dispatcher' could not be spawned");

        let e: Error = InitError::TimerService(-1).into();
        assert_eq!(e.to_string(), "init: timer creation failed (rc=-1)");
    }

    #[test]
    fn errors_convert_into_anyhow() {
        let e: anyhow::Error = Error::Config("bad").into();
        assert_eq!(e.to_string(), "config: bad");
    }
}
