//! System configuration parameters
//!
//! All tunable parameters for the blinkshell firmware. Nothing is persisted:
//! the firmware boots with [`SystemConfig::default()`], optionally overridden
//! by a JSON document embedded at build time.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::drivers::task_pin::Core;
use crate::error::{Error, Result};

/// Longest pattern marker the router can read back.
pub const MAX_PATTERN_LEN: usize = 8;

/// Press-duration thresholds (milliseconds, upper bounds inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PressThresholds {
    pub short_max_ms: u32,
    pub normal_max_ms: u32,
    pub long_max_ms: u32,
}

impl Default for PressThresholds {
    fn default() -> Self {
        Self {
            short_max_ms: 1000,
            normal_max_ms: 3000,
            long_max_ms: 5000,
        }
    }
}

/// UART driver and pattern-detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UartConfig {
    pub port: u8,
    pub baud_rate: u32,
    /// Driver RX ring buffer (bytes).
    pub rx_buffer: usize,
    /// Driver TX ring buffer (bytes).
    pub tx_buffer: usize,
    /// Depth of the driver event queue.
    pub event_queue_len: usize,
    /// Byte that makes up the pattern marker.
    pub pattern_char: u8,
    /// Number of consecutive `pattern_char` bytes that form a marker.
    pub pattern_len: u8,
    /// Pattern positions the driver remembers before reporting loss.
    pub pattern_queue_len: usize,
}

impl Default for UartConfig {
    fn default() -> Self {
        Self {
            port: 0,
            baud_rate: 115_200,
            rx_buffer: 2048,
            tx_buffer: 2048,
            event_queue_len: 20,
            pattern_char: b'+',
            pattern_len: 3,
            pattern_queue_len: 20,
        }
    }
}

/// Periodic timer settings. Mutated in place by `period=` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub period_ms: u32,
    pub auto_reload: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            period_ms: 500,
            auto_reload: true,
        }
    }
}

/// Priority and stack of a spawned task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub priority: u8,
    pub stack_kb: usize,
    pub core: Core,
}

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Button ---
    pub press: PressThresholds,

    // --- Serial shell ---
    pub uart: UartConfig,
    /// How long a `period=` request may wait for the timer service.
    pub change_period_wait_ms: u32,

    // --- Blink timer ---
    pub blink_timer: TimerConfig,

    // --- Press-hold timeout (one-shot, armed while the button is down) ---
    pub hold_timer: TimerConfig,

    // --- Tasks ---
    pub dispatcher_task: TaskConfig,
    pub hold_task: TaskConfig,
    pub uart_task: TaskConfig,
    /// Host timer daemon only; ESP-IDF uses the esp_timer task.
    pub timer_task: TaskConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            press: PressThresholds::default(),
            uart: UartConfig::default(),
            change_period_wait_ms: 500,
            blink_timer: TimerConfig::default(),
            hold_timer: TimerConfig { period_ms: 7000, auto_reload: false },
            dispatcher_task: TaskConfig { priority: 4, stack_kb: 8, core: Core::App },
            hold_task: TaskConfig { priority: 4, stack_kb: 4, core: Core::App },
            uart_task: TaskConfig { priority: 12, stack_kb: 8, core: Core::App },
            timer_task: TaskConfig { priority: 1, stack_kb: 4, core: Core::Pro },
        }
    }
}

impl SystemConfig {
    /// Parse a (possibly partial) JSON override. Missing fields keep their
    /// defaults. The result is validated.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(json).map_err(|_| Error::Config("malformed JSON"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Render the active configuration for the boot log.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn change_period_wait(&self) -> Duration {
        Duration::from_millis(u64::from(self.change_period_wait_ms))
    }

    /// Reject values the firmware cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.press;
        if p.short_max_ms == 0 {
            return Err(Error::Config("press.short_max_ms must be > 0"));
        }
        if !(p.short_max_ms < p.normal_max_ms && p.normal_max_ms < p.long_max_ms) {
            return Err(Error::Config("press thresholds must be strictly increasing"));
        }
        if self.blink_timer.period_ms == 0 {
            return Err(Error::Config("blink_timer.period_ms must be > 0"));
        }
        if self.hold_timer.period_ms == 0 {
            return Err(Error::Config("hold_timer.period_ms must be > 0"));
        }
        if self.uart.pattern_len == 0 || usize::from(self.uart.pattern_len) > MAX_PATTERN_LEN {
            return Err(Error::Config("uart.pattern_len out of range"));
        }
        if self.uart.event_queue_len == 0 {
            return Err(Error::Config("uart.event_queue_len must be > 0"));
        }
        Ok(())
    }
}
