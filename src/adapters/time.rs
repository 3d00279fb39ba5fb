//! Tick sources for the button interrupt.
//!
//! - **`target_os = "espidf"`**: [`Esp32Ticks`] reads the FreeRTOS tick
//!   counter with the ISR-safe accessor.
//! - **`not(target_os = "espidf")`**: [`Esp32Ticks`] counts milliseconds
//!   from a `std::time::Instant`, for simulation.
//! - [`ManualTicks`] is set explicitly by tests.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::app::ports::TickSource;

/// Kernel tick counter.
pub struct Esp32Ticks {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32Ticks {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32Ticks {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(target_os = "espidf")]
impl TickSource for Esp32Ticks {
    fn now_ticks(&self) -> u32 {
        // SAFETY: reads the scheduler tick count; callable from ISR and task.
        unsafe { esp_idf_svc::sys::xTaskGetTickCountFromISR() }
    }

    fn tick_period_ms(&self) -> u32 {
        (1000 / esp_idf_svc::sys::configTICK_RATE_HZ).max(1)
    }
}

#[cfg(not(target_os = "espidf"))]
impl TickSource for Esp32Ticks {
    fn now_ticks(&self) -> u32 {
        // Wraps like the kernel counter does.
        self.start.elapsed().as_millis() as u32
    }

    fn tick_period_ms(&self) -> u32 {
        1
    }
}

/// Tick counter driven by hand.
pub struct ManualTicks {
    now: AtomicU32,
    period_ms: u32,
}

impl ManualTicks {
    pub fn new(period_ms: u32) -> Self {
        Self { now: AtomicU32::new(0), period_ms }
    }

    pub fn set(&self, tick: u32) {
        self.now.store(tick, Ordering::Relaxed);
    }

    /// Move forward by `ms`, rounded down to whole ticks.
    pub fn advance_ms(&self, ms: u32) {
        let ticks = ms / self.period_ms.max(1);
        self.now.fetch_add(ticks, Ordering::Relaxed);
    }
}

impl TickSource for ManualTicks {
    fn now_ticks(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }

    fn tick_period_ms(&self) -> u32 {
        self.period_ms
    }
}
