//! Port traits: the boundary between the application logic and the leaves.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ router / parser / dispatcher
//! ```
//!
//! The serial driver, the tick counter and the timer service implement
//! these traits. The application modules consume them via generics, so
//! everything above the leaves runs on the host against mocks.

use core::time::Duration;

use crate::app::events::AppEvent;
use crate::app::stream::StreamEvent;
use crate::drivers::button::PressClass;
use crate::error::Result;

// ───────────────────────────────────────────────────────────────
// Edge timestamp source (leaf, interrupt context)
// ───────────────────────────────────────────────────────────────

/// Monotonic tick counter read from inside the edge interrupt.
///
/// Implementations must be non-blocking and allocation-free.
pub trait TickSource {
    /// Current tick count. Wraps at `u32::MAX`.
    fn now_ticks(&self) -> u32;

    /// Milliseconds per tick.
    fn tick_period_ms(&self) -> u32;
}

impl<T: TickSource + ?Sized> TickSource for &T {
    fn now_ticks(&self) -> u32 {
        (**self).now_ticks()
    }

    fn tick_period_ms(&self) -> u32 {
        (**self).tick_period_ms()
    }
}

// ───────────────────────────────────────────────────────────────
// Serial port (leaf: UART driver with event queue)
// ───────────────────────────────────────────────────────────────

/// Byte stream with a bounded driver event queue.
pub trait SerialPort {
    /// Wait for the next driver event. `None` on timeout.
    fn next_event(&mut self, timeout: Option<Duration>) -> Option<StreamEvent>;

    /// Read up to `buf.len()` buffered bytes, waiting at most `timeout`.
    /// Returns the number of bytes written to `buf`.
    fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Queue bytes for transmission.
    fn write_bytes(&mut self, data: &[u8]) -> Result<usize>;

    /// Discard everything in the driver's RX buffer.
    fn flush_input(&mut self);

    /// Drop every pending driver event.
    fn reset_event_queue(&mut self);

    /// Pop the oldest recorded pattern position. `None` when the position
    /// queue overflowed and the position was lost.
    fn pattern_pop_pos(&mut self) -> Option<usize>;

    /// Bytes currently held in the RX buffer.
    fn buffered_len(&self) -> usize;
}

// ───────────────────────────────────────────────────────────────
// Timer control (domain → timer service)
// ───────────────────────────────────────────────────────────────

/// Something whose period can be changed at runtime.
pub trait PeriodPort {
    /// Request a new period and restart the countdown. Must not block
    /// longer than `wait`.
    fn change_period(&mut self, period_ms: u32, wait: Duration) -> Result<()>;
}

/// One-shot timeout armed while the button is held.
pub trait HoldTimeout {
    /// Start (or restart) the countdown.
    fn arm(&mut self, wait: Duration) -> Result<()>;

    /// Cancel the countdown. Harmless when it is not running.
    fn disarm(&mut self, wait: Duration) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Event sink (domain → logging)
// ───────────────────────────────────────────────────────────────

/// The application emits structured [`AppEvent`]s through this port.
/// Adapters decide where they go.
pub trait EventSink {
    fn emit(&mut self, event: &AppEvent<'_>);
}

// ───────────────────────────────────────────────────────────────
// Press handler (dispatcher → application action)
// ───────────────────────────────────────────────────────────────

/// Action bound to each classified press.
pub trait PressHandler {
    fn on_press(&mut self, class: PressClass);
}
