//! GPIO / peripheral pin assignments for the ESP32 devkit.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// User button (active-low, BOOT button on most devkits)
// ---------------------------------------------------------------------------

/// Momentary push-button. Interrupt on any edge: LOW = pressed.
pub const BUTTON_GPIO: i32 = 0;

// ---------------------------------------------------------------------------
// Status LED
// ---------------------------------------------------------------------------

/// On-board LED, toggled by the blink timer and by short presses.
pub const LED_GPIO: i32 = 2;

// ---------------------------------------------------------------------------
// UART0 shell (USB bridge)
// ---------------------------------------------------------------------------

pub const UART_TX_GPIO: i32 = 1;
pub const UART_RX_GPIO: i32 = 3;
