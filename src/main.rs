//! blinkshell firmware: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │  UartAdapter (SerialPort)  Esp32Ticks (TickSource)           │
//! │  LogEventSink (EventSink)  StatusLed (GPIO 2)                │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ───────────────────    │
//! │                                                              │
//! │   ButtonIsr ─▶ EventGroup ─▶ ConsumerDispatcher ─▶ LED       │
//! │   ButtonIsr ─▶ edges ─▶ HoldRelay ─▶ hold PeriodicTimer      │
//! │   StreamEventRouter ─▶ CommandParser ─▶ blink PeriodicTimer  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::sync::{Arc, PoisonError};

use anyhow::Result;
use esp_idf_svc::hal::gpio::PinDriver;
use esp_idf_svc::hal::peripherals::Peripherals;
use log::{info, warn};

use blinkshell::adapters::log_sink::LogEventSink;
use blinkshell::adapters::time::Esp32Ticks;
use blinkshell::adapters::uart::UartAdapter;
use blinkshell::app::context::AppContext;
use blinkshell::app::dispatcher::LedPressHandler;
use blinkshell::config::SystemConfig;
use blinkshell::drivers::button::ButtonIsr;
use blinkshell::drivers::hw_init;
use blinkshell::drivers::status_led::StatusLed;
use blinkshell::pins;

/// Optional JSON override baked in at build time.
const CONFIG_OVERRIDE: Option<&str> = option_env!("BLINKSHELL_CONFIG_JSON");

fn boot_config() -> Result<SystemConfig> {
    match CONFIG_OVERRIDE {
        Some(json) => Ok(SystemConfig::from_json(json)?),
        None => Ok(SystemConfig::default()),
    }
}

fn main() -> Result<()> {
    // ── 1. ESP-IDF bootstrap ──────────────────────────────────
    esp_idf_svc::sys::link_patches();
    esp_idf_logger::init()?;

    info!("blinkshell v{}", env!("CARGO_PKG_VERSION"));

    let config = boot_config()?;
    info!("config: {}", config.to_json());

    // ── 2. LED + timers ───────────────────────────────────────
    let peripherals = Peripherals::take()?;
    let led = StatusLed::new(PinDriver::output(peripherals.pins.gpio2)?).into_shared();
    led.lock().unwrap_or_else(PoisonError::into_inner).set(false)?;
    info!("boot: status LED on GPIO{}", pins::LED_GPIO);

    let blink_led = Arc::clone(&led);
    let ctx = AppContext::init(config, move |expiry| {
        let mut led = blink_led.lock().unwrap_or_else(PoisonError::into_inner);
        match led.toggle() {
            Ok(on) => info!("timer: Blink LED ({}) #{}", if on { "on" } else { "off" }, expiry.count),
            Err(e) => warn!("timer: LED toggle failed: {}", e),
        }
    })?;

    // ── 3. Button interrupt ───────────────────────────────────
    hw_init::init_button_input()?;
    let isr: &'static ButtonIsr<Esp32Ticks> = Box::leak(Box::new(ctx.button_isr(Esp32Ticks::new())));
    hw_init::init_isr_service(isr)?;

    // ── 4. Serial shell ───────────────────────────────────────
    let uart = UartAdapter::install(&ctx.config().uart)?;

    // ── 5. Tasks ──────────────────────────────────────────────
    let _dispatcher = ctx.spawn_dispatcher(LedPressHandler::new(LogEventSink::new(), led))?;
    let _hold = ctx.spawn_hold_relay()?;
    let _stream = ctx.spawn_stream_task(uart, LogEventSink::new())?;

    info!("boot: ready, send 'period=<ms>' to change the blink rate");

    // `ctx` owns the timer service; keep it alive.
    loop {
        std::thread::park();
    }
}
