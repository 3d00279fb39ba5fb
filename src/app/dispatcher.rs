//! Press consumer task.
//!
//! Blocks on the event group and hands every matched press flag to a
//! [`PressHandler`]. Flags are handled in ascending bit order, so a short
//! and a long press consumed by the same wake-up are seen short first.

use core::time::Duration;
use std::sync::{Arc, PoisonError};

use embedded_hal::digital::StatefulOutputPin;
use log::{debug, warn};

use crate::app::events::AppEvent;
use crate::app::ports::{EventSink, PressHandler};
use crate::drivers::button::PressClass;
use crate::drivers::status_led::SharedLed;
use crate::events::{EventBits, EventGroup};

pub struct ConsumerDispatcher<H> {
    bus: Arc<EventGroup>,
    handler: H,
}

impl<H: PressHandler> ConsumerDispatcher<H> {
    pub fn new(bus: Arc<EventGroup>, handler: H) -> Self {
        Self { bus, handler }
    }

    /// Wait once (`None` = forever) and dispatch whatever was matched.
    pub fn dispatch_once(&mut self, timeout: Option<Duration>) -> EventBits {
        let matched = self.bus.wait_any(EventBits::PRESSES, timeout);
        for flag in matched.flags() {
            self.handler.on_press(PressClass::from(flag));
        }
        matched
    }

    /// Dispatcher task body. Never returns.
    pub fn run(mut self) -> ! {
        loop {
            self.dispatch_once(None);
        }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

/// Reports every press through the event sink.
pub struct LogPressHandler<E> {
    sink: E,
}

impl<E: EventSink> LogPressHandler<E> {
    pub fn new(sink: E) -> Self {
        Self { sink }
    }
}

impl<E: EventSink> PressHandler for LogPressHandler<E> {
    fn on_press(&mut self, class: PressClass) {
        self.sink.emit(&AppEvent::Press(class));
    }
}

/// Production handler: reports every press and toggles the status LED on
/// a short one.
pub struct LedPressHandler<E, P> {
    log: LogPressHandler<E>,
    led: SharedLed<P>,
}

impl<E: EventSink, P: StatefulOutputPin> LedPressHandler<E, P> {
    pub fn new(sink: E, led: SharedLed<P>) -> Self {
        Self { log: LogPressHandler::new(sink), led }
    }
}

impl<E: EventSink, P: StatefulOutputPin> PressHandler for LedPressHandler<E, P> {
    fn on_press(&mut self, class: PressClass) {
        self.log.on_press(class);
        if class != PressClass::Short {
            return;
        }
        let mut led = self.led.lock().unwrap_or_else(PoisonError::into_inner);
        match led.toggle() {
            Ok(on) => debug!("press: LED {}", if on { "on" } else { "off" }),
            Err(e) => warn!("press: LED toggle failed: {:?}", e),
        }
    }
}
