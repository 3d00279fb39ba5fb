//! Single status LED.
//!
//! ## Dual-target design
//!
//! Generic over an `embedded-hal` stateful output pin: on ESP-IDF that is a
//! `PinDriver<Output>` on GPIO 2, on host/test an in-memory mock.
//!
//! The blink timer and the short-press handler both toggle it, so it is
//! shared as a [`SharedLed`].

use std::sync::{Arc, Mutex};

use embedded_hal::digital::StatefulOutputPin;

/// LED shared between the tasks that drive it.
pub type SharedLed<P> = Arc<Mutex<StatusLed<P>>>;

pub struct StatusLed<P> {
    pin: P,
    toggles: u32,
}

impl<P: StatefulOutputPin> StatusLed<P> {
    pub fn new(pin: P) -> Self {
        Self { pin, toggles: 0 }
    }

    /// Invert the LED. Returns the new level (`true` = lit).
    pub fn toggle(&mut self) -> Result<bool, P::Error> {
        self.pin.toggle()?;
        self.toggles = self.toggles.wrapping_add(1);
        self.pin.is_set_high()
    }

    pub fn set(&mut self, on: bool) -> Result<(), P::Error> {
        if on { self.pin.set_high() } else { self.pin.set_low() }
    }

    pub fn is_on(&mut self) -> Result<bool, P::Error> {
        self.pin.is_set_high()
    }

    /// Successful toggles since construction.
    pub fn toggles(&self) -> u32 {
        self.toggles
    }

    pub fn into_shared(self) -> SharedLed<P> {
        Arc::new(Mutex::new(self))
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockPin;
    use super::*;

    #[test]
    fn toggle_alternates_level() {
        let mut led = StatusLed::new(MockPin::default());
        assert_eq!(led.toggle(), Ok(true));
        assert_eq!(led.toggle(), Ok(false));
        assert_eq!(led.toggle(), Ok(true));
        assert_eq!(led.toggles(), 3);
    }

    #[test]
    fn set_forces_level() {
        let mut led = StatusLed::new(MockPin::default());
        led.set(true).unwrap();
        assert_eq!(led.is_on(), Ok(true));
        led.set(false).unwrap();
        assert_eq!(led.is_on(), Ok(false));
        assert_eq!(led.toggles(), 0);
    }

    #[test]
    fn shared_led_sees_toggles_from_every_owner() {
        let led = StatusLed::new(MockPin::default()).into_shared();
        let other = Arc::clone(&led);
        other.lock().unwrap().toggle().unwrap();
        assert_eq!(led.lock().unwrap().is_on(), Ok(true));
        assert_eq!(led.lock().unwrap().toggles(), 1);
    }
}
