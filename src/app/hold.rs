//! Press-hold timeout relay.
//!
//! The button ISR cannot talk to the timer service, so it only posts the
//! latest raw edge to a dedicated event group. This task turns a
//! `ButtonDown` into `arm` and a `ButtonUp` into `disarm` on a one-shot
//! timer; the timer's callback reports a hold that outlived it.
//!
//! ```text
//!   ButtonIsr ──replace_bits──▶ edges ──wait_any──▶ HoldRelay ──arm/disarm──▶ hold timer
//! ```

use core::time::Duration;
use std::sync::Arc;

use log::{debug, warn};

use crate::app::ports::HoldTimeout;
use crate::events::{EventBits, EventFlag, EventGroup};

pub struct HoldRelay<T> {
    edges: Arc<EventGroup>,
    timer: T,
    wait: Duration,
}

impl<T: HoldTimeout> HoldRelay<T> {
    pub fn new(edges: Arc<EventGroup>, timer: T, wait: Duration) -> Self {
        Self { edges, timer, wait }
    }

    /// Wait once (`None` = forever) and apply the edge that was posted.
    /// Returns the consumed edge bits.
    pub fn relay_once(&mut self, timeout: Option<Duration>) -> EventBits {
        let edge = self.edges.wait_any(EventBits::EDGES, timeout);
        // The ISR replaces the previous edge, so at most one bit is set.
        if edge.contains(EventFlag::ButtonDown) {
            debug!("press: hold timeout armed");
            if let Err(e) = self.timer.arm(self.wait) {
                warn!("press: hold timeout not armed: {}", e);
            }
        } else if edge.contains(EventFlag::ButtonUp) {
            if let Err(e) = self.timer.disarm(self.wait) {
                warn!("press: hold timeout not cancelled: {}", e);
            }
        }
        edge
    }

    /// Relay task body. Never returns.
    pub fn run(mut self) -> ! {
        loop {
            self.relay_once(None);
        }
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }
}
