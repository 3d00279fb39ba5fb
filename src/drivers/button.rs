//! ISR-driven press-duration classifier.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up. The GPIO interrupt fires on
//! both edges; the ISR reads the pin level and the tick counter and feeds
//! them to [`PressClassifier::on_edge`].
//!
//! ## Classification
//!
//! | Class    | Hold duration `d` (default thresholds) | Flag          |
//! |----------|----------------------------------------|---------------|
//! | `Short`  | 0 < d ≤ 1000 ms                        | `ShortPress`  |
//! | `Normal` | 1000 < d ≤ 3000 ms                     | `NormalPress` |
//! | `Long`   | 3000 < d ≤ 5000 ms                     | `LongPress`   |
//! | `None`   | anything else                          | —             |
//!
//! A release without a preceding press (bounce, duplicate interrupt) is
//! ignored. Everything here is atomics only: no locks, no allocation.
//!
//! When an edge signal is attached, [`ButtonIsr`] also posts the raw edge
//! (`ButtonDown`/`ButtonUp`) there for the hold-timeout relay.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::app::ports::TickSource;
use crate::config::PressThresholds;
use crate::events::{EventBits, EventFlag, EventGroup};

/// Press classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressClass {
    None,
    Short,
    Normal,
    Long,
}

impl PressClass {
    /// Classify a hold duration in milliseconds.
    pub fn from_duration_ms(ms: u64, t: &PressThresholds) -> Self {
        match ms {
            0 => Self::None,
            d if d <= u64::from(t.short_max_ms) => Self::Short,
            d if d <= u64::from(t.normal_max_ms) => Self::Normal,
            d if d <= u64::from(t.long_max_ms) => Self::Long,
            _ => Self::None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Short => "short",
            Self::Normal => "normal",
            Self::Long => "long",
        }
    }

    /// Event flag posted for this class, if any.
    pub const fn flag(self) -> Option<EventFlag> {
        match self {
            Self::None => None,
            Self::Short => Some(EventFlag::ShortPress),
            Self::Normal => Some(EventFlag::NormalPress),
            Self::Long => Some(EventFlag::LongPress),
        }
    }
}

impl From<EventFlag> for PressClass {
    fn from(flag: EventFlag) -> Self {
        match flag {
            EventFlag::ShortPress => Self::Short,
            EventFlag::NormalPress => Self::Normal,
            EventFlag::LongPress => Self::Long,
            EventFlag::ButtonDown | EventFlag::ButtonUp => Self::None,
        }
    }
}

/// Hold duration between two ticks, in milliseconds.
///
/// `None` when the counter wrapped between press and release.
pub fn press_duration_ms(pressed_at: u32, released_at: u32, tick_period_ms: u32) -> Option<u64> {
    let ticks = released_at.checked_sub(pressed_at)?;
    Some(u64::from(ticks) * u64::from(tick_period_ms))
}

/// Single-button press classifier.
pub struct PressClassifier {
    thresholds: PressThresholds,
    tick_period_ms: u32,
    armed: AtomicBool,
    pressed_at: AtomicU32,
}

impl PressClassifier {
    pub fn new(thresholds: PressThresholds, tick_period_ms: u32) -> Self {
        Self {
            thresholds,
            tick_period_ms,
            armed: AtomicBool::new(false),
            pressed_at: AtomicU32::new(0),
        }
    }

    /// Button went down. Replaces any earlier unreleased press.
    pub fn on_press(&self, tick: u32) {
        self.pressed_at.store(tick, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    /// Button came up. Classifies, disarms and posts the flag.
    pub fn on_release(&self, tick: u32, bus: &EventGroup) -> PressClass {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return PressClass::None;
        }
        let pressed_at = self.pressed_at.load(Ordering::Relaxed);

        let class = press_duration_ms(pressed_at, tick, self.tick_period_ms)
            .map_or(PressClass::None, |d| PressClass::from_duration_ms(d, &self.thresholds));

        if let Some(flag) = class.flag() {
            bus.set_bits(flag.into());
        }
        class
    }

    /// ISR entry point. `level_high` is the pin level after the edge:
    /// low means pressed.
    pub fn on_edge(&self, level_high: bool, tick: u32, bus: &EventGroup) -> PressClass {
        if level_high {
            self.on_release(tick, bus)
        } else {
            self.on_press(tick);
            PressClass::None
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

/// Everything the button interrupt needs, bundled so it can travel through
/// the ISR argument pointer.
pub struct ButtonIsr<T> {
    classifier: PressClassifier,
    ticks: T,
    bus: Arc<EventGroup>,
    edges: Option<Arc<EventGroup>>,
}

impl<T: TickSource> ButtonIsr<T> {
    pub fn new(thresholds: PressThresholds, ticks: T, bus: Arc<EventGroup>) -> Self {
        Self {
            classifier: PressClassifier::new(thresholds, ticks.tick_period_ms()),
            ticks,
            bus,
            edges: None,
        }
    }

    /// Also post every raw edge to `edges`, replacing the previous one.
    pub fn with_edge_signal(mut self, edges: Arc<EventGroup>) -> Self {
        self.edges = Some(edges);
        self
    }

    /// Called from the GPIO interrupt with the current pin level.
    pub fn on_interrupt(&self, level_high: bool) -> PressClass {
        let tick = self.ticks.now_ticks();
        if let Some(edges) = &self.edges {
            let edge = if level_high { EventFlag::ButtonUp } else { EventFlag::ButtonDown };
            edges.replace_bits(EventBits::EDGES, edge.into());
        }
        self.classifier.on_edge(level_high, tick, &self.bus)
    }

    pub fn classifier(&self) -> &PressClassifier {
        &self.classifier
    }
}
