//! Interrupt-to-task event flags.
//!
//! The button ISR classifies a press and sets one flag; the dispatcher task
//! blocks until any flag it cares about is set, then consumes exactly the
//! flags it matched.
//!
//! ```text
//! ┌─────────────┐ set_bits ┌──────────────┐ wait_any ┌──────────────┐
//! │ Button ISR  │─────────▶│  EventGroup  │─────────▶│  Dispatcher  │
//! │ (classify)  │          │ (AtomicU32)  │          │  (consumer)  │
//! └─────────────┘          └──────────────┘          └──────────────┘
//! ```
//!
//! Flags persist until a waiter consumes them, so nothing is lost while no
//! task is waiting. Setting a flag that is already set coalesces.
//!
//! The raw button edges (`ButtonDown`/`ButtonUp`) travel on a second group
//! of their own, read by the hold-timeout relay. Only the latest edge is
//! kept there ([`EventGroup::replace_bits`]).

use core::fmt;
use core::ops::BitOr;
use core::sync::atomic::{AtomicU32, Ordering};
use core::time::Duration;
use std::time::Instant;

/// Named event bits. Bit identities are fixed and never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EventFlag {
    ShortPress  = 1 << 0,
    NormalPress = 1 << 1,
    LongPress   = 1 << 2,
    ButtonDown  = 1 << 3,
    ButtonUp    = 1 << 4,
}

impl EventFlag {
    /// Every flag, in ascending bit order.
    pub const ALL: [EventFlag; 5] = [
        Self::ShortPress,
        Self::NormalPress,
        Self::LongPress,
        Self::ButtonDown,
        Self::ButtonUp,
    ];

    /// Classified-press flags, in ascending bit order.
    pub const PRESSES: [EventFlag; 3] = [Self::ShortPress, Self::NormalPress, Self::LongPress];

    /// Return the bitmask for this flag.
    pub const fn mask(self) -> u32 {
        self as u32
    }
}

/// A set of [`EventFlag`]s.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct EventBits(u32);

impl EventBits {
    pub const EMPTY: Self = Self(0);
    pub const PRESSES: Self = Self(
        EventFlag::ShortPress.mask() | EventFlag::NormalPress.mask() | EventFlag::LongPress.mask(),
    );
    pub const EDGES: Self = Self(EventFlag::ButtonDown.mask() | EventFlag::ButtonUp.mask());
    pub const ALL: Self = Self(Self::PRESSES.0 | Self::EDGES.0);

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, flag: EventFlag) -> bool {
        self.0 & flag.mask() != 0
    }

    /// Flags present in this set, in ascending bit order.
    pub fn flags(self) -> impl Iterator<Item = EventFlag> {
        EventFlag::ALL.into_iter().filter(move |f| self.contains(*f))
    }
}

impl From<EventFlag> for EventBits {
    fn from(flag: EventFlag) -> Self {
        Self(flag.mask())
    }
}

impl BitOr for EventBits {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOr for EventFlag {
    type Output = EventBits;
    fn bitor(self, rhs: Self) -> EventBits {
        EventBits(self.mask() | rhs.mask())
    }
}

impl BitOr<EventFlag> for EventBits {
    type Output = Self;
    fn bitor(self, rhs: EventFlag) -> Self {
        Self(self.0 | rhs.mask())
    }
}

impl fmt::Debug for EventBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.flags()).finish()
    }
}

// ── Event group ───────────────────────────────────────────────

/// Shared event-flag word with a blocking wait.
///
/// `set_bits` is lock-free and allocation-free and may be called from
/// interrupt context. `wait_any` must only be called from task context.
pub struct EventGroup {
    bits: AtomicU32,
    waker: waker::Waker,
}

impl Default for EventGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl EventGroup {
    pub fn new() -> Self {
        Self {
            bits: AtomicU32::new(0),
            waker: waker::Waker::new(),
        }
    }

    /// OR `mask` into the group and wake the waiter. Returns the bits as
    /// they were right after the update.
    pub fn set_bits(&self, mask: EventBits) -> EventBits {
        let prev = self.bits.fetch_or(mask.0, Ordering::AcqRel);
        self.waker.wake();
        EventBits(prev | mask.0)
    }

    /// Atomically clear `clear`, then OR in `set`, and wake the waiter.
    /// Lock-free; may be called from interrupt context.
    pub fn replace_bits(&self, clear: EventBits, set: EventBits) -> EventBits {
        let mut prev = self.bits.load(Ordering::Relaxed);
        loop {
            let next = (prev & !clear.0) | set.0;
            match self.bits.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => {
                    self.waker.wake();
                    return EventBits(next);
                }
                Err(actual) => prev = actual,
            }
        }
    }

    /// Block until any bit in `mask` is set, or `timeout` elapses
    /// (`None` waits forever).
    ///
    /// On success returns the bits that were both set and requested, and
    /// clears exactly those. Bits outside `mask` are left for other
    /// waiters. Returns [`EventBits::EMPTY`] on timeout.
    pub fn wait_any(&self, mask: EventBits, timeout: Option<Duration>) -> EventBits {
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            let matched = self.take(mask);
            if !matched.is_empty() {
                return matched;
            }

            let remaining = match deadline {
                None => None,
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return EventBits::EMPTY;
                    }
                    Some(d - now)
                }
            };

            self.waker
                .park(remaining, || self.bits.load(Ordering::Acquire) & mask.0 != 0);
        }
    }

    /// Current bits, without consuming them.
    pub fn peek(&self) -> EventBits {
        EventBits(self.bits.load(Ordering::Acquire))
    }

    /// Atomically clear the requested bits and report which were set.
    fn take(&self, mask: EventBits) -> EventBits {
        let prev = self.bits.fetch_and(!mask.0, Ordering::AcqRel);
        EventBits(prev & mask.0)
    }
}

// ── Waiter wake-up ────────────────────────────────────────────

/// ESP-IDF: FreeRTOS direct-to-task notification. The waiting task records
/// its handle; `wake` notifies it with the ISR-safe variant when called from
/// interrupt context. Notifications latch, so a wake that races ahead of
/// `park` is not lost. One waiting task is supported.
#[cfg(target_os = "espidf")]
mod waker {
    use core::num::NonZeroU32;
    use core::ptr;
    use core::sync::atomic::{AtomicPtr, Ordering};
    use core::time::Duration;

    use esp_idf_svc::hal::delay::{TickType, BLOCK};
    use esp_idf_svc::hal::task;
    use esp_idf_svc::sys::tskTaskControlBlock;

    pub(super) struct Waker {
        task: AtomicPtr<tskTaskControlBlock>,
    }

    impl Waker {
        pub(super) const fn new() -> Self {
            Self {
                task: AtomicPtr::new(ptr::null_mut()),
            }
        }

        pub(super) fn wake(&self) {
            let handle = self.task.load(Ordering::Acquire);
            if !handle.is_null() {
                // SAFETY: the handle was published by a live task blocked in
                // `park`; task handles stay valid for the process lifetime
                // because worker tasks never exit.
                unsafe {
                    task::notify_and_yield(handle, NonZeroU32::MIN);
                }
            }
        }

        pub(super) fn park(&self, timeout: Option<Duration>, ready: impl Fn() -> bool) {
            if let Some(current) = task::current() {
                self.task.store(current, Ordering::Release);
            }
            if ready() {
                return;
            }
            let ticks = timeout.map_or(BLOCK, |t| TickType::from(t).ticks());
            let _ = task::wait_notification(ticks);
        }
    }
}

/// Host: mutex + condvar. `wake` takes the lock before notifying so a waiter
/// that has checked `ready` cannot miss the notification.
#[cfg(not(target_os = "espidf"))]
mod waker {
    use core::time::Duration;
    use std::sync::{Condvar, Mutex, PoisonError};

    pub(super) struct Waker {
        lock: Mutex<()>,
        cond: Condvar,
    }

    impl Waker {
        pub(super) const fn new() -> Self {
            Self {
                lock: Mutex::new(()),
                cond: Condvar::new(),
            }
        }

        pub(super) fn wake(&self) {
            let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            self.cond.notify_all();
        }

        pub(super) fn park(&self, timeout: Option<Duration>, ready: impl Fn() -> bool) {
            let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
            if ready() {
                return;
            }
            match timeout {
                None => {
                    let _guard = self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner);
                }
                Some(t) => {
                    let _guard = self
                        .cond
                        .wait_timeout(guard, t)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Option<Duration> = Some(Duration::from_millis(20));

    #[test]
    fn flag_bits_do_not_overlap() {
        let mut seen = 0u32;
        for f in EventFlag::ALL {
            assert_eq!(f.mask().count_ones(), 1);
            assert_eq!(seen & f.mask(), 0);
            seen |= f.mask();
        }
        assert_eq!(seen, EventBits::ALL.bits());
    }

    #[test]
    fn set_then_wait_returns_exactly_mask() {
        let bus = EventGroup::new();
        let mask = EventFlag::ShortPress | EventFlag::LongPress;
        bus.set_bits(mask);
        assert_eq!(bus.wait_any(mask, SHORT), mask);
        assert!(bus.peek().is_empty());
    }

    #[test]
    fn wait_preserves_bits_outside_mask() {
        let bus = EventGroup::new();
        bus.set_bits(EventFlag::NormalPress.into());
        bus.set_bits(EventFlag::ShortPress.into());

        let got = bus.wait_any(EventFlag::ShortPress.into(), SHORT);
        assert_eq!(got, EventBits::from(EventFlag::ShortPress));
        assert_eq!(bus.peek(), EventBits::from(EventFlag::NormalPress));
    }

    #[test]
    fn second_wait_without_set_times_out_empty() {
        let bus = EventGroup::new();
        bus.set_bits(EventFlag::LongPress.into());
        assert!(!bus.wait_any(EventBits::ALL, SHORT).is_empty());
        assert!(bus.wait_any(EventBits::ALL, SHORT).is_empty());
    }

    #[test]
    fn unrequested_bit_does_not_satisfy_wait() {
        let bus = EventGroup::new();
        bus.set_bits(EventFlag::LongPress.into());
        assert!(bus.wait_any(EventFlag::ShortPress.into(), SHORT).is_empty());
        assert_eq!(bus.peek(), EventBits::from(EventFlag::LongPress));
    }

    #[test]
    fn repeated_set_coalesces() {
        let bus = EventGroup::new();
        bus.set_bits(EventFlag::ShortPress.into());
        let after = bus.set_bits(EventFlag::ShortPress.into());
        assert_eq!(after, EventBits::from(EventFlag::ShortPress));
        assert_eq!(bus.wait_any(EventBits::ALL, SHORT), EventBits::from(EventFlag::ShortPress));
    }

    #[test]
    fn blocked_waiter_is_woken_by_setter() {
        let bus = Arc::new(EventGroup::new());
        let waiter = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || bus.wait_any(EventBits::ALL, Some(Duration::from_secs(5))))
        };
        thread::sleep(Duration::from_millis(30));
        bus.set_bits(EventFlag::NormalPress.into());

        let got = waiter.join().unwrap();
        assert_eq!(got, EventBits::from(EventFlag::NormalPress));
    }

    #[test]
    fn replace_keeps_only_latest_edge() {
        let bus = EventGroup::new();
        bus.set_bits(EventFlag::ShortPress.into());
        bus.replace_bits(EventBits::EDGES, EventFlag::ButtonDown.into());
        let after = bus.replace_bits(EventBits::EDGES, EventFlag::ButtonUp.into());
        assert_eq!(after, EventFlag::ShortPress | EventFlag::ButtonUp);
        assert_eq!(bus.wait_any(EventBits::EDGES, SHORT), EventBits::from(EventFlag::ButtonUp));
        assert_eq!(bus.peek(), EventBits::from(EventFlag::ShortPress));
    }

    #[test]
    fn press_and_edge_masks_partition_all() {
        assert_eq!(EventBits::PRESSES.bits() & EventBits::EDGES.bits(), 0);
        assert_eq!(EventBits::PRESSES | EventBits::EDGES, EventBits::ALL);
        for f in EventFlag::PRESSES {
            assert!(EventBits::PRESSES.contains(f));
        }
    }

    #[test]
    fn debug_lists_flag_names() {
        let bits = EventFlag::ShortPress | EventFlag::LongPress;
        assert_eq!(format!("{bits:?}"), "{ShortPress, LongPress}");
    }
}
