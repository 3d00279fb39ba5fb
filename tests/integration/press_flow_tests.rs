//! Button edge → classifier → event group → dispatcher.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use blinkshell::adapters::time::ManualTicks;
use blinkshell::app::context::AppContext;
use blinkshell::app::dispatcher::ConsumerDispatcher;
use blinkshell::config::{PressThresholds, SystemConfig};
use blinkshell::drivers::button::{ButtonIsr, PressClass};
use blinkshell::drivers::hw_timer::TimerState;
use blinkshell::events::{EventBits, EventFlag, EventGroup};

use crate::mock_hw::RecordingHandler;

const TICK_MS: u32 = 10;
const POLL: Option<Duration> = Some(Duration::from_millis(50));

fn hold(isr: &ButtonIsr<&ManualTicks>, ticks: &ManualTicks, ms: u32) -> PressClass {
    isr.on_interrupt(false);
    ticks.advance_ms(ms);
    isr.on_interrupt(true)
}

#[test]
fn two_second_hold_dispatches_normal() {
    let bus = Arc::new(EventGroup::new());
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ButtonIsr::new(PressThresholds::default(), &ticks, Arc::clone(&bus));
    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), RecordingHandler::default());

    assert_eq!(hold(&isr, &ticks, 2000), PressClass::Normal);
    assert_eq!(dispatcher.dispatch_once(POLL), EventBits::from(EventFlag::NormalPress));
    assert_eq!(dispatcher.handler().presses, vec![PressClass::Normal]);
    assert!(bus.peek().is_empty());
}

#[test]
fn repeated_class_before_wake_coalesces() {
    let bus = Arc::new(EventGroup::new());
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ButtonIsr::new(PressThresholds::default(), &ticks, Arc::clone(&bus));
    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), RecordingHandler::default());

    hold(&isr, &ticks, 200);
    hold(&isr, &ticks, 300);
    dispatcher.dispatch_once(POLL);
    assert_eq!(dispatcher.handler().presses, vec![PressClass::Short]);
}

#[test]
fn mixed_classes_dispatch_in_bit_order() {
    let bus = Arc::new(EventGroup::new());
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ButtonIsr::new(PressThresholds::default(), &ticks, Arc::clone(&bus));
    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), RecordingHandler::default());

    hold(&isr, &ticks, 4000);
    hold(&isr, &ticks, 500);
    dispatcher.dispatch_once(POLL);
    assert_eq!(dispatcher.handler().presses, vec![PressClass::Short, PressClass::Long]);
}

#[test]
fn unclassified_holds_never_wake_the_dispatcher() {
    let bus = Arc::new(EventGroup::new());
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ButtonIsr::new(PressThresholds::default(), &ticks, Arc::clone(&bus));
    let mut dispatcher = ConsumerDispatcher::new(Arc::clone(&bus), RecordingHandler::default());

    assert_eq!(hold(&isr, &ticks, 0), PressClass::None);
    assert_eq!(hold(&isr, &ticks, 9000), PressClass::None);
    // Release with no press: bounce.
    assert_eq!(isr.on_interrupt(true), PressClass::None);

    assert!(dispatcher.dispatch_once(POLL).is_empty());
    assert!(dispatcher.handler().presses.is_empty());
}

#[test]
fn blocked_dispatcher_wakes_on_press_from_other_thread() {
    let bus = Arc::new(EventGroup::new());
    let consumer_bus = Arc::clone(&bus);
    let consumer = thread::spawn(move || {
        let mut d = ConsumerDispatcher::new(consumer_bus, RecordingHandler::default());
        d.dispatch_once(Some(Duration::from_secs(5)));
        d.handler().presses.clone()
    });

    thread::sleep(Duration::from_millis(20));
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ButtonIsr::new(PressThresholds::default(), &ticks, Arc::clone(&bus));
    hold(&isr, &ticks, 4500);

    assert_eq!(consumer.join().unwrap(), vec![PressClass::Long]);
}

fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let end = Instant::now() + Duration::from_secs(3);
    while Instant::now() < end {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn held_button_times_out_through_relay_task() {
    let mut cfg = SystemConfig::default();
    cfg.hold_timer.period_ms = 40;
    let ctx = AppContext::init(cfg, |_| {}).unwrap();
    let _relay = ctx.spawn_hold_relay().unwrap();
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ctx.button_isr(&ticks);

    isr.on_interrupt(false);
    assert!(eventually(|| ctx.hold().expiries() == 1));
    assert_eq!(ctx.hold().state(), TimerState::Stopped);

    ticks.advance_ms(8000);
    assert_eq!(isr.on_interrupt(true), PressClass::None);
}

#[test]
fn quick_press_never_reaches_hold_timeout() {
    let mut cfg = SystemConfig::default();
    cfg.hold_timer.period_ms = 60;
    let ctx = AppContext::init(cfg, |_| {}).unwrap();
    let _relay = ctx.spawn_hold_relay().unwrap();
    let ticks = ManualTicks::new(TICK_MS);
    let isr = ctx.button_isr(&ticks);

    assert_eq!(hold(&isr, &ticks, 300), PressClass::Short);
    thread::sleep(Duration::from_millis(200));
    assert_eq!(ctx.hold().expiries(), 0);
    assert_eq!(ctx.hold().state(), TimerState::Stopped);
}
