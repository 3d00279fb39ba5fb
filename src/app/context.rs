//! Application context.
//!
//! Owns everything the tasks share: the active configuration, the press
//! signal bus, the edge signal, the timer service, the blink timer and the
//! hold-timeout timer. Components get what they need from here at
//! construction time; there are no global handles.
//!
//! ```text
//!   ButtonIsr ──set_bits──▶ EventGroup ──wait_any──▶ ConsumerDispatcher
//!   ButtonIsr ──edges─────▶ EventGroup ──wait_any──▶ HoldRelay ──▶ hold timer
//!   SerialPort ──events──▶ StreamEventRouter ──change_period──▶ blink timer
//! ```
//!
//! Construction either yields a fully wired context or an error; nothing
//! runs against a half-initialised resource.

use std::sync::Arc;
use std::thread::JoinHandle;

use log::{info, warn};

use crate::app::commands::CommandParser;
use crate::app::dispatcher::ConsumerDispatcher;
use crate::app::hold::HoldRelay;
use crate::app::ports::{EventSink, PressHandler, SerialPort, TickSource};
use crate::app::stream::StreamEventRouter;
use crate::config::SystemConfig;
use crate::drivers::button::ButtonIsr;
use crate::drivers::hw_timer::{Expiry, PeriodicTimer, TimerService};
use crate::drivers::task_pin;
use crate::error::Result;
use crate::events::EventGroup;

/// Name the blink timer is created under.
pub const BLINK_TIMER_NAME: &str = "TimerBlink";
/// Name the press-hold timeout is created under.
pub const HOLD_TIMER_NAME: &str = "TimerHold";

pub struct AppContext {
    config: SystemConfig,
    bus: Arc<EventGroup>,
    edges: Arc<EventGroup>,
    blink: PeriodicTimer,
    hold: PeriodicTimer,
    // Owns the backend; dropped after the timer handles.
    _timers: TimerService,
}

impl AppContext {
    /// Validate `config`, create the buses, start the timer service, start
    /// the blink timer bound to `on_blink` and create the (stopped) hold
    /// timeout.
    pub fn init(config: SystemConfig, on_blink: impl FnMut(Expiry) + Send + 'static) -> Result<Self> {
        config.validate()?;

        let bus = Arc::new(EventGroup::new());
        let edges = Arc::new(EventGroup::new());
        let timers = TimerService::spawn(&config.timer_task)?;

        let wait = config.change_period_wait();
        let blink = timers.create(BLINK_TIMER_NAME, config.blink_timer, on_blink, wait)?;
        blink.start(wait)?;

        let hold_ms = config.hold_timer.period_ms;
        let hold = timers.create(
            HOLD_TIMER_NAME,
            config.hold_timer,
            move |_| warn!("press: Timeout, button held longer than {} ms", hold_ms),
            wait,
        )?;

        info!(
            "ctx: blink timer '{}' started ({} ms, auto_reload={}), hold timeout {} ms",
            BLINK_TIMER_NAME, config.blink_timer.period_ms, config.blink_timer.auto_reload, hold_ms
        );
        Ok(Self { config, bus, edges, blink, hold, _timers: timers })
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventGroup> {
        &self.bus
    }

    pub fn blink(&self) -> &PeriodicTimer {
        &self.blink
    }

    pub fn hold(&self) -> &PeriodicTimer {
        &self.hold
    }

    /// Interrupt-side state for the button. The caller gives it a `'static`
    /// home before registering it.
    pub fn button_isr<T: TickSource>(&self, ticks: T) -> ButtonIsr<T> {
        ButtonIsr::new(self.config.press, ticks, Arc::clone(&self.bus))
            .with_edge_signal(Arc::clone(&self.edges))
    }

    pub fn hold_relay(&self) -> HoldRelay<PeriodicTimer> {
        HoldRelay::new(Arc::clone(&self.edges), self.hold.clone(), self.config.change_period_wait())
    }

    pub fn dispatcher<H: PressHandler>(&self, handler: H) -> ConsumerDispatcher<H> {
        ConsumerDispatcher::new(Arc::clone(&self.bus), handler)
    }

    pub fn router(&self) -> StreamEventRouter {
        StreamEventRouter::new(
            CommandParser::new(self.config.change_period_wait()),
            self.config.uart.pattern_len,
        )
    }

    /// Spawn the press consumer task.
    pub fn spawn_dispatcher<H>(&self, handler: H) -> Result<JoinHandle<()>>
    where
        H: PressHandler + Send + 'static,
    {
        let dispatcher = self.dispatcher(handler);
        task_pin::spawn_task("btn-evt\0", &self.config.dispatcher_task, move || dispatcher.run())
    }

    /// Spawn the task that arms and cancels the hold timeout.
    pub fn spawn_hold_relay(&self) -> Result<JoinHandle<()>> {
        let relay = self.hold_relay();
        task_pin::spawn_task("btn-hold\0", &self.config.hold_task, move || relay.run())
    }

    /// Spawn the serial stream task. It drives the blink timer directly.
    pub fn spawn_stream_task<S, E>(&self, mut serial: S, mut sink: E) -> Result<JoinHandle<()>>
    where
        S: SerialPort + Send + 'static,
        E: EventSink + Send + 'static,
    {
        let mut router = self.router();
        let mut timer = self.blink.clone();
        task_pin::spawn_task("uart-evt\0", &self.config.uart_task, move || {
            router.run(&mut serial, &mut timer, &mut sink)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::time::ManualTicks;
    use crate::drivers::button::PressClass;
    use crate::drivers::hw_timer::TimerState;
    use crate::error::Error;
    use core::time::Duration;
    use std::sync::mpsc;

    #[test]
    fn init_starts_blink_timer() {
        let mut cfg = SystemConfig::default();
        cfg.blink_timer.period_ms = 10;
        let (tx, rx) = mpsc::channel();
        let ctx = AppContext::init(cfg, move |e| { let _ = tx.send(e); }).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.name, BLINK_TIMER_NAME);
        assert_eq!(first.id, ctx.blink().id());
        assert_eq!(ctx.blink().state(), TimerState::Running);
    }

    #[test]
    fn invalid_config_fails_init() {
        let mut cfg = SystemConfig::default();
        cfg.blink_timer.period_ms = 0;
        assert!(matches!(AppContext::init(cfg, |_| {}), Err(Error::Config(_))));
    }

    #[test]
    fn isr_and_dispatcher_share_the_bus() {
        struct Seen(Vec<PressClass>);
        impl PressHandler for Seen {
            fn on_press(&mut self, class: PressClass) {
                self.0.push(class);
            }
        }

        let ctx = AppContext::init(SystemConfig::default(), |_| {}).unwrap();
        let ticks = ManualTicks::new(1);
        let isr = ctx.button_isr(&ticks);
        let mut dispatcher = ctx.dispatcher(Seen(Vec::new()));

        isr.on_interrupt(false);
        ticks.advance_ms(2000);
        assert_eq!(isr.on_interrupt(true), PressClass::Normal);

        dispatcher.dispatch_once(Some(Duration::from_millis(100)));
        assert_eq!(dispatcher.handler().0, vec![PressClass::Normal]);
    }

    fn hold_config(period_ms: u32) -> SystemConfig {
        let mut cfg = SystemConfig::default();
        cfg.hold_timer.period_ms = period_ms;
        cfg
    }

    fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
        let end = std::time::Instant::now() + Duration::from_secs(2);
        while std::time::Instant::now() < end {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    const RELAY: Option<Duration> = Some(Duration::from_millis(100));

    #[test]
    fn holding_past_timeout_fires_hold_timer() {
        let ctx = AppContext::init(hold_config(30), |_| {}).unwrap();
        let ticks = ManualTicks::new(1);
        let isr = ctx.button_isr(&ticks);
        let mut relay = ctx.hold_relay();
        assert_eq!(ctx.hold().state(), TimerState::Stopped);

        isr.on_interrupt(false);
        relay.relay_once(RELAY);
        assert!(wait_for(|| ctx.hold().expiries() == 1));
        assert_eq!(ctx.hold().state(), TimerState::Stopped);

        // Release after the timeout: nothing to cancel, press is out of range.
        ticks.advance_ms(7000);
        assert_eq!(isr.on_interrupt(true), PressClass::None);
        relay.relay_once(RELAY);
        assert_eq!(ctx.hold().expiries(), 1);
    }

    #[test]
    fn release_before_timeout_cancels_hold_timer() {
        let ctx = AppContext::init(hold_config(150), |_| {}).unwrap();
        let ticks = ManualTicks::new(1);
        let isr = ctx.button_isr(&ticks);
        let mut relay = ctx.hold_relay();

        isr.on_interrupt(false);
        relay.relay_once(RELAY);
        assert!(wait_for(|| ctx.hold().state() == TimerState::Running));

        ticks.advance_ms(500);
        assert_eq!(isr.on_interrupt(true), PressClass::Short);
        relay.relay_once(RELAY);
        assert!(wait_for(|| ctx.hold().state() == TimerState::Stopped));

        std::thread::sleep(Duration::from_millis(250));
        assert_eq!(ctx.hold().expiries(), 0);
    }
}
