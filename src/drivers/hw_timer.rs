//! Software timer service.
//!
//! Named timers with an expiry callback, driven through cheap cloneable
//! [`PeriodicTimer`] handles.
//!
//! ## Dual-target design
//!
//! - **`target_os = "espidf"`**: each timer is an `esp_timer` dispatched
//!   from the ESP timer task. Callbacks run there, never in an ISR. Timers
//!   live for the rest of the program once created.
//! - **host**: one daemon thread owns every timer and runs the callbacks.
//!   Other tasks talk to it through a single-slot command mailbox, so at
//!   most one request is in flight and a sender never blocks longer than
//!   the wait it asked for.
//!
//! ```text
//!   PeriodicTimer::change_period ──▶ [ slot ] ──▶ daemon ──▶ callback(Expiry)
//! ```
//!
//! Semantics follow FreeRTOS software timers on both targets: changing the
//! period restarts the countdown and leaves the timer running, even if it
//! was stopped. On the host a timer's observable status (state, period,
//! expiry count) only changes once the daemon has applied the command.

use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use core::time::Duration;

use crate::error::Result;

#[cfg(target_os = "espidf")]
pub use esp::{PeriodicTimer, TimerService};
#[cfg(not(target_os = "espidf"))]
pub use sim::{PeriodicTimer, TimerService};

/// Identity of a timer within its service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u32);

impl TimerId {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Passed to the callback on every expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiry {
    pub id: TimerId,
    pub name: &'static str,
    /// 1 for the first expiry since creation.
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Stopped,
    Running,
}

type Callback = Box<dyn FnMut(Expiry) + Send>;

/// Status mirrored out of the backend for callers.
struct TimerStatus {
    running: AtomicBool,
    period_ms: AtomicU32,
    expiries: AtomicU32,
}

impl TimerStatus {
    fn new(period_ms: u32) -> Self {
        Self {
            running: AtomicBool::new(false),
            period_ms: AtomicU32::new(period_ms),
            expiries: AtomicU32::new(0),
        }
    }

    fn state(&self) -> TimerState {
        if self.running.load(Ordering::Acquire) {
            TimerState::Running
        } else {
            TimerState::Stopped
        }
    }
}

// ── ESP-IDF: esp_timer ────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::ffi::c_void;
    use core::ptr;
    use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};
    use core::time::Duration;
    use std::ffi::CString;
    use std::sync::{Arc, Mutex, PoisonError};

    use esp_idf_svc::sys::*;
    use log::{debug, info, warn};

    use super::{Callback, Expiry, TimerId, TimerState, TimerStatus};
    use crate::config::{TaskConfig, TimerConfig};
    use crate::error::{Error, InitError, Result, TimerError};

    /// Leaked at creation: the esp_timer callback argument points here.
    struct TimerCore {
        id: TimerId,
        name: &'static str,
        auto_reload: bool,
        handle: AtomicPtr<esp_timer>,
        /// Serializes commands on this timer (stop + start pairs).
        cmd: Mutex<()>,
        callback: Mutex<Callback>,
        status: TimerStatus,
    }

    impl TimerCore {
        fn fire(&self) {
            let count = self.status.expiries.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
            if !self.auto_reload {
                self.status.running.store(false, Ordering::Release);
            }
            let mut callback = self.callback.lock().unwrap_or_else(PoisonError::into_inner);
            callback(Expiry { id: self.id, name: self.name, count });
        }

        fn handle(&self) -> esp_timer_handle_t {
            self.handle.load(Ordering::Acquire)
        }

        /// Stop (if running) and start again with `period_ms`.
        fn restart(&self, period_ms: u32) -> Result<()> {
            let us = u64::from(period_ms) * 1_000;
            // SAFETY: the handle was created in `TimerService::create` and is
            // never deleted. Stopping an idle timer only reports
            // ESP_ERR_INVALID_STATE.
            let ret = unsafe {
                esp_timer_stop(self.handle());
                if self.auto_reload {
                    esp_timer_start_periodic(self.handle(), us)
                } else {
                    esp_timer_start_once(self.handle(), us)
                }
            };
            if ret != ESP_OK as i32 {
                self.status.running.store(false, Ordering::Release);
                return Err(TimerError::Rejected(ret).into());
            }
            self.status.running.store(true, Ordering::Release);
            Ok(())
        }

        fn halt(&self) {
            // SAFETY: see `restart`.
            unsafe {
                esp_timer_stop(self.handle());
            }
            self.status.running.store(false, Ordering::Release);
        }
    }

    unsafe extern "C" fn on_expiry(arg: *mut c_void) {
        // SAFETY: `arg` is the leaked `&'static TimerCore` registered in
        // `TimerService::create`.
        let core = unsafe { &*arg.cast::<TimerCore>() };
        core.fire();
    }

    /// Factory for esp_timer-backed timers. Dropping it stops them all.
    pub struct TimerService {
        next_id: AtomicU32,
        stopped: Arc<AtomicBool>,
        timers: Mutex<Vec<&'static TimerCore>>,
    }

    impl TimerService {
        /// Callbacks run on the ESP timer task, whose priority and stack
        /// come from sdkconfig; `_task` only applies to the host daemon.
        pub fn spawn(_task: &TaskConfig) -> Result<Self> {
            info!("timer: service running (esp_timer task)");
            Ok(Self {
                next_id: AtomicU32::new(0),
                stopped: Arc::new(AtomicBool::new(false)),
                timers: Mutex::new(Vec::new()),
            })
        }

        /// Create a stopped timer bound to `callback`.
        pub fn create(
            &self,
            name: &'static str,
            config: TimerConfig,
            callback: impl FnMut(Expiry) + Send + 'static,
            _wait: Duration,
        ) -> Result<PeriodicTimer> {
            if self.stopped.load(Ordering::Acquire) {
                return Err(TimerError::ServiceStopped.into());
            }
            if config.period_ms == 0 {
                return Err(TimerError::ZeroPeriod.into());
            }
            let c_name = CString::new(name).map_err(|_| Error::Config("timer name contains NUL"))?;

            let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let core: &'static TimerCore = Box::leak(Box::new(TimerCore {
                id,
                name,
                auto_reload: config.auto_reload,
                handle: AtomicPtr::new(ptr::null_mut()),
                cmd: Mutex::new(()),
                callback: Mutex::new(Box::new(callback)),
                status: TimerStatus::new(config.period_ms),
            }));

            let args = esp_timer_create_args_t {
                callback: Some(on_expiry),
                arg: ptr::from_ref(core).cast_mut().cast(),
                dispatch_method: esp_timer_dispatch_t_ESP_TIMER_TASK,
                // Leaked with the core; esp_timer keeps the pointer.
                name: c_name.into_raw().cast_const(),
                // Fell behind (slow callback): skip missed expiries.
                skip_unhandled_events: true,
            };
            let mut handle: esp_timer_handle_t = ptr::null_mut();
            // SAFETY: `args` is fully initialised and `core` outlives the timer.
            let ret = unsafe { esp_timer_create(&args, &mut handle) };
            if ret != ESP_OK as i32 {
                return Err(InitError::TimerService(ret).into());
            }
            core.handle.store(handle, Ordering::Release);

            if let Ok(mut timers) = self.timers.lock() {
                timers.push(core);
            }
            debug!("timer: created '{}' ({} ms, auto_reload={})", name, config.period_ms, config.auto_reload);
            Ok(PeriodicTimer { core, stopped: Arc::clone(&self.stopped) })
        }
    }

    impl Drop for TimerService {
        fn drop(&mut self) {
            self.stopped.store(true, Ordering::Release);
            let timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
            for core in timers.iter() {
                core.halt();
            }
        }
    }

    /// Handle to one timer. Cheap to clone; every clone drives the same timer.
    #[derive(Clone)]
    pub struct PeriodicTimer {
        core: &'static TimerCore,
        stopped: Arc<AtomicBool>,
    }

    impl PeriodicTimer {
        pub fn id(&self) -> TimerId {
            self.core.id
        }

        pub fn name(&self) -> &'static str {
            self.core.name
        }

        fn command<R>(&self, f: impl FnOnce(&TimerCore) -> Result<R>) -> Result<R> {
            if self.stopped.load(Ordering::Acquire) {
                return Err(TimerError::ServiceStopped.into());
            }
            let _guard = self.core.cmd.lock().unwrap_or_else(PoisonError::into_inner);
            f(self.core)
        }

        /// Start the countdown from now. esp_timer commands never block, so
        /// `_wait` is always met.
        pub fn start(&self, _wait: Duration) -> Result<()> {
            self.command(|core| core.restart(core.status.period_ms.load(Ordering::Acquire)))
        }

        pub fn stop(&self, _wait: Duration) -> Result<()> {
            self.command(|core| {
                core.halt();
                Ok(())
            })
        }

        /// Request a new period. Restarts the countdown and leaves the timer
        /// running. On error the previous period is re-armed.
        pub fn change_period(&self, period_ms: u32, _wait: Duration) -> Result<()> {
            if period_ms == 0 {
                return Err(TimerError::ZeroPeriod.into());
            }
            self.command(|core| {
                let previous = core.status.period_ms.load(Ordering::Acquire);
                let was_running = core.status.state() == TimerState::Running;
                match core.restart(period_ms) {
                    Ok(()) => {
                        core.status.period_ms.store(period_ms, Ordering::Release);
                        Ok(())
                    }
                    Err(e) => {
                        if was_running && core.restart(previous).is_err() {
                            warn!("timer: '{}' could not be re-armed", core.name);
                        }
                        Err(e)
                    }
                }
            })
        }

        pub fn state(&self) -> TimerState {
            self.core.status.state()
        }

        pub fn period_ms(&self) -> u32 {
            self.core.status.period_ms.load(Ordering::Acquire)
        }

        pub fn expiries(&self) -> u32 {
            self.core.status.expiries.load(Ordering::Acquire)
        }
    }
}

// ── Host: daemon thread + mailbox ─────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::sync::atomic::{AtomicU32, Ordering};
    use core::time::Duration;
    use std::sync::{Arc, Condvar, Mutex, MutexGuard};
    use std::thread::JoinHandle;
    use std::time::Instant;

    use log::{debug, info, warn};

    use super::{Callback, Expiry, TimerId, TimerState, TimerStatus};
    use crate::config::{TaskConfig, TimerConfig};
    use crate::drivers::task_pin;
    use crate::error::{Result, TimerError};

    enum Command {
        Create {
            id: TimerId,
            name: &'static str,
            config: TimerConfig,
            callback: Callback,
            status: Arc<TimerStatus>,
        },
        Start(TimerId),
        Stop(TimerId),
        ChangePeriod(TimerId, u32),
    }

    struct Mailbox {
        slot: Option<Command>,
        shutdown: bool,
    }

    struct Shared {
        mailbox: Mutex<Mailbox>,
        cmd_ready: Condvar,
        slot_free: Condvar,
    }

    impl Shared {
        fn lock(&self) -> Result<MutexGuard<'_, Mailbox>> {
            self.mailbox.lock().map_err(|_| TimerError::ServiceStopped.into())
        }

        /// Place `cmd` in the mailbox, waiting at most `wait` for the slot.
        fn send(&self, cmd: Command, wait: Duration) -> Result<()> {
            let deadline = Instant::now().checked_add(wait);
            let mut mb = self.lock()?;
            loop {
                if mb.shutdown {
                    return Err(TimerError::ServiceStopped.into());
                }
                if mb.slot.is_none() {
                    mb.slot = Some(cmd);
                    drop(mb);
                    self.cmd_ready.notify_one();
                    return Ok(());
                }
                mb = match deadline {
                    None => self.slot_free.wait(mb).map_err(|_| TimerError::ServiceStopped)?,
                    Some(d) => {
                        let remaining = d.saturating_duration_since(Instant::now());
                        if remaining.is_zero() {
                            return Err(TimerError::CommandTimeout.into());
                        }
                        self.slot_free
                            .wait_timeout(mb, remaining)
                            .map_err(|_| TimerError::ServiceStopped)?
                            .0
                    }
                };
            }
        }
    }

    /// Daemon-side timer record. Owns the callback.
    struct Entry {
        id: TimerId,
        name: &'static str,
        period: Duration,
        auto_reload: bool,
        deadline: Option<Instant>,
        count: u32,
        callback: Callback,
        status: Arc<TimerStatus>,
    }

    impl Entry {
        fn arm(&mut self, now: Instant) {
            self.deadline = Some(now + self.period);
            self.status.running.store(true, Ordering::Release);
        }

        fn disarm(&mut self) {
            self.deadline = None;
            self.status.running.store(false, Ordering::Release);
        }
    }

    fn period_of(ms: u32) -> Duration {
        Duration::from_millis(u64::from(ms))
    }

    fn apply(timers: &mut Vec<Entry>, cmd: Command) {
        let now = Instant::now();
        match cmd {
            Command::Create { id, name, config, callback, status } => {
                debug!("timer: created '{}' ({} ms, auto_reload={})", name, config.period_ms, config.auto_reload);
                timers.push(Entry {
                    id,
                    name,
                    period: period_of(config.period_ms),
                    auto_reload: config.auto_reload,
                    deadline: None,
                    count: 0,
                    callback,
                    status,
                });
            }
            Command::Start(id) => with_entry(timers, id, "start", |e| e.arm(now)),
            Command::Stop(id) => with_entry(timers, id, "stop", Entry::disarm),
            Command::ChangePeriod(id, ms) => with_entry(timers, id, "change_period", |e| {
                e.period = period_of(ms);
                e.status.period_ms.store(ms, Ordering::Release);
                e.arm(now);
            }),
        }
    }

    fn with_entry(timers: &mut [Entry], id: TimerId, op: &str, f: impl FnOnce(&mut Entry)) {
        match timers.iter_mut().find(|e| e.id == id) {
            Some(entry) => f(entry),
            None => warn!("timer: {} for unknown timer {}", op, id.raw()),
        }
    }

    /// Run every callback whose deadline has passed.
    fn fire_due(timers: &mut [Entry], now: Instant) {
        for e in timers.iter_mut() {
            let Some(deadline) = e.deadline else { continue };
            if deadline > now {
                continue;
            }
            e.count = e.count.wrapping_add(1);
            e.status.expiries.store(e.count, Ordering::Release);
            if e.auto_reload {
                // Fell behind (slow callback): skip missed expiries.
                let next = deadline + e.period;
                e.deadline = Some(if next <= now { now + e.period } else { next });
            } else {
                e.disarm();
            }
            (e.callback)(Expiry { id: e.id, name: e.name, count: e.count });
        }
    }

    fn next_deadline(timers: &[Entry]) -> Option<Instant> {
        timers.iter().filter_map(|e| e.deadline).min()
    }

    fn daemon(shared: &Shared) {
        let mut timers: Vec<Entry> = Vec::new();
        loop {
            let cmd = {
                let Ok(mut mb) = shared.mailbox.lock() else { return };
                loop {
                    if mb.shutdown {
                        return;
                    }
                    if let Some(cmd) = mb.slot.take() {
                        shared.slot_free.notify_all();
                        break Some(cmd);
                    }
                    let waited = match next_deadline(&timers) {
                        None => shared.cmd_ready.wait(mb).ok(),
                        Some(d) => {
                            let remaining = d.saturating_duration_since(Instant::now());
                            if remaining.is_zero() {
                                break None;
                            }
                            shared.cmd_ready.wait_timeout(mb, remaining).ok().map(|(g, _)| g)
                        }
                    };
                    let Some(guard) = waited else { return };
                    mb = guard;
                }
            };
            if let Some(cmd) = cmd {
                apply(&mut timers, cmd);
            }
            fire_due(&mut timers, Instant::now());
        }
    }

    /// Owner of the timer daemon. Dropping it stops the daemon.
    pub struct TimerService {
        shared: Arc<Shared>,
        next_id: AtomicU32,
        daemon: Option<JoinHandle<()>>,
    }

    impl TimerService {
        /// Spawn the daemon task.
        pub fn spawn(task: &TaskConfig) -> Result<Self> {
            let shared = Arc::new(Shared {
                mailbox: Mutex::new(Mailbox { slot: None, shutdown: false }),
                cmd_ready: Condvar::new(),
                slot_free: Condvar::new(),
            });
            let worker = Arc::clone(&shared);
            let handle = task_pin::spawn_task("tmr-svc\0", task, move || daemon(&worker))?;
            info!("timer: service running");
            Ok(Self { shared, next_id: AtomicU32::new(0), daemon: Some(handle) })
        }

        /// Create a stopped timer bound to `callback`.
        pub fn create(
            &self,
            name: &'static str,
            config: TimerConfig,
            callback: impl FnMut(Expiry) + Send + 'static,
            wait: Duration,
        ) -> Result<PeriodicTimer> {
            if config.period_ms == 0 {
                return Err(TimerError::ZeroPeriod.into());
            }
            let id = TimerId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let status = Arc::new(TimerStatus::new(config.period_ms));
            self.shared.send(
                Command::Create {
                    id,
                    name,
                    config,
                    callback: Box::new(callback),
                    status: Arc::clone(&status),
                },
                wait,
            )?;
            Ok(PeriodicTimer { id, name, shared: Arc::clone(&self.shared), status })
        }
    }

    impl Drop for TimerService {
        fn drop(&mut self) {
            if let Ok(mut mb) = self.shared.mailbox.lock() {
                mb.shutdown = true;
            }
            self.shared.cmd_ready.notify_all();
            self.shared.slot_free.notify_all();
            if let Some(handle) = self.daemon.take() {
                let _ = handle.join();
            }
        }
    }

    /// Handle to one timer. Cheap to clone; every clone drives the same timer.
    #[derive(Clone)]
    pub struct PeriodicTimer {
        id: TimerId,
        name: &'static str,
        shared: Arc<Shared>,
        status: Arc<TimerStatus>,
    }

    impl PeriodicTimer {
        pub fn id(&self) -> TimerId {
            self.id
        }

        pub fn name(&self) -> &'static str {
            self.name
        }

        /// Start the countdown from now.
        pub fn start(&self, wait: Duration) -> Result<()> {
            self.shared.send(Command::Start(self.id), wait)
        }

        pub fn stop(&self, wait: Duration) -> Result<()> {
            self.shared.send(Command::Stop(self.id), wait)
        }

        /// Request a new period. Restarts the countdown and leaves the timer
        /// running. On error the current period stays in effect.
        pub fn change_period(&self, period_ms: u32, wait: Duration) -> Result<()> {
            if period_ms == 0 {
                return Err(TimerError::ZeroPeriod.into());
            }
            self.shared.send(Command::ChangePeriod(self.id, period_ms), wait)
        }

        pub fn state(&self) -> TimerState {
            self.status.state()
        }

        /// Period currently applied by the daemon.
        pub fn period_ms(&self) -> u32 {
            self.status.period_ms.load(Ordering::Acquire)
        }

        pub fn expiries(&self) -> u32 {
            self.status.expiries.load(Ordering::Acquire)
        }
    }
}

impl crate::app::ports::PeriodPort for PeriodicTimer {
    fn change_period(&mut self, period_ms: u32, wait: Duration) -> Result<()> {
        PeriodicTimer::change_period(self, period_ms, wait)
    }
}

impl crate::app::ports::HoldTimeout for PeriodicTimer {
    fn arm(&mut self, wait: Duration) -> Result<()> {
        self.start(wait)
    }

    fn disarm(&mut self, wait: Duration) -> Result<()> {
        self.stop(wait)
    }
}
