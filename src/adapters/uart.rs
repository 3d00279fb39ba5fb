//! Serial port adapters.
//!
//! - **`target_os = "espidf"`**: [`UartAdapter`] installs the IDF UART
//!   driver with an event queue and `+++` pattern detection, and maps
//!   `uart_event_t` onto [`StreamEvent`].
//! - **Host**: [`SimUart`] / [`SimLine`] model the same driver: a fixed RX
//!   ring buffer, a bounded event queue and a pattern position queue.
//!   Tests write to the line, the firmware reads from the port.

use crate::app::stream::StreamEvent;

#[cfg(target_os = "espidf")]
pub use esp::UartAdapter;

#[cfg(not(target_os = "espidf"))]
pub use sim::{SimLine, SimUart};

/// Map a raw IDF `uart_event_type_t` to a [`StreamEvent`].
pub fn stream_event_from_raw(kind: u32, size: usize) -> StreamEvent {
    // Values of uart_event_type_t.
    const DATA: u32 = 0;
    const BREAK: u32 = 1;
    const BUFFER_FULL: u32 = 2;
    const FIFO_OVF: u32 = 3;
    const FRAME_ERR: u32 = 4;
    const PARITY_ERR: u32 = 5;
    const PATTERN_DET: u32 = 7;

    match kind {
        DATA => StreamEvent::Data { size },
        BREAK => StreamEvent::Break,
        BUFFER_FULL => StreamEvent::RingBufferFull,
        FIFO_OVF => StreamEvent::FifoOverflow,
        FRAME_ERR => StreamEvent::FrameError,
        PARITY_ERR => StreamEvent::ParityError,
        PATTERN_DET => StreamEvent::PatternDetected { size },
        other => StreamEvent::Unknown(other),
    }
}

// ── ESP-IDF driver ───────────────────────────────────────────

#[cfg(target_os = "espidf")]
mod esp {
    use core::time::Duration;

    use esp_idf_svc::hal::delay::{TickType, BLOCK};
    use esp_idf_svc::sys::*;
    use log::{info, warn};

    use super::stream_event_from_raw;
    use crate::app::ports::SerialPort;
    use crate::app::stream::StreamEvent;
    use crate::config::UartConfig;
    use crate::error::{InitError, Result, SerialError};
    use crate::pins;

    /// Idle symbols between pattern characters (baud-rate units).
    const PATTERN_CHR_TOUT: i32 = 9;

    /// Installed UART driver plus its event queue.
    pub struct UartAdapter {
        port: uart_port_t,
        queue: QueueHandle_t,
    }

    // SAFETY: the queue handle is a FreeRTOS object usable from any task;
    // the adapter is moved into the single UART task and used only there.
    unsafe impl Send for UartAdapter {}

    fn init_err(e: EspError) -> crate::error::Error {
        InitError::Uart(e.code()).into()
    }

    impl UartAdapter {
        /// Install the driver, apply line parameters and pins, and enable
        /// pattern detection.
        pub fn install(cfg: &UartConfig) -> Result<Self> {
            let port = uart_port_t::from(cfg.port);
            let mut queue: QueueHandle_t = core::ptr::null_mut();

            let params = uart_config_t {
                baud_rate: cfg.baud_rate as i32,
                data_bits: uart_word_length_t_UART_DATA_8_BITS,
                parity: uart_parity_t_UART_PARITY_DISABLE,
                stop_bits: uart_stop_bits_t_UART_STOP_BITS_1,
                flow_ctrl: uart_hw_flowcontrol_t_UART_HW_FLOWCTRL_DISABLE,
                source_clk: soc_periph_uart_clk_src_legacy_t_UART_SCLK_APB,
                ..Default::default()
            };

            // SAFETY: one-time driver setup from the boot task; `queue` is
            // written by the driver before it is read.
            unsafe {
                EspError::convert(uart_driver_install(
                    port,
                    cfg.rx_buffer as i32,
                    cfg.tx_buffer as i32,
                    cfg.event_queue_len as i32,
                    &mut queue,
                    0,
                ))
                .map_err(init_err)?;
                EspError::convert(uart_param_config(port, &params)).map_err(init_err)?;
                EspError::convert(uart_set_pin(
                    port,
                    pins::UART_TX_GPIO,
                    pins::UART_RX_GPIO,
                    UART_PIN_NO_CHANGE,
                    UART_PIN_NO_CHANGE,
                ))
                .map_err(init_err)?;
                EspError::convert(uart_enable_pattern_det_baud_intr(
                    port,
                    cfg.pattern_char as core::ffi::c_char,
                    cfg.pattern_len,
                    PATTERN_CHR_TOUT,
                    0,
                    0,
                ))
                .map_err(init_err)?;
                EspError::convert(uart_pattern_queue_reset(port, cfg.pattern_queue_len as i32)).map_err(init_err)?;
            }

            info!(
                "uart: UART{} @ {} baud, pattern '{}'x{}, queue {}",
                cfg.port,
                cfg.baud_rate,
                char::from(cfg.pattern_char),
                cfg.pattern_len,
                cfg.event_queue_len
            );
            Ok(Self { port, queue })
        }
    }

    fn ticks(timeout: Duration) -> TickType_t {
        TickType::from(timeout).ticks()
    }

    impl SerialPort for UartAdapter {
        fn next_event(&mut self, timeout: Option<Duration>) -> Option<StreamEvent> {
            let mut event = uart_event_t::default();
            let wait = timeout.map_or(BLOCK, ticks);
            // SAFETY: `event` is a properly sized receive buffer for this queue.
            let got = unsafe { xQueueReceive(self.queue, (&raw mut event).cast(), wait) };
            (got != 0).then(|| stream_event_from_raw(event.type_ as u32, event.size))
        }

        fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            if buf.is_empty() {
                return Ok(0);
            }
            // SAFETY: `buf` is valid for `buf.len()` bytes.
            let n = unsafe {
                uart_read_bytes(self.port, buf.as_mut_ptr().cast(), buf.len() as u32, ticks(timeout))
            };
            usize::try_from(n).map_err(|_| SerialError::ReadFailed(n).into())
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
            // SAFETY: `data` is valid for `data.len()` bytes.
            let n = unsafe { uart_write_bytes(self.port, data.as_ptr().cast(), data.len()) };
            usize::try_from(n).map_err(|_| SerialError::WriteFailed(n).into())
        }

        fn flush_input(&mut self) {
            // SAFETY: driver installed in `install`.
            if let Err(e) = unsafe { EspError::convert(uart_flush_input(self.port)) } {
                warn!("uart: flush failed: {}", e);
            }
        }

        fn reset_event_queue(&mut self) {
            // SAFETY: `queue` was created by the driver. xQueueReset is a macro
            // over xQueueGenericReset(queue, pdFALSE).
            unsafe { xQueueGenericReset(self.queue, 0) };
        }

        fn pattern_pop_pos(&mut self) -> Option<usize> {
            // SAFETY: driver installed in `install`.
            let pos = unsafe { uart_pattern_pop_pos(self.port) };
            usize::try_from(pos).ok()
        }

        fn buffered_len(&self) -> usize {
            let mut len: usize = 0;
            // SAFETY: `len` is a valid out-pointer.
            match unsafe { EspError::convert(uart_get_buffered_data_len(self.port, &mut len)) } {
                Ok(()) => len,
                Err(_) => 0,
            }
        }
    }
}

// ── Host simulation ──────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
mod sim {
    use core::cell::RefCell;
    use core::time::Duration;
    use std::sync::Arc;
    use std::time::Instant;

    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::blocking_mutex::Mutex;
    use embassy_sync::channel::Channel;
    use heapless::Deque;
    use log::debug;

    use crate::app::ports::SerialPort;
    use crate::app::stream::StreamEvent;
    use crate::config::UartConfig;
    use crate::error::Result;

    /// RX ring capacity of the simulated driver.
    pub const SIM_RX_CAPACITY: usize = 2048;
    /// Driver event queue depth.
    pub const SIM_EVENT_CAPACITY: usize = 20;
    /// Pattern positions remembered.
    pub const SIM_PATTERN_CAPACITY: usize = 20;

    const POLL: Duration = Duration::from_millis(1);

    struct State {
        rx: Deque<u8, SIM_RX_CAPACITY>,
        rx_limit: usize,
        patterns: Deque<usize, SIM_PATTERN_CAPACITY>,
        pattern_limit: usize,
        pattern_char: u8,
        pattern_len: usize,
        run: usize,
        tx: Vec<u8>,
        dropped_events: usize,
    }

    struct Shared {
        events: Channel<CriticalSectionRawMutex, StreamEvent, SIM_EVENT_CAPACITY>,
        event_limit: usize,
        state: Mutex<CriticalSectionRawMutex, RefCell<State>>,
    }

    impl Shared {
        fn post(&self, event: StreamEvent) {
            if self.events.len() >= self.event_limit || self.events.try_send(event).is_err() {
                self.state.lock(|s| s.borrow_mut().dropped_events += 1);
                debug!("uart(sim): event queue full, dropped {:?}", event);
            }
        }

        fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
            self.state.lock(|s| f(&mut s.borrow_mut()))
        }
    }

    /// Firmware side of the simulated UART.
    pub struct SimUart {
        shared: Arc<Shared>,
    }

    /// Wire side of the simulated UART: what a terminal would do.
    #[derive(Clone)]
    pub struct SimLine {
        shared: Arc<Shared>,
    }

    impl SimUart {
        /// A connected port/line pair configured like the real driver.
        pub fn new(cfg: &UartConfig) -> (Self, SimLine) {
            let shared = Arc::new(Shared {
                events: Channel::new(),
                event_limit: cfg.event_queue_len.clamp(1, SIM_EVENT_CAPACITY),
                state: Mutex::new(RefCell::new(State {
                    rx: Deque::new(),
                    rx_limit: cfg.rx_buffer.clamp(1, SIM_RX_CAPACITY),
                    patterns: Deque::new(),
                    pattern_limit: cfg.pattern_queue_len.min(SIM_PATTERN_CAPACITY),
                    pattern_char: cfg.pattern_char,
                    pattern_len: usize::from(cfg.pattern_len),
                    run: 0,
                    tx: Vec::new(),
                    dropped_events: 0,
                })),
            });
            (Self { shared: Arc::clone(&shared) }, SimLine { shared })
        }
    }

    impl SimLine {
        /// Bytes arrive from the terminal, as one driver interrupt.
        ///
        /// Posts `PatternDetected` for every completed marker, otherwise one
        /// `Data` event for the chunk. A full RX buffer drops the remainder
        /// and posts `RingBufferFull`.
        pub fn receive(&self, bytes: &[u8]) {
            let mut stored = 0;
            let mut full = false;
            let mut detected: heapless::Vec<usize, SIM_PATTERN_CAPACITY> = heapless::Vec::new();

            self.shared.with(|s| {
                for &b in bytes {
                    if s.rx.len() >= s.rx_limit || s.rx.push_back(b).is_err() {
                        full = true;
                        break;
                    }
                    stored += 1;
                    if b == s.pattern_char && s.pattern_len > 0 {
                        s.run += 1;
                        if s.run == s.pattern_len {
                            s.run = 0;
                            let pos = s.rx.len() - s.pattern_len;
                            // A full position queue loses the position, not the event.
                            if s.patterns.len() < s.pattern_limit {
                                let _ = s.patterns.push_back(pos);
                            }
                            let _ = detected.push(s.rx.len());
                        }
                    } else {
                        s.run = 0;
                    }
                }
            });

            for buffered in &detected {
                self.shared.post(StreamEvent::PatternDetected { size: *buffered });
            }
            if detected.is_empty() && stored > 0 {
                self.shared.post(StreamEvent::Data { size: stored });
            }
            if full {
                self.shared.post(StreamEvent::RingBufferFull);
            }
        }

        /// Post a raw driver event (line errors, FIFO overflow).
        pub fn raise(&self, event: StreamEvent) {
            self.shared.post(event);
        }

        /// Everything the firmware has written so far.
        pub fn transmitted(&self) -> Vec<u8> {
            self.shared.with(|s| s.tx.clone())
        }

        pub fn pending_events(&self) -> usize {
            self.shared.events.len()
        }

        pub fn dropped_events(&self) -> usize {
            self.shared.with(|s| s.dropped_events)
        }

        pub fn buffered(&self) -> usize {
            self.shared.with(|s| s.rx.len())
        }
    }

    impl SerialPort for SimUart {
        fn next_event(&mut self, timeout: Option<Duration>) -> Option<StreamEvent> {
            let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
            loop {
                if let Ok(event) = self.shared.events.try_receive() {
                    return Some(event);
                }
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    return None;
                }
                std::thread::sleep(POLL);
            }
        }

        fn read_bytes(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
            let deadline = Instant::now().checked_add(timeout);
            let mut filled = 0;
            loop {
                let n = self.shared.with(|s| {
                    let mut n = 0;
                    while filled + n < buf.len() {
                        let Some(b) = s.rx.pop_front() else { break };
                        buf[filled + n] = b;
                        n += 1;
                    }
                    // Queued positions are relative to the read pointer.
                    for pos in s.patterns.iter_mut() {
                        *pos = pos.saturating_sub(n);
                    }
                    n
                });
                filled += n;
                if filled == buf.len() || deadline.is_none_or(|d| Instant::now() >= d) {
                    return Ok(filled);
                }
                std::thread::sleep(POLL);
            }
        }

        fn write_bytes(&mut self, data: &[u8]) -> Result<usize> {
            self.shared.with(|s| s.tx.extend_from_slice(data));
            Ok(data.len())
        }

        fn flush_input(&mut self) {
            self.shared.with(|s| {
                s.rx.clear();
                s.patterns.clear();
                s.run = 0;
            });
        }

        fn reset_event_queue(&mut self) {
            self.shared.events.clear();
        }

        fn pattern_pop_pos(&mut self) -> Option<usize> {
            self.shared.with(|s| s.patterns.pop_front())
        }

        fn buffered_len(&self) -> usize {
            self.shared.with(|s| s.rx.len())
        }
    }

}
