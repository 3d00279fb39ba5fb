//! Adapters: concrete implementations of the port traits.
//!
//! | Adapter    | Implements   | Connects to                          |
//! |------------|--------------|--------------------------------------|
//! | `log_sink` | EventSink    | Serial log output                    |
//! | `time`     | TickSource   | FreeRTOS tick counter / host clock   |
//! | `uart`     | SerialPort   | IDF UART driver / host simulation    |

pub mod log_sink;
pub mod time;
pub mod uart;
