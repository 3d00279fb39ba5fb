//! Core-pinned task spawning.
//!
//! Wraps `esp_pthread_set_cfg()` so that `std::thread::Builder::spawn`
//! creates a FreeRTOS task pinned to a specific CPU core with explicit
//! priority and stack size. On non-ESP targets, falls back to a plain
//! thread.
//!
//! # ESP-IDF Threading Model
//!
//! ESP-IDF implements `std::thread` via pthreads, which are thin wrappers
//! around FreeRTOS tasks. `esp_pthread_set_cfg()` sets thread-local
//! configuration that applies to the *next* `pthread_create()` call from
//! the calling thread, so the config→spawn pair must not be interleaved
//! with other thread creation on the same thread.

use std::thread::JoinHandle;

use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;
use crate::error::{InitError, Result};

/// CPU core identifiers for the ESP32 dual-core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Core {
    /// Core 0 (PRO_CPU), shared with the protocol stacks.
    Pro = 0,
    /// Core 1 (APP_CPU), application tasks.
    App = 1,
}

/// Spawn `f` as a task configured by `task`.
///
/// `name` must be null-terminated (e.g. `"uart-rx\0"`).
pub fn spawn_task(
    name: &'static str,
    task: &TaskConfig,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    spawn_on_core(task.core, task.priority, task.stack_kb, name, f)
}

/// Spawn a thread pinned to a specific core with explicit priority and stack.
#[cfg(target_os = "espidf")]
pub fn spawn_on_core(
    core: Core,
    priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    let display_name = name.trim_end_matches('\0');

    // SAFETY: `cfg` is fully initialised by the IDF default constructor and
    // `name` is a 'static, null-terminated string.
    let ret = unsafe {
        let mut cfg = esp_idf_sys::esp_create_default_pthread_config();
        cfg.pin_to_core = core as _;
        cfg.prio = priority as _;
        cfg.stack_size = (stack_kb * 1024) as _;
        cfg.thread_name = name.as_ptr().cast();
        esp_idf_sys::esp_pthread_set_cfg(&cfg)
    };
    if ret != esp_idf_sys::ESP_OK as i32 {
        log::error!("task: esp_pthread_set_cfg for '{}' failed (rc={})", display_name, ret);
        return Err(InitError::TaskSpawn(display_name).into());
    }

    log::info!(
        "task: spawning '{}' on {:?} (pri={}, stack={}KB)",
        display_name,
        core,
        priority,
        stack_kb
    );

    std::thread::Builder::new()
        .name(display_name.into())
        .spawn(f)
        .map_err(|_| InitError::TaskSpawn(display_name).into())
}

/// Host fallback: ignores core affinity and priority.
#[cfg(not(target_os = "espidf"))]
pub fn spawn_on_core(
    _core: Core,
    _priority: u8,
    stack_kb: usize,
    name: &'static str,
    f: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    // Host threads format and allocate far more than the firmware tasks do.
    const HOST_MIN_STACK_KB: usize = 64;

    let display_name = name.trim_end_matches('\0');
    log::debug!("task: spawning '{}' (sim, no core pinning)", display_name);

    std::thread::Builder::new()
        .name(display_name.into())
        .stack_size(stack_kb.max(HOST_MIN_STACK_KB) * 1024)
        .spawn(f)
        .map_err(|_| InitError::TaskSpawn(display_name).into())
}
