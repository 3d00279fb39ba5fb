//! blinkshell firmware library.
//!
//! Button press classification, an LED blink timer and a serial shell whose
//! `period=<ms>` command retunes the blink. Exposes every module for
//! integration testing; ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

// Links the std critical-section implementation used by embassy-sync on host.
#[cfg(not(target_os = "espidf"))]
use critical_section as _;

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod error;
pub mod events;
pub mod pins;
