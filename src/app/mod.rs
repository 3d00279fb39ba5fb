//! Application core: press dispatch, serial command handling and wiring.
//!
//! Everything here talks to hardware only through the **port traits** in
//! [`ports`], so the whole layer runs on the host against mocks.

pub mod commands;
pub mod context;
pub mod dispatcher;
pub mod events;
pub mod hold;
pub mod ports;
pub mod stream;
