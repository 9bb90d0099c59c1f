//! Shared wire and domain types for the LAN chat messaging router.
//!
//! The DB crate keeps its own row types; everything that crosses a process
//! boundary (HTTP bodies, WebSocket frames, JWT claims) lives here.

pub mod api;
pub mod encoding;
pub mod events;
pub mod models;
