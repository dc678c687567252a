//! Taskboard server library.
//!
//! Exposes the authoritative side of the taskboard for tests and embedding:
//! the in-memory task store, the live update broadcaster, and the WebSocket
//! server that ties them together.

pub mod broadcast;
pub mod config;
pub mod gateway;
pub mod ratelimit;
pub mod server;
pub mod store;
