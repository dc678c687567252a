//! Taskboard client library: real-time Kanban board sync.
//!
//! The [`board`] module holds the reconciliation engine, [`sync`] connects
//! it to a server through the seams in [`gateway`], and [`transport`]
//! provides the WebSocket implementation of those seams.

pub mod board;
pub mod config;
pub mod gateway;
pub mod observer;
pub mod session;
pub mod sync;
pub mod transport;
