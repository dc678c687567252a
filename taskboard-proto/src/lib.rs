//! Shared protocol definitions for the taskboard wire format.

pub mod codec;
pub mod event;
pub mod task;
pub mod wire;
