//! Readiness multiplexer driving every connection on one thread.

pub mod listener;

pub use listener::{Server, ShutdownHandle};
