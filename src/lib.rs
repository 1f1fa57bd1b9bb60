//! nudged - session keep-alive daemon.
//!
//! Periodically injects harmless input (small cursor loops, key taps) and stays
//! out of the way while a human is using the machine.

pub mod backend;
pub mod config;
pub mod domain;
pub mod movement;
pub mod pause;
pub mod scheduler;
pub mod watcher;

#[cfg(test)]
mod testing;
