//! Hardware-independent telemetry core for the air-quality monitor node
//!
//! This crate decides when a fresh sensor reading is worth sending, packs
//! the latest readings into the 11-byte uplink frame, runs the CO2
//! background calibration sequence and drives the transmit retry loop.
//! Sensor drivers, the radio modem, the status LED and the diagnostic
//! console are collaborators behind traits.
//!
//! It is `#![no_std]` with `extern crate alloc` so it compiles on both
//! embedded targets and desktop hosts (for the simulator and tests).

#![no_std]

extern crate alloc;

pub mod app_state;
pub mod calibration;
pub mod config;
pub mod diagnostics;
pub mod frame;
pub mod indicator;
pub mod publish;
pub mod scheduler;
pub mod sensors;
pub mod snapshot;
pub mod status;
pub mod transmit;
pub mod transport;

#[cfg(test)]
mod testing;
