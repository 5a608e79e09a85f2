//! Chassismon - chassis hardware-condition monitor
//!
//! The engine lives in `cm-core` and the daemon in `cm-daemon`. This crate
//! holds `chassisctl`, the command-line client for the daemon's alarm socket.

pub mod cli;
pub mod render;
