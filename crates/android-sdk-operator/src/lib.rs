//! Android SDK operator process wiring: configuration and controller runners

pub mod config;
pub mod controller_runner;
