//! Flavmux - sensory track muxing for MP4 files
//!
//! This library crate exposes the command-line configuration for integration testing.
//! The muxing itself lives in `flavmux-media`.

pub mod config;
