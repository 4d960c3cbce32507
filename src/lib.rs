//! Matrixon pseudo-identity server
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Wires the pseudo-identity store, the membership engine and the client
//! API together. `main.rs` only parses arguments, loads configuration and
//! serves the router built here.

pub mod service;

pub use matrixon_core::{Config, MatrixonError, Result};
pub use service::Services;
