//! Matrixon Core Library
//!
//! Author: arkSong <arksong2018@gmail.com>
//! Version: 0.11.0-alpha
//! Date: 2024-03-21
//!
//! Shared building blocks for Matrixon room-scoped pseudo-identities:
//! the error type, numeric identifiers, pseudo-identity keys, the traits
//! the leave handling code consumes, and configuration.
//!
//! # Examples
//! ```rust
//! use matrixon_core::{types::{PseudoIdKey, SenderId}, Config, Result};
//!
//! fn example() -> Result<()> {
//!     let config = Config::default();
//!     config.validate()?;
//!
//!     let key = PseudoIdKey::generate();
//!     let sender = SenderId::from_public_key(&key.public_key());
//!     assert_eq!(sender.to_public_key()?, key.public_key());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::{Config, DatabaseBackend, DatabaseConfig};
pub use error::{MatrixonError, Result};
