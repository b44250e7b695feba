//! # af-core
//!
//! Shared foundation for the audioforge service: the unified [`Error`] type
//! and the application [`config`](crate::config) types.

pub mod config;
pub mod error;

pub use error::{Error, Result};
