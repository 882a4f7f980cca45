//! Shared types for the remote relay crates: the error taxonomy and the
//! TOML configuration model.

pub mod config;
pub mod error;

pub use error::{Error, Result};
