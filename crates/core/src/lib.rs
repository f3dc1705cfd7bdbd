//! Signalhub Core Library
//!
//! Identity model and configuration shared by the relay crates.

pub mod config;
pub mod error;
pub mod models;

pub use config::{Config, HubConfig, ServerConfig};
pub use error::{Error, Result};
pub use models::*;
