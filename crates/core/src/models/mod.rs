//! Data models for Signalhub

mod identity;

pub use identity::*;
