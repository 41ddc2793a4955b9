//! Request body extraction module.
//!
//! Pulls credentials out of captured login attempts.

pub mod credentials;
pub mod json_path;

pub use credentials::*;
pub use json_path::*;
