//! Structured logging with store and capture context.
//!
//! Provides logging macros and utilities that include the store name and
//! capture id in every log message for easy correlation.

pub mod structured;

pub use structured::*;
