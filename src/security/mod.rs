//! Security module.
//!
//! Classifies captured probes by attack category.

pub mod classifier;

pub use classifier::*;
