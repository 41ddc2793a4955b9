//! Flow feature derivation.

pub mod derive;

pub use derive::*;
