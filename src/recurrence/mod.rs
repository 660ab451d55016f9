//! Recurrence rules and series expansion.
//!
//! Everything here is pure: no storage access, no clock reads.

mod expander;
mod rule;

pub use expander::expand_series;
pub use rule::{ExpansionError, Recurrence};
