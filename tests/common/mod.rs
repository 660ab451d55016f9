//! Common test infrastructure
//!
//! Integration tests build a [`TestStores`] fixture: file-backed job queue and
//! occurrence databases in a temporary directory, plus helpers to seed base
//! events and enqueue expansion jobs.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestStores, BASE_EVENT_ID};
//!
//! #[test]
//! fn test_expand() {
//!     let stores = TestStores::new();
//!     stores.seed_base_event(BASE_EVENT_ID, common::base_date(), "Daily");
//! }
//! ```

#![allow(dead_code)]

mod constants;
mod fixtures;

pub use constants::*;
pub use fixtures::{base_date, days_after_base, worker_settings, TestStores};
