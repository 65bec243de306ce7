//! Core in-memory stores
//!
//! Holds the state the reconciliation engine owns:
//! - Bounded newest-first vitals history for the selected patient
//! - Deduplicated set of unacknowledged alerts
//!
//! Both stores are synchronous and infallible. Filtering of foreign or
//! stale data happens here so callers can feed them raw events.

pub mod alerts;
pub mod vitals;

pub use alerts::{AlertChange, AlertSet};
pub use vitals::{VitalsBuffer, VITALS_CAPACITY};
