//! EmberWatch: a real-time clinical monitoring client
//!
//! EmberWatch keeps a live, bounded and consistent picture of patient
//! vitals and alerts while REST snapshots, periodic analytics refreshes
//! and a push stream arrive in any order.

pub mod api;
pub mod clinical;
pub mod config;
pub mod engine;
pub mod error;
pub mod storage;
pub mod timeseries;

pub use engine::{DashboardView, MonitorSession, ReconciliationEngine, SessionHandle, SessionSettings};
pub use error::EmberError;
