//! Attendance tracking for Group Scholar: markup extraction, an offline-aware
//! cache, a compliance projection and the coordinator tying them together.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod markup;
pub mod models;
pub mod portal;
pub mod projection;
pub mod report;

pub use error::{Error, Result};
