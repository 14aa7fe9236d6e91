//! Extraction of typed attendance records from portal markup.
//!
//! Two page shapes are understood: the summary ("common page") with one
//! container per subject, and the register table with one header/body row pair
//! per subject. A subject whose structure cannot be read is skipped and
//! reported; the rest of the batch is still returned.

pub mod fields;
pub mod link;
pub mod register;
pub mod summary;

use serde::{Deserialize, Serialize};

pub use link::{find_summary, link_registers};
pub use register::RegisterExtractor;
pub use summary::SummaryExtractor;

/// A subject whose container or a required field could not be located.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("subject #{position}{}: could not locate {missing}", subject.as_deref().map(|s| format!(" ({s})")).unwrap_or_default())]
pub struct MarkupStructureError {
    pub position: usize,
    pub subject: Option<String>,
    pub missing: String,
}

impl MarkupStructureError {
    pub fn new(position: usize, subject: Option<&str>, missing: impl Into<String>) -> Self {
        Self {
            position,
            subject: subject.map(str::to_string),
            missing: missing.into(),
        }
    }
}

/// Records read from one page plus the subjects that had to be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub skipped: Vec<MarkupStructureError>,
}

impl<T> Default for Extraction<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Extraction<T> {
    /// True when containers were found but every one of them failed.
    pub fn all_failed(&self) -> bool {
        self.records.is_empty() && !self.skipped.is_empty()
    }
}

/// Class names that anchor extraction in the portal's markup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupLayout {
    #[serde(default = "default_subject_container")]
    pub subject_container: String,
    #[serde(default = "default_subject_name")]
    pub subject_name: String,
    #[serde(default = "default_subject_code")]
    pub subject_code: String,
    #[serde(default = "default_register_table")]
    pub register_table: String,
}

impl Default for MarkupLayout {
    fn default() -> Self {
        Self {
            subject_container: default_subject_container(),
            subject_name: default_subject_name(),
            subject_code: default_subject_code(),
            register_table: default_register_table(),
        }
    }
}

fn default_subject_container() -> String {
    "subject-card".to_string()
}

fn default_subject_name() -> String {
    "subject-name".to_string()
}

fn default_subject_code() -> String {
    "subject-code".to_string()
}

fn default_register_table() -> String {
    "register".to_string()
}
