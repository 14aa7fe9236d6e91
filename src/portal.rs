//! Seam to the portal transport.
//!
//! Request construction, cookies and authentication live outside this crate.
//! A `PortalSource` only hands back the markup for the summary and register
//! pages, or a classified failure.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::models::CacheKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFailure {
    Timeout,
    Connection,
    HostUnreachable,
}

impl std::fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            NetworkFailure::Timeout => "timed out",
            NetworkFailure::Connection => "connection failed",
            NetworkFailure::HostUnreachable => "host unreachable",
        };
        f.write_str(label)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network {kind}: {message}")]
    Network {
        kind: NetworkFailure,
        message: String,
    },

    #[error("portal responded with an error: {0}")]
    Upstream(String),

    #[error("portal session expired")]
    SessionExpired,
}

impl FetchError {
    pub fn network(kind: NetworkFailure, message: impl Into<String>) -> Self {
        Self::Network {
            kind,
            message: message.into(),
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, FetchError::Network { .. })
    }
}

#[async_trait]
pub trait PortalSource: Send + Sync {
    /// Markup of the common page: one container per enrolled subject.
    async fn fetch_summary(&self, key: &CacheKey) -> Result<String, FetchError>;

    /// Markup of the register page: one header/body row pair per subject.
    async fn fetch_register(&self, key: &CacheKey) -> Result<String, FetchError>;
}

/// Serves markup saved to disk, for offline runs of the CLI.
#[derive(Debug, Clone)]
pub struct FileSource {
    summary: PathBuf,
    register: Option<PathBuf>,
}

impl FileSource {
    pub fn new(summary: impl Into<PathBuf>, register: Option<PathBuf>) -> Self {
        Self {
            summary: summary.into(),
            register,
        }
    }

    async fn read(path: &Path) -> Result<String, FetchError> {
        tokio::fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                FetchError::Upstream(format!("{} not found", path.display()))
            }
            std::io::ErrorKind::TimedOut => {
                FetchError::network(NetworkFailure::Timeout, e.to_string())
            }
            _ => FetchError::network(NetworkFailure::Connection, e.to_string()),
        })
    }
}

#[async_trait]
impl PortalSource for FileSource {
    async fn fetch_summary(&self, _key: &CacheKey) -> Result<String, FetchError> {
        Self::read(&self.summary).await
    }

    async fn fetch_register(&self, _key: &CacheKey) -> Result<String, FetchError> {
        match &self.register {
            Some(path) => Self::read(path).await,
            None => Err(FetchError::Upstream("no register markup configured".to_string())),
        }
    }
}
