use std::error::Error as StdError;

use crate::portal::FetchError;

/// Error type shared by the cache and coordinator.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid config: {0}")]
    Config(String),

    #[error("portal fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("markup could not be read: {0}")]
    Markup(String),

    #[error("a fetch is already in flight for {0}")]
    RefreshInFlight(String),

    #[error("coordinator for {0} has been shut down")]
    ShutDown(String),

    #[error("cache error: {context}")]
    Cache {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync + 'static>,
    },
}

impl Error {
    pub fn cache(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Cache {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// True when the failure came from the transport rather than the portal or parser.
    pub fn is_network(&self) -> bool {
        matches!(self, Error::Fetch(e) if e.is_network())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
