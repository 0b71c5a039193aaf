//! Artifact sources
//!
//! Abstracts the CI artifact store for testability:
//! - `ArtifactSource`: list one page of a build's artifacts, download by URL
//! - `BuildkiteSource`: Buildkite REST API over HTTPS
//! - `MockSource`: in-memory pages with failure injection

mod buildkite;
mod mock;

pub use buildkite::BuildkiteSource;
pub use mock::{mock_artifact, FailureConfig, MockCall, MockSource, SourceOperation};

use stile_buildkite::{ArtifactPage, ListOptions};

use crate::config::ApiToken;
use crate::locator::ArtifactQuery;

/// Read-only access to a build's artifacts
pub trait ArtifactSource {
    /// Fetch one page of the artifact listing for the query's build
    fn list_artifacts(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        options: ListOptions,
    ) -> Result<ArtifactPage, SourceError>;

    /// Download an artifact's content
    fn download(&self, token: &ApiToken, url: &str) -> Result<Vec<u8>, SourceError>;
}

impl<S: ArtifactSource + ?Sized> ArtifactSource for &S {
    fn list_artifacts(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        options: ListOptions,
    ) -> Result<ArtifactPage, SourceError> {
        (**self).list_artifacts(token, query, options)
    }

    fn download(&self, token: &ApiToken, url: &str) -> Result<Vec<u8>, SourceError> {
        (**self).download(token, url)
    }
}

/// Source errors
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Failed to configure HTTP client: {0}")]
    ClientConfig(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}: {message}")]
    Status {
        url: String,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },

    #[error("Connection failed: {0}")]
    Connection(String),
}

impl SourceError {
    /// HTTP status code, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            SourceError::Status { status, .. } => Some(*status),
            SourceError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}
