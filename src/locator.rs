//! Artifact locator
//!
//! Walks a build's artifact listing page by page and downloads the first
//! artifact whose file name or id matches the query. An empty artifact name
//! prints every record instead and never finds anything.

use std::io::{self, Write};

use serde::{Deserialize, Serialize};
use stile_buildkite::{Artifact, ListOptions};
use tracing::{debug, info, warn};

use crate::config::ApiToken;
use crate::diagnostics::DiagnosticError;
use crate::source::{ArtifactSource, SourceError};

/// Identifies one artifact within one build's artifact set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactQuery {
    /// File name or artifact id; empty lists the build's artifacts
    pub artifact_name: String,
    pub build_number: String,
    pub pipeline: String,
    pub org: String,
}

impl ArtifactQuery {
    pub fn new(
        artifact_name: impl Into<String>,
        build_number: impl Into<String>,
        pipeline: impl Into<String>,
        org: impl Into<String>,
    ) -> Self {
        Self {
            artifact_name: artifact_name.into(),
            build_number: build_number.into(),
            pipeline: pipeline.into(),
            org: org.into(),
        }
    }

    /// True when no name was given and every record should be printed
    pub fn is_discovery(&self) -> bool {
        self.artifact_name.is_empty()
    }
}

/// A matched and downloaded artifact
#[derive(Debug, Clone, PartialEq)]
pub struct FoundArtifact {
    pub artifact: Artifact,
    pub content: Vec<u8>,
}

/// Result of one locate attempt
#[derive(Debug)]
pub enum ResolvedArtifact {
    Found(FoundArtifact),
    NotFound,
    TransientError(LocateError),
}

impl ResolvedArtifact {
    pub fn is_found(&self) -> bool {
        matches!(self, ResolvedArtifact::Found(_))
    }
}

/// Locate failures; all of them may succeed on a later attempt
#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("Unable to list buildkite artifacts for build {build_number} in pipeline {org}/{pipeline}: {source}")]
    Listing {
        build_number: String,
        org: String,
        pipeline: String,
        source: SourceError,
    },

    #[error("Unable to download artifact at URL {url}: {source}")]
    Download { url: String, source: SourceError },

    #[error("Failed to encode artifact as JSON: {0}")]
    Encode(#[source] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl LocateError {
    /// Structured summary/detail for errors this crate recognizes.
    ///
    /// Returns `None` for errors passed through from the I/O layer.
    pub fn diagnostic_error(&self) -> Option<DiagnosticError> {
        match self {
            LocateError::Listing {
                build_number,
                org,
                pipeline,
                source,
            } => Some(DiagnosticError::new(
                format!(
                    "Unable to list buildkite artifacts for build {} in pipeline {}/{}",
                    build_number, org, pipeline
                ),
                format!(
                    "This can mean the artifact does not exist or your Buildkite API token has insufficient permission to access it: {}",
                    source
                ),
            )),
            LocateError::Download { url, source } => Some(DiagnosticError::new(
                format!("Unable to download artifact at URL {}", url),
                format!("Artifact download failed: {}\nAre you on the VPN?", source),
            )),
            LocateError::Encode(e) => Some(DiagnosticError::new(
                "Failed to encode artifact as JSON",
                e.to_string(),
            )),
            LocateError::Io(_) => None,
        }
    }
}

/// Finds and downloads artifacts from a source
pub struct Locator<S> {
    source: S,
    per_page: u32,
}

impl<S: ArtifactSource> Locator<S> {
    pub fn new(source: S, per_page: u32) -> Self {
        Self { source, per_page }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Search the query's build for the artifact.
    ///
    /// In discovery mode every record is written to `discovery` as indented
    /// JSON and the result is always `NotFound`.
    pub fn locate(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        discovery: &mut dyn Write,
    ) -> ResolvedArtifact {
        match self.search(token, query, discovery) {
            Ok(Some(found)) => ResolvedArtifact::Found(found),
            Ok(None) => ResolvedArtifact::NotFound,
            Err(e) => ResolvedArtifact::TransientError(e),
        }
    }

    fn search(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        discovery: &mut dyn Write,
    ) -> Result<Option<FoundArtifact>, LocateError> {
        let mut options = ListOptions::first(self.per_page);
        let mut current = 1;

        loop {
            let page = self
                .source
                .list_artifacts(token, query, options)
                .map_err(|source| LocateError::Listing {
                    build_number: query.build_number.clone(),
                    org: query.org.clone(),
                    pipeline: query.pipeline.clone(),
                    source,
                })?;
            debug!(
                page = ?options.page,
                count = page.artifacts.len(),
                next_page = page.next_page,
                "received artifact page"
            );

            for artifact in &page.artifacts {
                if query.is_discovery() {
                    let json = artifact.to_indented_json().map_err(LocateError::Encode)?;
                    writeln!(discovery, "{}", json)?;
                } else if artifact.matches(&query.artifact_name) {
                    let content = self
                        .source
                        .download(token, &artifact.download_url)
                        .map_err(|source| LocateError::Download {
                            url: artifact.download_url.clone(),
                            source,
                        })?;
                    info!(
                        artifact = %artifact.filename,
                        id = %artifact.id,
                        bytes = content.len(),
                        "downloaded artifact"
                    );
                    return Ok(Some(FoundArtifact {
                        artifact: artifact.clone(),
                        content,
                    }));
                }
            }

            if page.is_last() {
                break;
            }
            if page.next_page <= current {
                warn!(
                    current,
                    next_page = page.next_page,
                    "listing does not advance, treating page as last"
                );
                break;
            }
            current = page.next_page;
            options = options.with_page(current);
        }

        info!(
            "Could not find manifest {} for build number {} in {}/{}",
            query.artifact_name, query.build_number, query.org, query.pipeline
        );
        Ok(None)
    }
}
