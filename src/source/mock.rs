//! In-memory artifact source
//!
//! Serves fixed listing pages and download bodies, records every call, and
//! can be told to fail a number of times per operation.

use std::collections::HashMap;
use std::sync::Mutex;

use stile_buildkite::{Artifact, ArtifactPage, ListOptions, LAST_PAGE};

use super::{ArtifactSource, SourceError};
use crate::config::ApiToken;
use crate::locator::ArtifactQuery;

/// Operations a failure can be injected into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceOperation {
    List,
    Download,
}

/// A call received by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    List { build_number: String, page: Option<u32> },
    Download { url: String },
}

/// Injected failure for one operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Message of the returned connection error
    pub message: String,
    /// Number of calls to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Fail every call
    pub fn always(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_count: None,
        }
    }

    /// Fail the first `count` calls, then succeed
    pub fn times(count: u32, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_count: Some(count),
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    calls: Vec<MockCall>,
    failures: HashMap<SourceOperation, FailureConfig>,
    call_counts: HashMap<SourceOperation, u32>,
}

impl MockState {
    /// Count the call and return the injected error, if it should fail
    fn check(&mut self, op: SourceOperation) -> Option<SourceError> {
        let config = self.failures.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        if let Some(limit) = config.fail_count {
            if *count > limit {
                return None;
            }
        }
        Some(SourceError::Connection(config.message.clone()))
    }
}

/// Configurable in-memory source for tests
#[derive(Debug, Default)]
pub struct MockSource {
    /// Listing pages; page numbers are 1-based indexes into this
    pages: Vec<Vec<Artifact>>,
    /// Download bodies by URL
    contents: HashMap<String, Vec<u8>>,
    state: Mutex<MockState>,
}

impl MockSource {
    /// A source whose build has no artifacts
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listing page
    pub fn with_page(mut self, artifacts: Vec<Artifact>) -> Self {
        self.pages.push(artifacts);
        self
    }

    /// Serve `content` at `url`
    pub fn with_content(mut self, url: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.contents.insert(url.into(), content.into());
        self
    }

    /// Convenience: one page holding one artifact with its content
    pub fn with_artifact(self, filename: &str, content: impl Into<Vec<u8>>) -> Self {
        let url = format!("https://artifacts.test/{}", filename);
        self.with_page(vec![mock_artifact(filename, &url)]).with_content(url, content)
    }

    /// Inject a failure into an operation
    pub fn with_failure(self, op: SourceOperation, config: FailureConfig) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.failures.insert(op, config);
            state.call_counts.insert(op, 0);
        }
        self
    }

    /// All calls received so far, in order
    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls().len()
    }

    /// URLs downloaded so far
    pub fn downloads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::Download { url } => Some(url),
                MockCall::List { .. } => None,
            })
            .collect()
    }

    fn record(&self, call: MockCall, op: SourceOperation) -> Result<(), SourceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| SourceError::Connection("mock state poisoned".to_string()))?;
        state.calls.push(call);
        match state.check(op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Build an artifact record with a generated id
pub fn mock_artifact(filename: &str, download_url: &str) -> Artifact {
    Artifact {
        id: format!("id-{}", filename),
        filename: filename.to_string(),
        path: Some(filename.to_string()),
        download_url: download_url.to_string(),
        state: Some("finished".to_string()),
        ..Default::default()
    }
}

impl ArtifactSource for MockSource {
    fn list_artifacts(
        &self,
        _token: &ApiToken,
        query: &ArtifactQuery,
        options: ListOptions,
    ) -> Result<ArtifactPage, SourceError> {
        self.record(
            MockCall::List {
                build_number: query.build_number.clone(),
                page: options.page,
            },
            SourceOperation::List,
        )?;

        let page = options.page.unwrap_or(1).max(1) as usize;
        let artifacts = self.pages.get(page - 1).cloned().unwrap_or_default();
        let next_page = if page < self.pages.len() {
            (page + 1) as u32
        } else {
            LAST_PAGE
        };

        Ok(ArtifactPage {
            artifacts,
            next_page,
        })
    }

    fn download(&self, _token: &ApiToken, url: &str) -> Result<Vec<u8>, SourceError> {
        self.record(
            MockCall::Download {
                url: url.to_string(),
            },
            SourceOperation::Download,
        )?;

        self.contents.get(url).cloned().ok_or_else(|| SourceError::Status {
            url: url.to_string(),
            status: 404,
            message: "Not Found".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ApiToken {
        ApiToken::new("test-token")
    }

    fn query() -> ArtifactQuery {
        ArtifactQuery::new("manifest.json", "42", "p", "o")
    }

    #[test]
    fn test_pages_link_to_each_other() {
        let source = MockSource::new()
            .with_page(vec![mock_artifact("a.json", "https://x/a")])
            .with_page(vec![mock_artifact("b.json", "https://x/b")]);

        let first = source.list_artifacts(&token(), &query(), ListOptions::first(30)).unwrap();
        assert_eq!(first.artifacts[0].filename, "a.json");
        assert_eq!(first.next_page, 2);

        let second = source
            .list_artifacts(&token(), &query(), ListOptions::first(30).with_page(2))
            .unwrap();
        assert_eq!(second.artifacts[0].filename, "b.json");
        assert!(second.is_last());
    }

    #[test]
    fn test_empty_build() {
        let source = MockSource::new();
        let page = source.list_artifacts(&token(), &query(), ListOptions::first(30)).unwrap();
        assert!(page.artifacts.is_empty());
        assert!(page.is_last());
    }

    #[test]
    fn test_failure_count() {
        let source = MockSource::new()
            .with_artifact("manifest.json", "{}")
            .with_failure(SourceOperation::List, FailureConfig::times(2, "connection reset"));

        assert!(source.list_artifacts(&token(), &query(), ListOptions::first(30)).is_err());
        assert!(source.list_artifacts(&token(), &query(), ListOptions::first(30)).is_err());
        assert!(source.list_artifacts(&token(), &query(), ListOptions::first(30)).is_ok());
        assert_eq!(source.call_count(), 3);
    }

    #[test]
    fn test_download_unknown_url() {
        let source = MockSource::new();
        let err = source.download(&token(), "https://x/missing").unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(source.downloads(), vec!["https://x/missing".to_string()]);
    }
}
