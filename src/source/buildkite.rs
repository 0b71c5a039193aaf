//! Buildkite REST API source
//!
//! Listing: `GET {api}/organizations/{org}/pipelines/{pipeline}/builds/{n}/artifacts`
//! with the next page taken from the `Link` response header.
//! Download: `GET {download_url}`, which redirects to the stored object.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::LINK;
use stile_buildkite::{
    artifacts_path, endpoint_url, next_page_from_link, summarize_error_body, Artifact, ArtifactPage,
    ListOptions, LAST_PAGE,
};
use tracing::debug;

use super::{ArtifactSource, SourceError};
use crate::config::{ApiToken, BuildkiteSettings};
use crate::locator::ArtifactQuery;

const USER_AGENT: &str = concat!("stile-manifest/", env!("CARGO_PKG_VERSION"));

/// Blocking HTTPS client for the Buildkite artifacts API
pub struct BuildkiteSource {
    client: Client,
    api_base_url: String,
}

impl BuildkiteSource {
    /// Create a source from the `[buildkite]` settings
    pub fn new(settings: &BuildkiteSettings) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(settings.request_timeout_seconds))
            .build()
            .map_err(|e| SourceError::ClientConfig(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url.clone(),
        })
    }

    fn artifacts_url(&self, query: &ArtifactQuery) -> String {
        endpoint_url(
            &self.api_base_url,
            &artifacts_path(&query.org, &query.pipeline, &query.build_number),
        )
    }
}

/// Turn a non-success response into [`SourceError::Status`]
fn check_status(url: &str, response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(SourceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
        message: summarize_error_body(&body),
    })
}

impl ArtifactSource for BuildkiteSource {
    fn list_artifacts(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        options: ListOptions,
    ) -> Result<ArtifactPage, SourceError> {
        let url = self.artifacts_url(query);
        debug!(url = %url, page = ?options.page, "listing artifacts");

        let response = self
            .client
            .get(&url)
            .bearer_auth(token.expose())
            .query(&options.query_pairs())
            .send()?;
        let response = check_status(&url, response)?;

        let next_page = response
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .map(next_page_from_link)
            .unwrap_or(LAST_PAGE);

        let artifacts: Vec<Artifact> = response.json().map_err(|e| SourceError::InvalidResponse {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        Ok(ArtifactPage {
            artifacts,
            next_page,
        })
    }

    fn download(&self, token: &ApiToken, url: &str) -> Result<Vec<u8>, SourceError> {
        debug!(url = %url, "downloading artifact");

        // reqwest drops the Authorization header when the redirect leaves the API host
        let response = self.client.get(url).bearer_auth(token.expose()).send()?;
        let response = check_status(url, response)?;
        let bytes = response.bytes()?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    use super::*;
    use crate::config::{BuiltinDefaults, Settings};

    fn settings() -> BuildkiteSettings {
        Settings::from_value(BuiltinDefaults::default().to_value())
            .unwrap()
            .buildkite
    }

    /// Answer one connection per canned response; returns the base URL and
    /// a handle yielding each request's head
    fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = thread::spawn(move || {
            let mut heads = Vec::new();
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut head = String::new();
                loop {
                    let mut line = String::new();
                    if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                        break;
                    }
                    head.push_str(&line);
                }
                stream.write_all(response.as_bytes()).unwrap();
                heads.push(head);
            }
            heads
        });

        (base, handle)
    }

    fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    fn local_source(base: &str) -> BuildkiteSource {
        let mut settings = settings();
        settings.api_base_url = format!("{}/v2", base);
        BuildkiteSource::new(&settings).unwrap()
    }

    fn token() -> ApiToken {
        ApiToken::new("test-token")
    }

    fn query() -> ArtifactQuery {
        ArtifactQuery::new("manifest.json", "42", "p", "o")
    }

    #[test]
    fn test_list_without_link_is_last_page() {
        let body = r#"[{"id":"a1","filename":"manifest.json","download_url":"https://x/a1"}]"#;
        let (base, server) = serve(vec![response("200 OK", "", body)]);

        let page = local_source(&base)
            .list_artifacts(&token(), &query(), ListOptions::first(30))
            .unwrap();
        assert!(page.is_last());
        assert_eq!(page.artifacts.len(), 1);
        assert_eq!(page.artifacts[0].filename, "manifest.json");

        let heads = server.join().unwrap();
        let head = heads[0].to_ascii_lowercase();
        assert!(head.starts_with("get /v2/organizations/o/pipelines/p/builds/42/artifacts?per_page=30 "));
        assert!(head.contains("authorization: bearer test-token"));
    }

    #[test]
    fn test_list_follows_link_header() {
        let link = "Link: <http://127.0.0.1/v2/x?page=3&per_page=30>; rel=\"next\"\r\n";
        let (base, server) = serve(vec![response("200 OK", link, "[]")]);

        let page = local_source(&base)
            .list_artifacts(&token(), &query(), ListOptions::first(30).with_page(2))
            .unwrap();
        assert_eq!(page.next_page, 3);
        assert!(page.artifacts.is_empty());

        let heads = server.join().unwrap();
        assert!(heads[0].contains("page=2&per_page=30"));
    }

    #[test]
    fn test_list_error_status_summarizes_body() {
        let body = r#"{"message":"No build found"}"#;
        let (base, server) = serve(vec![response("404 Not Found", "", body)]);

        let err = local_source(&base)
            .list_artifacts(&token(), &query(), ListOptions::first(30))
            .unwrap_err();
        match err {
            SourceError::Status { status, message, .. } => {
                assert_eq!(status, 404);
                assert_eq!(message, "No build found");
            }
            other => panic!("expected Status, got {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_list_malformed_body() {
        let (base, server) = serve(vec![response("200 OK", "", "not json")]);

        let err = local_source(&base)
            .list_artifacts(&token(), &query(), ListOptions::first(30))
            .unwrap_err();
        assert!(matches!(err, SourceError::InvalidResponse { .. }));
        server.join().unwrap();
    }

    #[test]
    fn test_download_body_and_status() {
        let (base, server) = serve(vec![
            response("200 OK", "", r#"{"name":"m"}"#),
            response("502 Bad Gateway", "", "Bad Gateway\n<html></html>"),
        ]);
        let source = local_source(&base);
        let url = format!("{}/artifacts/a1/download", base);

        assert_eq!(source.download(&token(), &url).unwrap(), br#"{"name":"m"}"#.to_vec());

        match source.download(&token(), &url).unwrap_err() {
            SourceError::Status { status, message, .. } => {
                assert_eq!(status, 502);
                assert_eq!(message, "Bad Gateway");
            }
            other => panic!("expected Status, got {:?}", other),
        }
        server.join().unwrap();
    }

    #[test]
    fn test_artifacts_url() {
        let source = BuildkiteSource::new(&settings()).unwrap();
        let query = ArtifactQuery::new("manifest.json", "42", "big-friendly-pipeline", "stile-education");
        assert_eq!(
            source.artifacts_url(&query),
            "https://api.buildkite.com/v2/organizations/stile-education/pipelines/big-friendly-pipeline/builds/42/artifacts"
        );
    }

    #[test]
    fn test_custom_api_base() {
        let mut settings = settings();
        settings.api_base_url = "http://localhost:8080/v2/".to_string();
        let source = BuildkiteSource::new(&settings).unwrap();
        let query = ArtifactQuery::new("m", "1", "p", "o");
        assert_eq!(
            source.artifacts_url(&query),
            "http://localhost:8080/v2/organizations/o/pipelines/p/builds/1/artifacts"
        );
    }
}
