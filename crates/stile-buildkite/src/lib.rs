//! Buildkite API Types
//!
//! Defines the JSON records and pagination conventions of the Buildkite
//! REST artifacts API used to locate build manifests.

pub mod artifact;
pub mod error;
pub mod page;

pub use artifact::{Artifact, ArtifactPage};
pub use error::{summarize_error_body, ApiErrorBody};
pub use page::{next_page_from_link, ListOptions, LAST_PAGE};

/// Default REST API root.
pub const API_BASE_URL: &str = "https://api.buildkite.com/v2";

/// Largest page size the artifacts endpoint accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Page size used when none is configured.
pub const DEFAULT_PER_PAGE: u32 = 30;

/// Path of the artifact listing endpoint for one build, relative to the API root.
pub fn artifacts_path(org: &str, pipeline: &str, build_number: &str) -> String {
    format!(
        "organizations/{}/pipelines/{}/builds/{}/artifacts",
        org, pipeline, build_number
    )
}

/// Join an API root and a relative endpoint path.
pub fn endpoint_url(api_base_url: &str, path: &str) -> String {
    format!("{}/{}", api_base_url.trim_end_matches('/'), path)
}
