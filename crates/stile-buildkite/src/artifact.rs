//! Artifact records returned by the listing endpoint.

use serde::{Deserialize, Serialize};

/// A single artifact uploaded by a build job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    /// Artifact UUID
    #[serde(default)]
    pub id: String,

    /// Job that uploaded the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,

    /// API URL of the artifact record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// URL that redirects to the artifact content
    #[serde(default)]
    pub download_url: String,

    /// Upload state (e.g. "new", "finished", "error")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Path as uploaded, relative to the job's working directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirname: Option<String>,

    /// Base file name; this is what manifests are matched against
    #[serde(default)]
    pub filename: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Size in bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha1sum: Option<String>,
}

impl Artifact {
    /// True when `name` equals this artifact's file name or id.
    pub fn matches(&self, name: &str) -> bool {
        self.filename == name || self.id == name
    }

    /// Tab-indented JSON, as printed when browsing a build's artifacts.
    pub fn to_indented_json(&self) -> Result<String, serde_json::Error> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut ser)?;
        // serde_json only ever emits valid UTF-8
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// One page of a paginated artifact listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactPage {
    /// Records in provider order
    pub artifacts: Vec<Artifact>,

    /// Page number to request next, or [`crate::LAST_PAGE`] when this was the final page
    pub next_page: u32,
}

impl ArtifactPage {
    /// True if the provider reported no further pages.
    pub fn is_last(&self) -> bool {
        self.next_page == crate::LAST_PAGE
    }
}
