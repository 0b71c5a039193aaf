//! Built-in defaults (layer 1)

use serde::{Deserialize, Serialize};

use crate::retry::{DEFAULT_DELAY_SECONDS, DEFAULT_MAX_ATTEMPTS};

/// Organization slug that owns the manifest pipeline
pub const DEFAULT_ORG: &str = "stile-education";

/// Pipeline slug that publishes manifests
pub const DEFAULT_PIPELINE: &str = "big-friendly-pipeline";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Architecture to project (default: "" = top-level view)
    pub architecture: String,

    /// Buildkite organization slug (default: "stile-education")
    pub org: String,

    /// Buildkite pipeline slug (default: "big-friendly-pipeline")
    pub pipeline: String,

    /// REST API root (default: "https://api.buildkite.com/v2")
    pub api_base_url: String,

    /// Artifacts per listing page (default: 30)
    pub per_page: u32,

    /// Per-request HTTP timeout in seconds (default: 30)
    pub request_timeout_seconds: u64,

    /// Lookup attempts (default: 5)
    pub max_attempts: u32,

    /// Delay between attempts in seconds (default: 5)
    pub delay_seconds: u64,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            architecture: String::new(),
            org: DEFAULT_ORG.to_string(),
            pipeline: DEFAULT_PIPELINE.to_string(),
            api_base_url: stile_buildkite::API_BASE_URL.to_string(),
            per_page: stile_buildkite::DEFAULT_PER_PAGE,
            request_timeout_seconds: 30,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_seconds: DEFAULT_DELAY_SECONDS,
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "manifest": {
                "architecture": self.architecture
            },
            "buildkite": {
                "org": self.org,
                "pipeline": self.pipeline,
                "api_base_url": self.api_base_url,
                "per_page": self.per_page,
                "request_timeout_seconds": self.request_timeout_seconds
            },
            "retry": {
                "max_attempts": self.max_attempts,
                "delay_seconds": self.delay_seconds
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let defaults = BuiltinDefaults::default();
        assert_eq!(defaults.org, "stile-education");
        assert_eq!(defaults.pipeline, "big-friendly-pipeline");
        assert_eq!(defaults.max_attempts, 5);
        assert_eq!(defaults.delay_seconds, 5);
        assert!(defaults.architecture.is_empty());
    }

    #[test]
    fn test_to_value_structure() {
        let value = BuiltinDefaults::default().to_value();
        assert_eq!(value["buildkite"]["api_base_url"], "https://api.buildkite.com/v2");
        assert_eq!(value["buildkite"]["per_page"], 30);
        assert_eq!(value["retry"]["max_attempts"], 5);
        assert!(value["manifest"].get("manifest_name").is_none());
    }
}
