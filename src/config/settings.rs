//! Typed settings read from the merged configuration

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

use super::ConfigError;

/// Fully merged settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub manifest: ManifestSection,
    pub buildkite: BuildkiteSettings,
    pub retry: RetryPolicy,
}

/// The `[manifest]` table: which manifest to read and how to project it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestSection {
    /// Artifact file name or id; empty lists every artifact instead
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_name: Option<String>,

    /// Build number of the manifest pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bfp_build_number: Option<u64>,

    /// Architecture key to project; empty selects the top-level view
    #[serde(default)]
    pub architecture: String,

    /// Literal manifest JSON used when the artifact does not exist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_manifest: Option<String>,
}

/// Validated inputs for one manifest read
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestInputs {
    pub manifest_name: String,
    pub bfp_build_number: u64,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_manifest: Option<String>,
}

impl ManifestInputs {
    pub fn new(manifest_name: impl Into<String>, bfp_build_number: u64) -> Self {
        Self {
            manifest_name: manifest_name.into(),
            bfp_build_number,
            architecture: String::new(),
            fallback_manifest: None,
        }
    }

    pub fn with_architecture(mut self, architecture: impl Into<String>) -> Self {
        self.architecture = architecture.into();
        self
    }

    pub fn with_fallback(mut self, fallback_manifest: impl Into<String>) -> Self {
        self.fallback_manifest = Some(fallback_manifest.into());
        self
    }

    /// Same manifest, build and architecture; the fallback text is ignored
    pub fn same_target(&self, other: &ManifestInputs) -> bool {
        self.manifest_name == other.manifest_name
            && self.bfp_build_number == other.bfp_build_number
            && self.architecture == other.architecture
    }
}

impl ManifestSection {
    /// Check required fields are present
    pub fn require(&self) -> Result<ManifestInputs, ConfigError> {
        let manifest_name = self
            .manifest_name
            .clone()
            .ok_or(ConfigError::MissingField("manifest.manifest_name"))?;
        let bfp_build_number = self
            .bfp_build_number
            .ok_or(ConfigError::MissingField("manifest.bfp_build_number"))?;

        Ok(ManifestInputs {
            manifest_name,
            bfp_build_number,
            architecture: self.architecture.clone(),
            fallback_manifest: self.fallback_manifest.clone(),
        })
    }
}

/// The `[buildkite]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildkiteSettings {
    pub org: String,
    pub pipeline: String,
    pub api_base_url: String,
    pub per_page: u32,
    pub request_timeout_seconds: u64,
}

impl BuildkiteSettings {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.org.is_empty() {
            return Err(ConfigError::invalid("buildkite.org", "must not be empty"));
        }
        if self.pipeline.is_empty() {
            return Err(ConfigError::invalid("buildkite.pipeline", "must not be empty"));
        }
        if !(self.api_base_url.starts_with("https://") || self.api_base_url.starts_with("http://")) {
            return Err(ConfigError::invalid(
                "buildkite.api_base_url",
                format!("must be an http(s) URL, got {:?}", self.api_base_url),
            ));
        }
        if self.per_page == 0 || self.per_page > stile_buildkite::MAX_PER_PAGE {
            return Err(ConfigError::invalid(
                "buildkite.per_page",
                format!("must be in [1, {}], got {}", stile_buildkite::MAX_PER_PAGE, self.per_page),
            ));
        }
        if self.request_timeout_seconds == 0 || self.request_timeout_seconds > 300 {
            return Err(ConfigError::invalid(
                "buildkite.request_timeout_seconds",
                format!("must be in [1, 300], got {}", self.request_timeout_seconds),
            ));
        }
        Ok(())
    }
}

impl Settings {
    /// Deserialize from a merged config value and validate
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let settings: Settings = serde_json::from_value(value)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.buildkite.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuiltinDefaults;

    #[test]
    fn test_defaults_deserialize() {
        let settings = Settings::from_value(BuiltinDefaults::default().to_value()).unwrap();
        assert_eq!(settings.buildkite.org, "stile-education");
        assert_eq!(settings.retry, RetryPolicy::default());
        assert_eq!(settings.manifest, ManifestSection::default());
    }

    #[test]
    fn test_require_missing_fields() {
        let section = ManifestSection::default();
        assert!(matches!(
            section.require(),
            Err(ConfigError::MissingField("manifest.manifest_name"))
        ));

        let section = ManifestSection {
            manifest_name: Some("manifest.json".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            section.require(),
            Err(ConfigError::MissingField("manifest.bfp_build_number"))
        ));
    }

    #[test]
    fn test_require_complete() {
        let section = ManifestSection {
            manifest_name: Some("manifest.json".to_string()),
            bfp_build_number: Some(42),
            architecture: "IntelLinux".to_string(),
            fallback_manifest: None,
        };
        let inputs = section.require().unwrap();
        assert_eq!(
            inputs,
            ManifestInputs::new("manifest.json", 42).with_architecture("IntelLinux")
        );
    }

    #[test]
    fn test_validate_per_page() {
        let mut value = BuiltinDefaults::default().to_value();
        value["buildkite"]["per_page"] = serde_json::json!(500);
        let err = Settings::from_value(value).unwrap_err();
        assert!(err.to_string().contains("buildkite.per_page"));
    }

    #[test]
    fn test_validate_api_url() {
        let mut value = BuiltinDefaults::default().to_value();
        value["buildkite"]["api_base_url"] = serde_json::json!("api.buildkite.com");
        assert!(Settings::from_value(value).is_err());
    }

    #[test]
    fn test_validate_retry() {
        let mut value = BuiltinDefaults::default().to_value();
        value["retry"]["max_attempts"] = serde_json::json!(0);
        assert!(matches!(
            Settings::from_value(value),
            Err(ConfigError::Retry(_))
        ));
    }

    #[test]
    fn test_negative_build_number_rejected() {
        let mut value = BuiltinDefaults::default().to_value();
        value["manifest"]["bfp_build_number"] = serde_json::json!(-1);
        assert!(matches!(
            Settings::from_value(value),
            Err(ConfigError::Invalid(_))
        ));
    }
}
