//! Shared fixtures for integration tests

use std::path::{Path, PathBuf};

use stile_manifest::config::{BuiltinDefaults, Settings};
use stile_manifest::{Environment, Locator, ManifestReader, MockSource, RecordingSleeper, Resolver};

/// Path to the sample manifest fixture
pub fn manifest_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/manifest.json")
}

/// Sample manifest with top-level, IntelLinux and GravitonLinux views
pub fn manifest_bytes() -> Vec<u8> {
    std::fs::read(manifest_path()).expect("fixture manifest")
}

/// Settings built from the defaults alone
pub fn default_settings() -> Settings {
    Settings::from_value(BuiltinDefaults::default().to_value()).expect("default settings")
}

/// Reader over a mock source with the default retry policy and a fake clock
pub fn reader<'a>(
    source: &'a MockSource,
    sleeper: &'a RecordingSleeper,
) -> ManifestReader<&'a MockSource, &'a RecordingSleeper> {
    let settings = default_settings();
    let resolver = Resolver::new(
        Locator::new(source, settings.buildkite.per_page),
        settings.retry,
        sleeper,
    );
    ManifestReader::new(resolver, &settings.buildkite)
}

/// Environment holding only an API token
pub fn env_with_token() -> Environment {
    Environment::default().with_api_token("bkua_test")
}
