//! Configuration
//!
//! Settings are merged from three layers, lowest precedence first:
//! 1. Built-in defaults
//! 2. Config file (`stile-manifest.toml` or `--config`)
//! 3. CLI flags
//!
//! Credentials and the fallback override come from the environment only.

mod defaults;
mod effective;
mod env;
mod layers;
mod settings;

pub use defaults::{BuiltinDefaults, DEFAULT_ORG, DEFAULT_PIPELINE};
pub use effective::{ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig};
pub use env::{parse_bool, ApiToken, Environment, ParseBoolError, API_TOKEN_VAR, NO_FALLBACK_VAR};
pub use layers::{deep_merge, merge_layers};
pub use settings::{BuildkiteSettings, ManifestInputs, ManifestSection, Settings};

/// Config file looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "stile-manifest.toml";
