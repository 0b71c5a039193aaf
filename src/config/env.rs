//! Process environment inputs
//!
//! The API credential and the fallback override come from the environment
//! rather than the config file so they never end up in plan files.

use std::ffi::OsString;
use std::fmt;

/// Bearer credential for the Buildkite REST API
pub const API_TOKEN_VAR: &str = "BUILDKITE_READ_API_TOKEN";

/// When true, a configured fallback manifest may not be used
pub const NO_FALLBACK_VAR: &str = "STILE_MANIFEST_NO_FALLBACK";

/// API token; never printed
#[derive(Clone, PartialEq, Eq)]
pub struct ApiToken(String);

impl ApiToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiToken([REDACTED])")
    }
}

/// Snapshot of the environment variables a read depends on
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub api_token: Option<ApiToken>,

    /// Raw value of STILE_MANIFEST_NO_FALLBACK; only parsed when a fallback is needed
    pub no_fallback: Option<String>,
}

impl Environment {
    /// Capture the current process environment
    pub fn from_process() -> Self {
        Self::from_lookup(|name| std::env::var_os(name))
    }

    /// Capture variables through `lookup`.
    ///
    /// A value that is not valid UTF-8 still counts as present. It is kept
    /// lossily, so the fallback override fails to parse instead of being ignored.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        let present = |name: &str| lookup(name).map(|v| v.to_string_lossy().into_owned());
        Self {
            api_token: present(API_TOKEN_VAR).map(ApiToken::new),
            no_fallback: present(NO_FALLBACK_VAR),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(ApiToken::new(token));
        self
    }

    pub fn with_no_fallback(mut self, value: impl Into<String>) -> Self {
        self.no_fallback = Some(value.into());
        self
    }

    /// Parsed fallback override: `None` if unset
    pub fn no_fallback_override(&self) -> Result<Option<bool>, ParseBoolError> {
        self.no_fallback.as_deref().map(parse_bool).transpose()
    }
}

/// Invalid boolean string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid boolean {value:?} (expected 1, t, T, TRUE, true, True, 0, f, F, FALSE, false or False)")]
pub struct ParseBoolError {
    pub value: String,
}

/// Parse the boolean spellings accepted for environment switches.
pub fn parse_bool(value: &str) -> Result<bool, ParseBoolError> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        _ => Err(ParseBoolError {
            value: value.to_string(),
        }),
    }
}
