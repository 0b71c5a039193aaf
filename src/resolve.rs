//! Manifest resolution policy
//!
//! Decides which bytes a read uses:
//! 1. No API token: error, nothing is fetched
//! 2. The previous read used the fallback: skip the lookup entirely
//! 3. Otherwise look the artifact up, retrying transient failures
//! 4. Found: use it. Transient failure after the last attempt: error
//! 5. Not found: use the fallback if one is configured and allowed
//!
//! Step 2 keeps plans stable: once a fallback was used, a manifest that
//! appears later does not change the outputs until the state is reset.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{ApiToken, Environment, API_TOKEN_VAR, NO_FALLBACK_VAR};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::locator::{ArtifactQuery, LocateError, Locator, ResolvedArtifact};
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper};
use crate::source::ArtifactSource;

const NOT_FOUND_DETAIL: &str = "This may be because the build failed or it is on a branch that does not build the manifest. \
You can use fallback_manifest to specify the manifest that should be used if the expected one does not exist.";

/// Inputs of one resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    pub query: ArtifactQuery,

    /// Literal manifest text to use when the artifact does not exist
    pub fallback: Option<String>,

    /// Whether the previous successful read used the fallback
    pub prior_used_fallback: bool,
}

impl ResolveRequest {
    pub fn new(query: ArtifactQuery) -> Self {
        Self {
            query,
            fallback: None,
            prior_used_fallback: false,
        }
    }

    pub fn with_fallback(mut self, fallback: impl Into<String>) -> Self {
        self.fallback = Some(fallback.into());
        self
    }

    pub fn with_prior_used_fallback(mut self, used: bool) -> Self {
        self.prior_used_fallback = used;
        self
    }
}

/// Where the resolved bytes came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentOrigin {
    Remote { url: String },
    Fallback,
}

/// The bytes a read will project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    pub content: Vec<u8>,
    pub used_fallback: bool,
    pub origin: ContentOrigin,
}

/// Result of a resolution; `outcome` is `None` iff an error was reported
#[derive(Debug, Default)]
pub struct Resolution {
    pub outcome: Option<ResolutionOutcome>,
    pub diagnostics: Diagnostics,
}

impl Resolution {
    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            outcome: None,
            diagnostics,
        }
    }
}

/// Applies the resolution policy over a locator
pub struct Resolver<S, Z = ThreadSleeper> {
    locator: Locator<S>,
    policy: RetryPolicy,
    sleeper: Z,
}

impl<S: ArtifactSource> Resolver<S, ThreadSleeper> {
    /// Resolver that really sleeps between attempts
    pub fn with_thread_sleeper(locator: Locator<S>, policy: RetryPolicy) -> Self {
        Self::new(locator, policy, ThreadSleeper)
    }
}

impl<S: ArtifactSource, Z: Sleeper> Resolver<S, Z> {
    pub fn new(locator: Locator<S>, policy: RetryPolicy, sleeper: Z) -> Self {
        Self {
            locator,
            policy,
            sleeper,
        }
    }

    pub fn locator(&self) -> &Locator<S> {
        &self.locator
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Run the policy for one request.
    ///
    /// Discovery output from the locator is written to `discovery`.
    pub fn resolve(
        &self,
        request: &ResolveRequest,
        env: &Environment,
        discovery: &mut dyn Write,
    ) -> Resolution {
        let mut diagnostics = Diagnostics::new();

        let Some(token) = env.api_token.as_ref() else {
            diagnostics.push(missing_token());
            return Resolution::failed(diagnostics);
        };

        if request.prior_used_fallback {
            info!(
                manifest = %request.query.artifact_name,
                "previous read used the fallback manifest, skipping lookup"
            );
            return self.decide_fallback(request, env, diagnostics);
        }

        match self.locate_with_retry(token, &request.query, discovery) {
            ResolvedArtifact::Found(found) => Resolution {
                outcome: Some(ResolutionOutcome {
                    content: found.content,
                    used_fallback: false,
                    origin: ContentOrigin::Remote {
                        url: found.artifact.download_url,
                    },
                }),
                diagnostics,
            },
            ResolvedArtifact::TransientError(err) => {
                diagnostics.push(lookup_failure(&err));
                Resolution::failed(diagnostics)
            }
            ResolvedArtifact::NotFound => self.decide_fallback(request, env, diagnostics),
        }
    }

    /// Locate up to `max_attempts` times; only transient errors are retried
    fn locate_with_retry(
        &self,
        token: &ApiToken,
        query: &ArtifactQuery,
        discovery: &mut dyn Write,
    ) -> ResolvedArtifact {
        let mut attempt = 1;
        loop {
            match self.locator.locate(token, query, discovery) {
                ResolvedArtifact::TransientError(err) if self.policy.should_retry(attempt) => {
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %err,
                        "artifact lookup failed, retrying in {}s",
                        self.policy.delay_seconds
                    );
                    self.sleeper.sleep(self.policy.delay());
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    fn decide_fallback(
        &self,
        request: &ResolveRequest,
        env: &Environment,
        mut diagnostics: Diagnostics,
    ) -> Resolution {
        let query = &request.query;
        let not_found = format!(
            "Manifest {} not found for build {} in {}/{}",
            query.artifact_name, query.build_number, query.org, query.pipeline
        );

        let Some(fallback) = request.fallback.as_ref() else {
            diagnostics.push(Diagnostic::error(not_found, NOT_FOUND_DETAIL));
            return Resolution::failed(diagnostics);
        };

        match env.no_fallback_override() {
            Err(e) => {
                diagnostics.push(Diagnostic::error(
                    format!("Invalid value for environment variable {}", NO_FALLBACK_VAR),
                    format!(
                        "This value decides whether a fallback manifest may be used. \
                         It must be a valid boolean value (e.g. 0, 1, true, false): {}",
                        e
                    ),
                ));
                Resolution::failed(diagnostics)
            }
            Ok(Some(true)) => {
                diagnostics.push(Diagnostic::error(
                    not_found,
                    format!(
                        "{} A fallback was specified via fallback_manifest but fallback was disabled via the {} environment variable.",
                        NOT_FOUND_DETAIL, NO_FALLBACK_VAR
                    ),
                ));
                Resolution::failed(diagnostics)
            }
            Ok(_) => {
                diagnostics.push(Diagnostic::warning(
                    format!("{}, using fallback", not_found),
                    format!(
                        "{} The manifest given in fallback_manifest is used instead.",
                        NOT_FOUND_DETAIL
                    ),
                ));
                Resolution {
                    outcome: Some(ResolutionOutcome {
                        content: fallback.as_bytes().to_vec(),
                        used_fallback: true,
                        origin: ContentOrigin::Fallback,
                    }),
                    diagnostics,
                }
            }
        }
    }
}

/// Error diagnostic for a missing API token
pub(crate) fn missing_token() -> Diagnostic {
    Diagnostic::error(
        format!("Unable to find {} environment variable.", API_TOKEN_VAR),
        format!("{} not present in environment", API_TOKEN_VAR),
    )
}

/// Error diagnostic for a lookup that kept failing
fn lookup_failure(err: &LocateError) -> Diagnostic {
    match err.diagnostic_error() {
        Some(known) => known.into_diagnostic(),
        None => Diagnostic::bare_error(format!("Failed to get Buildkite artifact: {}", err)),
    }
}
