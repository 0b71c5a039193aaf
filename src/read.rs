//! One manifest read: resolve, project, report

use std::io::Write;

use tracing::{debug, info};

use crate::config::{BuildkiteSettings, Environment, ManifestInputs};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::locator::{ArtifactQuery, ResolvedArtifact};
use crate::projector::project;
use crate::resolve::{missing_token, ContentOrigin, ResolveRequest, Resolver};
use crate::retry::Sleeper;
use crate::source::ArtifactSource;
use crate::state::ManifestState;

/// Outcome of a read; `state` is `None` iff an error was reported
#[derive(Debug, Default)]
pub struct ReadReport {
    pub state: Option<ManifestState>,
    pub diagnostics: Diagnostics,
}

impl ReadReport {
    fn failed(diagnostics: Diagnostics) -> Self {
        Self {
            state: None,
            diagnostics,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state.is_some() && !self.diagnostics.has_errors()
    }
}

/// Reads manifests from one org/pipeline
pub struct ManifestReader<S, Z> {
    resolver: Resolver<S, Z>,
    org: String,
    pipeline: String,
}

impl<S: ArtifactSource, Z: Sleeper> ManifestReader<S, Z> {
    pub fn new(resolver: Resolver<S, Z>, settings: &BuildkiteSettings) -> Self {
        Self {
            resolver,
            org: settings.org.clone(),
            pipeline: settings.pipeline.clone(),
        }
    }

    pub fn query(&self, artifact_name: &str, build_number: u64) -> ArtifactQuery {
        ArtifactQuery::new(
            artifact_name,
            build_number.to_string(),
            &self.pipeline,
            &self.org,
        )
    }

    /// Resolve the manifest and project its outputs.
    ///
    /// `prior_used_fallback` comes from the previous successful read.
    pub fn read_manifest(
        &self,
        inputs: &ManifestInputs,
        prior_used_fallback: bool,
        env: &Environment,
        discovery: &mut dyn Write,
    ) -> ReadReport {
        let mut request = ResolveRequest::new(self.query(&inputs.manifest_name, inputs.bfp_build_number))
            .with_prior_used_fallback(prior_used_fallback);
        request.fallback = inputs.fallback_manifest.clone();

        let resolution = self.resolver.resolve(&request, env, discovery);
        let mut diagnostics = resolution.diagnostics;
        let Some(outcome) = resolution.outcome else {
            return ReadReport::failed(diagnostics);
        };

        match &outcome.origin {
            ContentOrigin::Remote { url } => debug!(url = %url, "projecting remote manifest"),
            ContentOrigin::Fallback => debug!("projecting fallback manifest"),
        }

        let projection = match project(
            outcome.content.as_slice(),
            &inputs.architecture,
            &inputs.manifest_name,
        ) {
            Ok(p) => p,
            Err(e) => {
                diagnostics.push(e.to_diagnostic());
                return ReadReport::failed(diagnostics);
            }
        };

        info!(
            manifest = %inputs.manifest_name,
            build = inputs.bfp_build_number,
            id = %projection.identity,
            used_fallback = outcome.used_fallback,
            "manifest read"
        );

        ReadReport {
            state: Some(ManifestState {
                id: projection.identity,
                inputs: inputs.clone(),
                outputs: projection.outputs,
                used_fallback_manifest: outcome.used_fallback,
            }),
            diagnostics,
        }
    }

    /// Print every artifact record of a build to `out`
    pub fn list_artifacts(
        &self,
        build_number: u64,
        env: &Environment,
        out: &mut dyn Write,
    ) -> Diagnostics {
        let mut diagnostics = Diagnostics::new();
        let Some(token) = env.api_token.as_ref() else {
            diagnostics.push(missing_token());
            return diagnostics;
        };

        let query = self.query("", build_number);
        if let ResolvedArtifact::TransientError(err) = self.resolver.locator().locate(token, &query, out) {
            diagnostics.push(match err.diagnostic_error() {
                Some(known) => known.into_diagnostic(),
                None => Diagnostic::bare_error(format!("Failed to list Buildkite artifacts: {}", err)),
            });
        }
        diagnostics
    }
}
