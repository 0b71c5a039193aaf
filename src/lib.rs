//! Stile manifest reader
//!
//! Resolves a build manifest published as a Buildkite artifact, falls back to
//! a configured manifest when the artifact does not exist, and projects the
//! manifest into named outputs with a content identity that changes exactly
//! when the manifest bytes change.

pub mod config;
pub mod diagnostics;
pub mod locator;
pub mod projector;
pub mod read;
pub mod resolve;
pub mod retry;
pub mod source;
pub mod state;

pub use config::{EffectiveConfig, Environment, ManifestInputs, Settings};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use locator::{ArtifactQuery, Locator, ResolvedArtifact};
pub use projector::{project, ManifestOutputs, Projection, ProjectionError};
pub use read::{ManifestReader, ReadReport};
pub use resolve::{ContentOrigin, Resolution, ResolutionOutcome, ResolveRequest, Resolver};
pub use retry::{RecordingSleeper, RetryPolicy, Sleeper, ThreadSleeper};
pub use source::{ArtifactSource, BuildkiteSource, MockSource};
pub use state::{ManifestState, StateFile};
