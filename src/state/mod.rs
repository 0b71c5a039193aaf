//! Durable read state
//!
//! The only value carried from one read to the next is whether the fallback
//! manifest was used. It is stored together with the last outputs in a JSON
//! state file that is replaced atomically after each successful read.

mod manifest_state;

pub use manifest_state::{ManifestState, StateError, StateFile, SCHEMA_ID, SCHEMA_VERSION};

/// Default state file path, relative to the working directory
pub const DEFAULT_STATE_FILE: &str = ".stile-manifest/state.json";
