//! Manifest projection and content identity
//!
//! The manifest is decoded from a reader wrapped in [`HashingReader`], so the
//! identity is the SHA-256 of exactly the bytes the decoder consumed (plus any
//! trailing bytes it left behind). Outputs come either from the top level of
//! the manifest or from the object under an architecture key:
//!
//! ```json
//! {
//!   "name": "release-1234",
//!   "amis": { "web": "ami-1" },
//!   "service_versions": { "web": "1.2.3" },
//!   "GravitonLinux": { "amis": { "web": "ami-2" }, "service_versions": { "web": "1.2.3" } }
//! }
//! ```

use std::collections::BTreeMap;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::diagnostics::Diagnostic;

const MALFORMED_DETAIL: &str = "This is most likely due to the manifest being malformed. \
Check the manifest JSON in Buildkite and fix the task that creates it if necessary.";

/// Reader that feeds every byte it yields into a SHA-256 digest
pub struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
    consumed: u64,
}

impl<R: Read> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            consumed: 0,
        }
    }

    /// Bytes read through the tee so far
    pub fn consumed(&self) -> u64 {
        self.consumed
    }

    /// Drain whatever is left and return the lowercase hex digest
    pub fn finish(mut self) -> io::Result<String> {
        io::copy(&mut self, &mut io::sink())?;
        Ok(hex::encode(self.hasher.finalize()))
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.consumed += n as u64;
        Ok(n)
    }
}

/// Lowercase hex SHA-256 of a byte slice
pub fn identity_of(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Named outputs of a manifest read
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestOutputs {
    pub name: String,
    pub amis: BTreeMap<String, String>,
    pub service_versions: BTreeMap<String, String>,
}

/// Outputs plus the identity of the bytes they came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub outputs: ManifestOutputs,
    pub identity: String,
}

/// Projection errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to decode manifest JSON: {message}")]
    Decode { message: String },

    #[error("No entry for architecture {architecture:?} in manifest {manifest_name}")]
    MissingArchitecture {
        architecture: String,
        manifest_name: String,
    },

    #[error("Entry for architecture {architecture:?} in the manifest is {actual}, expected object")]
    ArchitectureShape {
        architecture: String,
        actual: &'static str,
    },

    #[error("Manifest field {field} is {actual}, expected {expected}")]
    FieldShape {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
}

impl ProjectionError {
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            ProjectionError::Io(e) => Diagnostic::bare_error(format!("Failed to read manifest: {}", e)),
            ProjectionError::Decode { message } => {
                Diagnostic::error("Failed to decode manifest JSON", message.clone())
            }
            ProjectionError::MissingArchitecture {
                architecture,
                manifest_name,
            } => Diagnostic::error(
                format!("No entry for architecture {:?} in the manifest", architecture),
                format!(
                    "This is most likely due to the {:?} manifest not being of kind 'Manifest'. \
                     Add `output_kind: Manifest` to the product definition to fix this.",
                    manifest_name
                ),
            ),
            ProjectionError::ArchitectureShape {
                architecture,
                actual,
            } => Diagnostic::error(
                format!(
                    "Entry for architecture {:?} in the manifest didn't have expected type object, got {}",
                    architecture, actual
                ),
                MALFORMED_DETAIL,
            ),
            ProjectionError::FieldShape {
                field,
                expected,
                actual,
            } => Diagnostic::error(
                format!(
                    "Manifest field {} didn't have expected type {}, got {}",
                    field, expected, actual
                ),
                MALFORMED_DETAIL,
            ),
        }
    }
}

/// JSON type name of a value
pub fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Borrow an object or report the actual type
pub fn expect_object<'a>(value: &'a Value, field: &str) -> Result<&'a Map<String, Value>, ProjectionError> {
    value.as_object().ok_or_else(|| ProjectionError::FieldShape {
        field: field.to_string(),
        expected: "object",
        actual: shape_of(value),
    })
}

/// Convert an object of strings into a map
pub fn expect_string_map(value: &Value, field: &str) -> Result<BTreeMap<String, String>, ProjectionError> {
    expect_object(value, field)?
        .iter()
        .map(|(key, v)| match v {
            Value::String(s) => Ok((key.clone(), s.clone())),
            other => Err(ProjectionError::FieldShape {
                field: format!("{}.{}", field, key),
                expected: "string",
                actual: shape_of(other),
            }),
        })
        .collect()
}

/// Absent and null fields project as empty maps
fn optional_string_map(
    container: &Map<String, Value>,
    key: &str,
    field: &str,
) -> Result<BTreeMap<String, String>, ProjectionError> {
    match container.get(key) {
        None | Some(Value::Null) => Ok(BTreeMap::new()),
        Some(value) => expect_string_map(value, field),
    }
}

fn manifest_name_field(manifest: &Map<String, Value>) -> Result<String, ProjectionError> {
    match manifest.get("name") {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ProjectionError::FieldShape {
            field: "name".to_string(),
            expected: "string",
            actual: shape_of(other),
        }),
    }
}

/// Decode a manifest from `reader`, hash it and project its outputs.
///
/// An empty `architecture` selects the top-level `amis` and
/// `service_versions`; otherwise they are taken from the object under that
/// key. `name` always comes from the top level.
pub fn project<R: Read>(
    reader: R,
    architecture: &str,
    manifest_name: &str,
) -> Result<Projection, ProjectionError> {
    let mut tee = HashingReader::new(reader);
    let value: Value = serde_json::from_reader(&mut tee).map_err(|e| {
        if e.is_io() {
            ProjectionError::Io(io::Error::from(e))
        } else {
            ProjectionError::Decode {
                message: e.to_string(),
            }
        }
    })?;
    let identity = tee.finish()?;

    let manifest = match value {
        Value::Object(map) => map,
        other => {
            return Err(ProjectionError::Decode {
                message: format!("expected a JSON object, got {}", shape_of(&other)),
            })
        }
    };

    let name = manifest_name_field(&manifest)?;

    let (amis, service_versions) = if architecture.is_empty() {
        (
            optional_string_map(&manifest, "amis", "amis")?,
            optional_string_map(&manifest, "service_versions", "service_versions")?,
        )
    } else {
        let entry = manifest
            .get(architecture)
            .ok_or_else(|| ProjectionError::MissingArchitecture {
                architecture: architecture.to_string(),
                manifest_name: manifest_name.to_string(),
            })?;
        let nested = entry
            .as_object()
            .ok_or_else(|| ProjectionError::ArchitectureShape {
                architecture: architecture.to_string(),
                actual: shape_of(entry),
            })?;
        (
            optional_string_map(nested, "amis", &format!("{}.amis", architecture))?,
            optional_string_map(
                nested,
                "service_versions",
                &format!("{}.service_versions", architecture),
            )?,
        )
    };

    Ok(Projection {
        outputs: ManifestOutputs {
            name,
            amis,
            service_versions,
        },
        identity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"{
        "name": "release-1234",
        "amis": {"web": "ami-top"},
        "service_versions": {"web": "1.0.0"},
        "IntelLinux": {"amis": {"web": "ami-intel"}, "service_versions": {"web": "1.0.1"}},
        "GravitonLinux": {"amis": {"web": "ami-arm"}, "service_versions": {"web": "1.0.2"}}
    }"#;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_top_level_projection() {
        let projection = project(MANIFEST.as_bytes(), "", "manifest.json").unwrap();
        assert_eq!(projection.outputs.name, "release-1234");
        assert_eq!(projection.outputs.amis, map(&[("web", "ami-top")]));
        assert_eq!(projection.outputs.service_versions, map(&[("web", "1.0.0")]));
    }

    #[test]
    fn test_architecture_projection() {
        let projection = project(MANIFEST.as_bytes(), "GravitonLinux", "manifest.json").unwrap();
        assert_eq!(projection.outputs.name, "release-1234");
        assert_eq!(projection.outputs.amis, map(&[("web", "ami-arm")]));
        assert_eq!(projection.outputs.service_versions, map(&[("web", "1.0.2")]));
    }

    #[test]
    fn test_identity_covers_all_bytes() {
        let projection = project(MANIFEST.as_bytes(), "", "m").unwrap();
        assert_eq!(projection.identity, identity_of(MANIFEST.as_bytes()));
        assert_eq!(projection.identity.len(), 64);

        let with_newline = format!("{}\n", MANIFEST);
        let other = project(with_newline.as_bytes(), "", "m").unwrap();
        assert_eq!(other.outputs, projection.outputs);
        assert_ne!(other.identity, projection.identity);
    }

    #[test]
    fn test_identity_known_value() {
        let projection = project("{}".as_bytes(), "", "m").unwrap();
        assert_eq!(
            projection.identity,
            "44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"
        );
        assert_eq!(projection.outputs, ManifestOutputs::default());
    }

    #[test]
    fn test_missing_architecture() {
        let manifest = r#"{"name": "m", "IntelLinux": {"amis": {}}}"#;
        let err = project(manifest.as_bytes(), "GravitonLinux", "manifest.json").unwrap_err();
        assert!(matches!(err, ProjectionError::MissingArchitecture { .. }));

        let diag = err.to_diagnostic();
        assert!(diag.is_error());
        assert!(diag.summary.contains("GravitonLinux"));
        assert!(diag.detail.unwrap().contains("manifest.json"));
    }

    #[test]
    fn test_architecture_not_an_object() {
        let manifest = r#"{"GravitonLinux": "ami-123"}"#;
        match project(manifest.as_bytes(), "GravitonLinux", "m").unwrap_err() {
            ProjectionError::ArchitectureShape { actual, .. } => assert_eq!(actual, "string"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_null_fields_are_empty() {
        let manifest = r#"{"name": null, "amis": null}"#;
        let projection = project(manifest.as_bytes(), "", "m").unwrap();
        assert_eq!(projection.outputs, ManifestOutputs::default());
    }

    #[test]
    fn test_field_shape_errors() {
        let err = project(r#"{"amis": ["ami-1"]}"#.as_bytes(), "", "m").unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::FieldShape { ref field, actual: "array", .. } if field == "amis"
        ));

        let err = project(
            r#"{"IntelLinux": {"service_versions": {"web": 3}}}"#.as_bytes(),
            "IntelLinux",
            "m",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ProjectionError::FieldShape { ref field, actual: "number", .. }
                if field == "IntelLinux.service_versions.web"
        ));

        let err = project(r#"{"name": 7}"#.as_bytes(), "", "m").unwrap_err();
        assert!(matches!(err, ProjectionError::FieldShape { .. }));
    }

    #[test]
    fn test_decode_errors() {
        let err = project("{not json".as_bytes(), "", "m").unwrap_err();
        assert!(matches!(err, ProjectionError::Decode { .. }));
        assert_eq!(err.to_diagnostic().summary, "Failed to decode manifest JSON");

        let err = project("[1, 2]".as_bytes(), "", "m").unwrap_err();
        match err {
            ProjectionError::Decode { message } => assert!(message.contains("array")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_hashing_reader_drains() {
        let mut tee = HashingReader::new("abcdef".as_bytes());
        let mut buf = [0u8; 2];
        tee.read_exact(&mut buf).unwrap();
        assert_eq!(tee.consumed(), 2);
        assert_eq!(tee.finish().unwrap(), identity_of(b"abcdef"));
    }
}
