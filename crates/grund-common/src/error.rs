//! Unified error types for the Grund workspace.
//!
//! Generation-time errors carry enough context (service name, placeholder,
//! path) to be actionable without further wrapping.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum GrundError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// A placeholder names a namespace or property that cannot be satisfied.
    #[error("unresolved reference ${{{reference}}} in {key}")]
    UnresolvedReference {
        /// Environment variable whose value holds the placeholder.
        key: String,
        /// Raw placeholder path, without the `${` and `}` delimiters.
        reference: String,
    },

    /// A value contains a `${` that does not form a valid placeholder.
    #[error("malformed reference in {key} at byte {offset}: {value:?}")]
    MalformedReference {
        /// Environment variable whose value is malformed.
        key: String,
        /// The full template value.
        value: String,
        /// Byte offset of the offending `${`.
        offset: usize,
    },

    /// No free host port was found within the probe window.
    #[error("no free port for {owner}: probed {probes} ports from {desired}")]
    PortsExhausted {
        /// Name of the unit asking for a port.
        owner: String,
        /// Port originally requested.
        desired: u16,
        /// Number of candidates examined.
        probes: u32,
    },

    /// A secret marked as required has no value.
    #[error("required secret {name} has no value")]
    MissingSecret {
        /// Secret name.
        name: String,
    },

    /// An existing manifest could not be parsed.
    #[error("invalid manifest at {path}: {source}")]
    Manifest {
        /// Manifest file path.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying YAML error.
        #[from]
        source: serde_yaml::Error,
    },

    /// The shared manifest lock could not be acquired.
    #[error("failed to lock {path}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Generation failed for one service.
    #[error("service {service}: {source}")]
    Service {
        /// Service whose manifest could not be generated.
        service: String,
        /// Underlying error.
        #[source]
        source: Box<GrundError>,
    },
}

impl GrundError {
    /// Wraps an error with the name of the service being generated.
    #[must_use]
    pub fn for_service(service: impl Into<String>, source: Self) -> Self {
        Self::Service {
            service: service.into(),
            source: Box::new(source),
        }
    }

    /// Builds an [`GrundError::Io`] for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GrundError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_reference_names_placeholder_and_key() {
        let err = GrundError::UnresolvedReference {
            key: "X".into(),
            reference: "nowhere.y".into(),
        };
        assert_eq!(err.to_string(), "unresolved reference ${nowhere.y} in X");
    }

    #[test]
    fn service_wrapper_keeps_source() {
        let inner = GrundError::MissingSecret {
            name: "API_KEY".into(),
        };
        let err = GrundError::for_service("billing", inner);
        let msg = err.to_string();
        assert!(msg.contains("billing"), "got: {msg}");
        assert!(msg.contains("API_KEY"), "got: {msg}");
        assert!(std::error::Error::source(&err).is_some());
    }
}
