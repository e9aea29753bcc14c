//! Error types for schema loading, resolution and documentation generation.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors raised by a [`Loader`](crate::Loader) while fetching raw document bytes.
///
/// Cloneable so that [`CachedLoader`](crate::CachedLoader) can hand the same
/// failure back on every later request for the URI.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("unknown scheme: {scheme}")]
    UnknownScheme { scheme: String },

    #[error("cannot map {uri} to a local path")]
    InvalidPath { uri: String },

    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },

    #[error("{url} returned status code {status}")]
    Status { url: String, status: u16 },

    #[error("failed to fetch {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl LoadError {
    /// Wrap any transport-level failure (connection refused, TLS, timeout).
    pub fn transport(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        LoadError::Transport {
            url: url.into(),
            source: Arc::new(source),
        }
    }
}

/// Errors while loading and resolving a schema graph.
#[derive(Debug, Error)]
pub enum ResolveError {
    // IO errors (exit code 3)
    #[error("failed to load {uri}: {source}")]
    Load {
        uri: String,
        #[source]
        source: LoadError,
    },

    // Parse errors (exit code 2)
    #[error("invalid reference \"{reference}\": {message}")]
    InvalidReference { reference: String, message: String },

    #[error("invalid JSON in {uri}: {source}")]
    InvalidJson {
        uri: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid schema at {location}: {message}")]
    InvalidSchema { location: String, message: String },

    #[error("invalid JSON pointer \"{pointer}\": must be empty or start with '/'")]
    InvalidPointer { pointer: String },

    #[error("JSON pointer \"{pointer}\" not found in {uri}")]
    PointerNotFound { uri: String, pointer: String },
}

impl ResolveError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ResolveError::Load { .. } => 3,
            _ => 2,
        }
    }
}

/// Errors during a documentation generation run.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("'--in': path not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("'--in': cannot read {path}: {source}")]
    ReadInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'--out': cannot write {path}: {source}")]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'--outfile': invalid pattern \"{pattern}\": {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("'--template': {name}: {message}")]
    InvalidTemplate { name: String, message: String },

    #[error("'--template': cannot read {path}: {source}")]
    ReadTemplate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot render {page} with {template}: {source}")]
    RenderTemplate {
        template: String,
        page: String,
        #[source]
        source: minijinja::Error,
    },

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl GenerateError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateError::ReadInput { .. }
            | GenerateError::WriteOutput { .. }
            | GenerateError::ReadTemplate { .. } => 3,
            GenerateError::Resolve(e) => e.exit_code(),
            _ => 2,
        }
    }
}

/// Errors while loading `.schemadoc.yaml`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config load: cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config load: invalid YAML in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("config load: invalid value \"{value}\" for {key}")]
    InvalidValue { key: String, value: String },
}

impl ConfigError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Read { .. } => 3,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn resolve_error_exit_codes() {
        let err = ResolveError::Load {
            uri: "file:///missing.json".into(),
            source: LoadError::FileNotFound {
                path: PathBuf::from("/missing.json"),
            },
        };
        assert_eq!(err.exit_code(), 3);

        let err = ResolveError::InvalidPointer {
            pointer: "definitions".into(),
        };
        assert_eq!(err.exit_code(), 2);

        let err = ResolveError::PointerNotFound {
            uri: "https://example.com/s.json".into(),
            pointer: "/definitions/nope".into(),
        };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn generate_error_exit_codes() {
        let err = GenerateError::InputNotFound {
            path: PathBuf::from("schemas"),
        };
        assert_eq!(err.exit_code(), 2);

        let err = GenerateError::Resolve(ResolveError::Load {
            uri: "https://example.com/s.json".into(),
            source: LoadError::Status {
                url: "https://example.com/s.json".into(),
                status: 500,
            },
        });
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn status_error_display() {
        let err = LoadError::Status {
            url: "https://example.com/foo.schema.json".into(),
            status: 404,
        };
        assert_eq!(
            err.to_string(),
            "https://example.com/foo.schema.json returned status code 404"
        );
    }

    #[test]
    fn load_error_is_kept_as_source() {
        let err = ResolveError::Load {
            uri: "https://example.com/s.json".into(),
            source: LoadError::transport(
                "https://example.com/s.json",
                std::io::Error::new(std::io::ErrorKind::Other, "boom"),
            ),
        };
        assert!(err.to_string().contains("boom"));

        let source = err.source().unwrap();
        assert!(source.downcast_ref::<LoadError>().is_some());
    }
}
