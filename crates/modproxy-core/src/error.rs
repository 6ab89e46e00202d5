//! Error types for the module proxy.
//!
//! Besides the error enum itself, this module owns the textual classifier
//! that decides whether a toolchain or checksum-database message means
//! "module version not found" (a cacheable 404) or an internal failure.

use once_cell::sync::Lazy;
use regex::RegexSet;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for proxy operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A cache backend probe found no entry for the requested name.
    #[error("cache not found")]
    CacheMiss,

    /// The toolchain reported a failure. The message is the raw upstream
    /// text so it can be run through the not-found classifier.
    #[error("{message}")]
    Driver { message: String },

    /// A checksum-database lookup failed. Carries the upstream text for the
    /// same classification treatment as driver errors.
    #[error("{message}")]
    SumdbLookup { message: String },

    /// A downloaded artifact's hash does not appear in the checksum
    /// database's records for its version.
    #[error("untrusted revision {version}")]
    UntrustedRevision { version: String },

    /// A wire-form module path failed case-decoding.
    #[error("invalid escaped module path: {path:?}")]
    InvalidPath { path: String },

    /// A wire-form module version failed case-decoding.
    #[error("invalid escaped module version: {version:?}")]
    InvalidVersion { version: String },

    #[error("invalid URL scheme (must be http or https): {url}")]
    InvalidScheme { url: String },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: std::io::Error,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for proxy operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io {
            path: None,
            source: err,
        }
    }
}

impl Error {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        Error::Io {
            path: Some(path.into()),
            source: err,
        }
    }

    /// Whether this error means the requested module version does not exist
    /// upstream, as opposed to the proxy itself failing.
    pub fn is_module_not_found(&self) -> bool {
        match self {
            Error::Driver { message } | Error::SumdbLookup { message } => {
                is_not_found_message(message)
            }
            Error::UntrustedRevision { .. } => true,
            _ => false,
        }
    }
}

/// Signals that mark a toolchain or checksum-database message as "module
/// version not found". Extend the table, not the control flow.
const NOT_FOUND_PATTERNS: &[&str] = &[
    "400 Bad Request",
    "403 Forbidden",
    "404 Not Found",
    "410 Gone",
    "^bad request: .*",
    "^gone: .*",
    "^not found: .*",
    "could not read Username",
    "does not contain package",
    "go.mod has non-.* module path",
    "go.mod has post-.* module path",
    "invalid .* import path",
    "invalid pseudo-version",
    "invalid version",
    "missing .*/go.mod and .*/go.mod at revision",
    "no matching versions",
    "repository .* not found",
    "unable to connect to",
    "unknown revision",
    "unrecognized import path",
    "untrusted revision",
];

static NOT_FOUND_SET: Lazy<RegexSet> = Lazy::new(|| {
    RegexSet::new(NOT_FOUND_PATTERNS).expect("not-found patterns must compile")
});

/// Report whether a message means a module version is not found.
pub fn is_not_found_message(message: &str) -> bool {
    NOT_FOUND_SET.is_match(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_http_status_signals() {
        assert!(is_not_found_message("fetch: 404 Not Found"));
        assert!(is_not_found_message("server replied: 410 Gone"));
        assert!(is_not_found_message("400 Bad Request"));
        assert!(is_not_found_message("403 Forbidden"));
    }

    #[test]
    fn anchored_signals_only_match_at_start() {
        assert!(is_not_found_message("not found: example.com/m@v9.9.9"));
        assert!(!is_not_found_message("module was maybe not found: who knows"));
        assert!(is_not_found_message("bad request: malformed module path"));
        assert!(is_not_found_message("gone: module retracted"));
    }

    #[test]
    fn classifies_toolchain_signals() {
        assert!(is_not_found_message(
            "invalid version: unknown revision abcdef"
        ));
        assert!(is_not_found_message("no matching versions for query \"v2\""));
        assert!(is_not_found_message(
            "repository https://example.com/m not found"
        ));
        assert!(is_not_found_message(
            "module example.com declares its path as example.org but was required as example.com: unrecognized import path"
        ));
        assert!(is_not_found_message("untrusted revision v1.2.3"));
        assert!(is_not_found_message(
            "missing example.com/go.mod and example.com/v2/go.mod at revision v2.0.0"
        ));
    }

    #[test]
    fn internal_failures_are_not_classified() {
        assert!(!is_not_found_message("connection reset by peer"));
        assert!(!is_not_found_message("no space left on device"));
        assert!(!is_not_found_message(""));
    }

    #[test]
    fn error_variants_classify_through_messages() {
        let err = Error::Driver {
            message: "unknown revision v0.0.0-20190101000000-abcdef".into(),
        };
        assert!(err.is_module_not_found());

        let err = Error::Driver {
            message: "exec format error".into(),
        };
        assert!(!err.is_module_not_found());

        let err = Error::UntrustedRevision {
            version: "v1.0.0".into(),
        };
        assert!(err.is_module_not_found());
        assert_eq!(err.to_string(), "untrusted revision v1.0.0");

        assert!(!Error::CacheMiss.is_module_not_found());
    }
}
