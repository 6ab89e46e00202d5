//! Request routing: HTTP path to proxy operation.
//!
//! Turns a request path into either a checksum-database passthrough or a
//! module operation (version list, latest resolution, query lookup, or an
//! artifact fetch), rejecting everything malformed before any work happens.

use crate::escape::unescape_path;
use axum::http::Method;
use percent_encoding::percent_decode_str;

/// Artifact flavor named by a request's extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactExt {
    Info,
    Mod,
    Zip,
}

impl ArtifactExt {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactExt::Info => ".info",
            ArtifactExt::Mod => ".mod",
            ArtifactExt::Zip => ".zip",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.rsplit_once('.')?.1 {
            "info" => Some(ArtifactExt::Info),
            "mod" => Some(ArtifactExt::Mod),
            "zip" => Some(ArtifactExt::Zip),
            _ => None,
        }
    }
}

/// How a module request's version part should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOp {
    /// Enumerate tagged versions.
    List,
    /// Resolve the conventional "latest" version.
    Latest,
    /// Resolve a branch/tag/commit query to a canonical version.
    Lookup,
    /// Fetch an artifact for a canonical semver version.
    Fetch,
}

/// A decoded module request.
#[derive(Debug, Clone)]
pub struct ModuleRoute {
    pub op: ModuleOp,
    /// Decoded module path.
    pub module: String,
    /// Wire-form (still case-escaped) module path.
    pub escaped_module: String,
    /// Decoded version or query; `latest` for list/latest forms.
    pub version: String,
    pub ext: ArtifactExt,
    /// Canonical wire-form cache name, e.g. `example.com/m/@v/v1.2.3.zip`.
    pub name: String,
}

/// A decoded request.
#[derive(Debug, Clone)]
pub enum Route {
    Module(ModuleRoute),
    /// Checksum-database passthrough; carries everything after `sumdb/`.
    Sumdb { raw: String },
}

/// Why a request could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MethodNotAllowed,
    NotFound,
}

/// Decode an HTTP request into a proxy operation.
///
/// `prefix` is stripped from the cleaned path before interpretation.
pub fn decode(method: &Method, path: &str, prefix: &str) -> Result<Route, Rejection> {
    match *method {
        Method::GET | Method::HEAD => {}
        _ => return Err(Rejection::MethodNotAllowed),
    }

    if !path.starts_with('/') {
        return Err(Rejection::NotFound);
    }

    let cleaned = clean_path(path);
    let trimmed = cleaned
        .strip_prefix(prefix)
        .unwrap_or(&cleaned)
        .trim_start_matches('/');

    let name = percent_decode_str(trimmed)
        .decode_utf8()
        .map_err(|_| Rejection::NotFound)?
        .into_owned();

    if let Some(raw) = name.strip_prefix("sumdb/") {
        return Ok(Route::Sumdb {
            raw: raw.to_string(),
        });
    }

    // The latest/list forms are rewritten into the artifact shape so one
    // split handles every module request.
    let (name, op_hint) = if let Some(stem) = name.strip_suffix("/@latest") {
        (format!("{stem}/@v/latest.info"), Some(ModuleOp::Latest))
    } else if let Some(stem) = name.strip_suffix("/@v/list") {
        (format!("{stem}/@v/latest.info"), Some(ModuleOp::List))
    } else {
        (name, None)
    };

    let (escaped_module, base) = match name.split_once("/@v/") {
        Some((module, base)) if !base.contains("/@v/") => (module, base),
        _ => return Err(Rejection::NotFound),
    };

    let module = unescape_path(escaped_module).map_err(|_| Rejection::NotFound)?;

    let ext = ArtifactExt::from_name(base).ok_or(Rejection::NotFound)?;
    let escaped_version = base
        .strip_suffix(ext.as_str())
        .ok_or(Rejection::NotFound)?;
    let version =
        crate::escape::unescape_version(escaped_version).map_err(|_| Rejection::NotFound)?;

    let op = match op_hint {
        Some(op) => op,
        None if is_valid_semver(&version) => ModuleOp::Fetch,
        None => ModuleOp::Lookup,
    };

    Ok(Route::Module(ModuleRoute {
        op,
        module,
        escaped_module: escaped_module.to_string(),
        version,
        ext,
        name,
    }))
}

/// Collapse `.` and `..` segments and duplicate slashes, keeping the leading
/// slash and dropping any trailing one.
fn clean_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    let mut out = String::with_capacity(path.len());
    for segment in &segments {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Semver validity in the version-prefix form the protocol uses: a leading
/// `v` followed by a full `major.minor.patch`, pre-release and build
/// metadata allowed (pseudo-versions parse as pre-releases).
fn is_valid_semver(version: &str) -> bool {
    version
        .strip_prefix('v')
        .is_some_and(|rest| semver::Version::parse(rest).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_get(path: &str) -> Result<Route, Rejection> {
        decode(&Method::GET, path, "")
    }

    fn module_route(path: &str) -> ModuleRoute {
        match decode_get(path) {
            Ok(Route::Module(route)) => route,
            other => panic!("expected module route for {path}, got {other:?}"),
        }
    }

    #[test]
    fn decodes_list() {
        let route = module_route("/example.com/m/@v/list");
        assert_eq!(route.op, ModuleOp::List);
        assert_eq!(route.module, "example.com/m");
        assert_eq!(route.version, "latest");
        assert_eq!(route.ext, ArtifactExt::Info);
        assert_eq!(route.name, "example.com/m/@v/latest.info");
    }

    #[test]
    fn decodes_latest() {
        let route = module_route("/example.com/m/@latest");
        assert_eq!(route.op, ModuleOp::Latest);
        assert_eq!(route.version, "latest");
        assert_eq!(route.name, "example.com/m/@v/latest.info");
    }

    #[test]
    fn decodes_artifact_fetch() {
        let route = module_route("/example.com/m/@v/v1.2.3.zip");
        assert_eq!(route.op, ModuleOp::Fetch);
        assert_eq!(route.module, "example.com/m");
        assert_eq!(route.version, "v1.2.3");
        assert_eq!(route.ext, ArtifactExt::Zip);
        assert_eq!(route.name, "example.com/m/@v/v1.2.3.zip");
    }

    #[test]
    fn decodes_pseudo_version_as_fetch() {
        let route = module_route("/example.com/m/@v/v0.0.0-20190101000000-abcdef012345.info");
        assert_eq!(route.op, ModuleOp::Fetch);
    }

    #[test]
    fn non_semver_version_upgrades_to_lookup() {
        let route = module_route("/example.com/m/@v/master.info");
        assert_eq!(route.op, ModuleOp::Lookup);
        assert_eq!(route.version, "master");
    }

    #[test]
    fn unescapes_module_path_and_version() {
        let route = module_route("/github.com/!azure/sdk/@v/v1.0.0-!r!c1.mod");
        assert_eq!(route.module, "github.com/Azure/sdk");
        assert_eq!(route.escaped_module, "github.com/!azure/sdk");
        assert_eq!(route.version, "v1.0.0-RC1");
    }

    #[test]
    fn recognizes_sumdb_prefix() {
        match decode_get("/sumdb/sum.golang.org/lookup/example.com/m@v1.0.0") {
            Ok(Route::Sumdb { raw }) => {
                assert_eq!(raw, "sum.golang.org/lookup/example.com/m@v1.0.0");
            }
            other => panic!("expected sumdb route, got {other:?}"),
        }
    }

    #[test]
    fn strips_configured_prefix() {
        match decode(&Method::GET, "/goproxy/example.com/m/@v/list", "/goproxy") {
            Ok(Route::Module(route)) => assert_eq!(route.module, "example.com/m"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_non_get_head() {
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            assert_eq!(
                decode(&method, "/example.com/m/@v/list", "").unwrap_err(),
                Rejection::MethodNotAllowed
            );
        }
        assert!(decode(&Method::HEAD, "/example.com/m/@v/list", "").is_ok());
    }

    #[test]
    fn rejects_malformed_paths() {
        for path in [
            "/example.com/m",
            "/example.com/m/@v/",
            "/example.com/m/@v/v1.0.0.tar.gz",
            "/example.com/m/@v/v1.0.0",
            "/example.com/!!m/@v/v1.0.0.info",
            "/example.com/m/@v/v1.!0.info",
            "/@v/v1.0.0.info",
            "/example.com/m/@v/a/@v/b.info",
        ] {
            assert_eq!(
                decode_get(path).unwrap_err(),
                Rejection::NotFound,
                "path {path}"
            );
        }
    }

    #[test]
    fn rejects_invalid_percent_encoding() {
        assert_eq!(
            decode_get("/example.com/%ff/@v/list").unwrap_err(),
            Rejection::NotFound
        );
    }

    #[test]
    fn cleans_dot_segments() {
        assert_eq!(clean_path("/a/b/../c"), "/a/c");
        assert_eq!(clean_path("/a//b/./c/"), "/a/b/c");
        assert_eq!(clean_path("/../.."), "/");
        assert_eq!(clean_path("/"), "/");

        let route = module_route("/x/../example.com/m/@v/list");
        assert_eq!(route.module, "example.com/m");
    }

    #[test]
    fn semver_validity() {
        assert!(is_valid_semver("v1.2.3"));
        assert!(is_valid_semver("v0.0.0-20190101000000-abcdef012345"));
        assert!(is_valid_semver("v2.0.0+incompatible"));
        assert!(!is_valid_semver("1.2.3"));
        assert!(!is_valid_semver("v1.2"));
        assert!(!is_valid_semver("latest"));
        assert!(!is_valid_semver("master"));
    }
}
