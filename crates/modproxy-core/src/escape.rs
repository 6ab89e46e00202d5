//! Wire-form escaping of module paths and versions.
//!
//! The module-download protocol case-encodes identifiers so they survive
//! case-insensitive filesystems and URLs: an uppercase letter appears on the
//! wire as `!` followed by its lowercase form (`Azure` -> `!azure`).

use crate::error::{Error, Result};

/// Escape a module path into its wire form.
pub fn escape_path(path: &str) -> Result<String> {
    check_path(path)?;
    Ok(escape_string(path))
}

/// Decode a wire-form module path. Fails on stray `!`, uppercase input, or a
/// structurally invalid path.
pub fn unescape_path(escaped: &str) -> Result<String> {
    let path = unescape_string(escaped).ok_or_else(|| Error::InvalidPath {
        path: escaped.to_string(),
    })?;
    check_path(&path)?;
    Ok(path)
}

/// Escape a module version into its wire form.
pub fn escape_version(version: &str) -> Result<String> {
    check_version(version)?;
    Ok(escape_string(version))
}

/// Decode a wire-form module version.
pub fn unescape_version(escaped: &str) -> Result<String> {
    let version = unescape_string(escaped).ok_or_else(|| Error::InvalidVersion {
        version: escaped.to_string(),
    })?;
    check_version(&version)?;
    Ok(version)
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn unescape_string(escaped: &str) -> Option<String> {
    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        if c == '!' {
            match chars.next() {
                Some(l) if l.is_ascii_lowercase() => out.push(l.to_ascii_uppercase()),
                _ => return None,
            }
        } else if c.is_ascii_uppercase() {
            return None;
        } else {
            out.push(c);
        }
    }
    Some(out)
}

fn check_path(path: &str) -> Result<()> {
    let invalid = || Error::InvalidPath {
        path: path.to_string(),
    };
    if path.is_empty() || path.contains('!') {
        return Err(invalid());
    }
    for element in path.split('/') {
        if element.is_empty() || element == "." || element == ".." {
            return Err(invalid());
        }
    }
    if path.chars().any(|c| c.is_control() || c == ' ') {
        return Err(invalid());
    }
    Ok(())
}

fn check_version(version: &str) -> Result<()> {
    if version.is_empty()
        || version.contains('/')
        || version.contains('!')
        || version.chars().any(|c| c.is_control() || c == ' ')
    {
        return Err(Error::InvalidVersion {
            version: version.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_uppercase_letters() {
        assert_eq!(
            escape_path("github.com/Azure/azure-sdk").unwrap(),
            "github.com/!azure/azure-sdk"
        );
        assert_eq!(escape_version("v1.0.0-RC1").unwrap(), "v1.0.0-!r!c1");
    }

    #[test]
    fn unescapes_wire_form() {
        assert_eq!(
            unescape_path("github.com/!azure/azure-sdk").unwrap(),
            "github.com/Azure/azure-sdk"
        );
        assert_eq!(unescape_version("v1.0.0-!r!c1").unwrap(), "v1.0.0-RC1");
    }

    #[test]
    fn round_trips_legal_identifiers() {
        for path in [
            "example.com/m",
            "github.com/Masterminds/semver",
            "gopkg.in/yaml.v2",
            "k8s.io/API",
        ] {
            let escaped = escape_path(path).unwrap();
            assert_eq!(unescape_path(&escaped).unwrap(), path);
        }
        for version in ["v1.2.3", "v0.0.0-20190101000000-abcdef012345", "latest"] {
            let escaped = escape_version(version).unwrap();
            assert_eq!(unescape_version(&escaped).unwrap(), version);
        }
    }

    #[test]
    fn rejects_stray_bangs() {
        assert!(unescape_path("example.com/!Azure").is_err());
        assert!(unescape_path("example.com/m!").is_err());
        assert!(unescape_version("v1.!0").is_err());
    }

    #[test]
    fn rejects_uppercase_wire_forms() {
        assert!(unescape_path("example.com/Azure").is_err());
        assert!(unescape_version("v1.0.0-RC1").is_err());
    }

    #[test]
    fn rejects_malformed_paths() {
        assert!(unescape_path("").is_err());
        assert!(unescape_path("/example.com/m").is_err());
        assert!(unescape_path("example.com//m").is_err());
        assert!(unescape_path("example.com/m/").is_err());
        assert!(unescape_path("example.com/../m").is_err());
        assert!(unescape_version("v1/2").is_err());
    }
}
