//! Proxy configuration and toolchain environment handling.
//!
//! The proxy does not mess with the process environment: it follows the
//! GOPROXY, GONOPROXY, GOSUMDB, GONOSUMDB, and GOPRIVATE values handed to it
//! (defaulting to the ambient environment), normalizing them once when the
//! handler is built.

use crate::cache::Cacher;
use std::collections::HashMap;
use std::sync::Arc;

/// Checksum database name (and public key) trusted by default.
pub const DEFAULT_SUMDB: &str =
    "sum.golang.org+033de0ae+Ac4zctda0e5eza+HJyk9SxEdh+s3Ux18htTTAD8OuAn8";

/// Configuration for a [`Proxy`](crate::Proxy).
///
/// Field semantics follow the module-download protocol conventions; every
/// field has a usable default.
#[derive(Clone)]
pub struct Config {
    /// Name of the Go binary the driver executes.
    pub go_bin_name: String,
    /// Environment of the Go binary, `key=value` entries. Duplicate keys are
    /// last-write-wins.
    pub go_bin_env: Vec<String>,
    /// Maximum concurrent Go binary invocations; 0 means unlimited.
    pub max_go_bin_workers: usize,
    /// Prefix stripped from every request path before routing. Should start
    /// with `/` when non-empty.
    pub path_prefix: String,
    /// Cache backend. `None` keeps artifacts only for the life of the
    /// request that produced them.
    pub cacher: Option<Arc<dyn Cacher>>,
    /// Skip caching zip artifacts larger than this; 0 means unlimited.
    pub max_zip_cache_bytes: u64,
    /// Checksum database hosts this proxy will serve passthrough requests
    /// for.
    pub supported_sumdb_names: Vec<String>,
    /// Suppress log output for classified not-found failures.
    pub disable_not_found_log: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            go_bin_name: "go".to_string(),
            go_bin_env: std::env::vars().map(|(k, v)| format!("{k}={v}")).collect(),
            max_go_bin_workers: 0,
            path_prefix: String::new(),
            cacher: None,
            max_zip_cache_bytes: 0,
            supported_sumdb_names: vec!["sum.golang.org".to_string()],
            disable_not_found_log: false,
        }
    }
}

/// Normalized toolchain environment.
#[derive(Debug, Clone, Default)]
pub(crate) struct GoEnv {
    vars: HashMap<String, String>,
}

impl GoEnv {
    /// Parse `key=value` entries (last write wins) and normalize the module
    /// resolution keys.
    pub(crate) fn new(entries: &[String]) -> Self {
        let mut vars = HashMap::new();
        for entry in entries {
            if let Some((key, value)) = entry.split_once('=') {
                vars.insert(key.to_string(), value.to_string());
            }
        }
        let mut env = Self { vars };
        env.normalize();
        env
    }

    /// Value for a key, empty string when unset.
    pub(crate) fn get(&self, key: &str) -> &str {
        self.vars.get(key).map(String::as_str).unwrap_or("")
    }

    /// All entries, sorted by key for deterministic subprocess environments.
    pub(crate) fn entries(&self) -> Vec<(String, String)> {
        let mut entries: Vec<_> = self
            .vars
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort();
        entries
    }

    /// Whether checksum-database verification applies to a module path.
    pub(crate) fn verifies(&self, module_path: &str) -> bool {
        self.get("GOSUMDB") != "off" && !globs_match_path(self.get("GONOSUMDB"), module_path)
    }

    fn normalize(&mut self) {
        // GOPROXY: comma-separated list, stopping at the first terminal
        // `direct`/`off` entry.
        let mut proxies = Vec::new();
        for proxy in self.get("GOPROXY").split(',') {
            let proxy = proxy.trim();
            if proxy.is_empty() {
                continue;
            }
            proxies.push(proxy.to_string());
            if proxy == "direct" || proxy == "off" {
                break;
            }
        }
        let goproxy = if !proxies.is_empty() {
            proxies.join(",")
        } else if self.get("GOPROXY").is_empty() {
            "https://proxy.golang.org,direct".to_string()
        } else {
            "off".to_string()
        };
        self.vars.insert("GOPROXY".to_string(), goproxy);

        let gosumdb = self.get("GOSUMDB").trim().to_string();
        if gosumdb.is_empty() || gosumdb == "sum.golang.org" {
            self.vars
                .insert("GOSUMDB".to_string(), DEFAULT_SUMDB.to_string());
        } else {
            self.vars.insert("GOSUMDB".to_string(), gosumdb);
        }

        for key in ["GONOPROXY", "GONOSUMDB"] {
            if self.get(key).is_empty() {
                let private = self.get("GOPRIVATE").to_string();
                self.vars.insert(key.to_string(), private);
            }
            let patterns: Vec<String> = self
                .get(key)
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !patterns.is_empty() {
                self.vars.insert(key.to_string(), patterns.join(","));
            }
        }
    }
}

/// Report whether any path prefix of `target` matches one of the shell-glob
/// patterns in the comma-separated `globs` list.
///
/// A pattern with N slashes is matched against the first N+1 path elements
/// of the target. Empty or malformed patterns are ignored.
pub(crate) fn globs_match_path(globs: &str, target: &str) -> bool {
    let options = glob::MatchOptions {
        require_literal_separator: true,
        ..Default::default()
    };
    for pattern in globs.split(',') {
        if pattern.is_empty() {
            continue;
        }

        let elements = pattern.matches('/').count() + 1;
        let prefix = match target.match_indices('/').nth(elements - 1) {
            Some((idx, _)) => &target[..idx],
            None if target.matches('/').count() + 1 == elements => target,
            None => continue,
        };

        match glob::Pattern::new(pattern) {
            Ok(p) if p.matches_with(prefix, options) => return true,
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(entries: &[&str]) -> GoEnv {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        GoEnv::new(&entries)
    }

    #[test]
    fn goproxy_defaults_when_unset() {
        let env = env(&[]);
        assert_eq!(env.get("GOPROXY"), "https://proxy.golang.org,direct");
    }

    #[test]
    fn goproxy_stops_at_terminal_entry() {
        let env = env(&["GOPROXY=https://a.example, direct ,https://b.example"]);
        assert_eq!(env.get("GOPROXY"), "https://a.example,direct");
    }

    #[test]
    fn goproxy_all_filtered_becomes_off() {
        let env = env(&["GOPROXY= , ,"]);
        assert_eq!(env.get("GOPROXY"), "off");
    }

    #[test]
    fn gosumdb_canonicalizes_default_host() {
        assert_eq!(env(&[]).get("GOSUMDB"), DEFAULT_SUMDB);
        assert_eq!(env(&["GOSUMDB= sum.golang.org "]).get("GOSUMDB"), DEFAULT_SUMDB);
        assert_eq!(
            env(&["GOSUMDB=sum.example.org+abc"]).get("GOSUMDB"),
            "sum.example.org+abc"
        );
    }

    #[test]
    fn gonoproxy_and_gonosumdb_default_to_goprivate() {
        let env = env(&["GOPRIVATE=*.corp.example.com , internal.example.com"]);
        assert_eq!(
            env.get("GONOPROXY"),
            "*.corp.example.com,internal.example.com"
        );
        assert_eq!(
            env.get("GONOSUMDB"),
            "*.corp.example.com,internal.example.com"
        );
    }

    #[test]
    fn explicit_gonosumdb_wins_over_goprivate() {
        let env = env(&["GOPRIVATE=a.example.com", "GONOSUMDB=b.example.com"]);
        assert_eq!(env.get("GONOSUMDB"), "b.example.com");
    }

    #[test]
    fn duplicate_keys_are_last_write_wins() {
        let env = env(&["GOSUMDB=first.example", "GOSUMDB=off"]);
        assert_eq!(env.get("GOSUMDB"), "off");
        assert!(!env.verifies("example.com/m"));
    }

    #[test]
    fn verifies_honors_gonosumdb_globs() {
        let env = env(&["GONOSUMDB=*.corp.example.com,rsc.io/private"]);
        assert!(env.verifies("example.com/m"));
        assert!(!env.verifies("git.corp.example.com/m"));
        assert!(!env.verifies("rsc.io/private"));
        assert!(!env.verifies("rsc.io/private/quote"));
    }

    #[test]
    fn glob_prefix_element_counting() {
        assert!(globs_match_path("example.com", "example.com/foo/bar"));
        assert!(globs_match_path("example.com/*", "example.com/foo/bar"));
        assert!(!globs_match_path("example.com/*/baz", "example.com/foo/bar"));
        assert!(globs_match_path("*/foo", "example.com/foo/bar"));
        assert!(globs_match_path("*", "example.com/foo"));
        assert!(!globs_match_path("other.com", "example.com/foo"));
        // Not enough target elements for the pattern.
        assert!(!globs_match_path("example.com/foo/bar", "example.com/foo"));
        // Empty and malformed patterns are skipped.
        assert!(!globs_match_path("", "example.com"));
        assert!(globs_match_path(",[,example.com", "example.com/m"));
    }
}
