//! Checksum-database verification support.
//!
//! The proxy compares hashes of freshly downloaded artifacts against the
//! records a checksum database serves for the version. The database client
//! is a seam: anything that can answer lookups fits behind [`SumdbClient`].

pub mod dirhash;

use crate::error::{Error, Result};
use crate::escape::{escape_path, escape_version};
use async_trait::async_trait;

/// Lookup client for a checksum database.
#[async_trait]
pub trait SumdbClient: Send + Sync {
    /// Records for `module_path@version`, one per line, of the form
    /// `<module> <version> <hash>`. `version` may carry a `/go.mod` suffix
    /// to address the manifest record.
    ///
    /// Failures carry the upstream text so callers can classify them the
    /// same way as driver errors.
    async fn lookup(&self, module_path: &str, version: &str) -> Result<Vec<String>>;
}

/// HTTP lookup client querying the database host directly.
///
/// Record-signature verification is the database operator's side of the
/// protocol; this client trusts the TLS transport and returns the body
/// lines as-is.
pub struct HttpSumdbClient {
    client: reqwest::Client,
    host: String,
}

impl HttpSumdbClient {
    /// `gosumdb` is the configured database name, either `<host>` or
    /// `<host>+<public-key>`.
    pub fn new(client: reqwest::Client, gosumdb: &str) -> Self {
        let host = gosumdb
            .split_once('+')
            .map(|(host, _)| host)
            .unwrap_or(gosumdb)
            .trim()
            .to_string();
        Self { client, host }
    }

    fn lookup_url(&self, module_path: &str, version: &str) -> Result<String> {
        let (version, suffix) = match version.strip_suffix("/go.mod") {
            Some(stem) => (stem, "/go.mod"),
            None => (version, ""),
        };
        Ok(format!(
            "https://{}/lookup/{}@{}{}",
            self.host,
            escape_path(module_path)?,
            escape_version(version)?,
            suffix
        ))
    }
}

#[async_trait]
impl SumdbClient for HttpSumdbClient {
    async fn lookup(&self, module_path: &str, version: &str) -> Result<Vec<String>> {
        let url = self.lookup_url(module_path, version)?;
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::SumdbLookup {
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::SumdbLookup {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(Error::SumdbLookup {
                message: format!("{}: {}", status, body.trim()),
            });
        }

        Ok(body.lines().map(str::to_string).collect())
    }
}
