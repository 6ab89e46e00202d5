//! The request-resolution pipeline.
//!
//! A [`Proxy`] is an immutable HTTP handler built once from a [`Config`].
//! Module requests flow cache probe -> toolchain driver -> checksum
//! verification -> response, with the three artifact flavors written back
//! to the cache by a background task that outlives the client connection.

use crate::cache::{Cache, Cacher, TempCacher};
use crate::config::{Config, GoEnv};
use crate::driver::{DriverOp, DriverOutput, GoDriver, ModuleDriver, WorkerGate};
use crate::error::{Error, Result};
use crate::escape::escape_version;
use crate::respond::{self, AGE_FOREVER, AGE_MALFORMED, AGE_MUTABLE};
use crate::route::{self, ArtifactExt, ModuleOp, ModuleRoute, Rejection, Route};
use crate::sumdb;
use crate::verify::{dirhash, HttpSumdbClient, SumdbClient};
use axum::extract::Request;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::Response;
use reqwest::Url;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tracing::{error, warn};

/// How long a background cache write-back may run after its request ended.
const WRITE_BACK_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Module proxy HTTP handler.
pub struct Proxy {
    env: GoEnv,
    driver: Arc<dyn ModuleDriver>,
    gate: WorkerGate,
    cacher: Arc<dyn Cacher>,
    sumdb_client: Arc<dyn SumdbClient>,
    supported_sumdb_hosts: HashSet<String>,
    http_client: reqwest::Client,
    path_prefix: String,
    max_zip_cache_bytes: u64,
    disable_not_found_log: bool,
}

impl Proxy {
    /// Build a handler driving the configured Go binary.
    pub fn new(config: Config) -> Result<Self> {
        let env = GoEnv::new(&config.go_bin_env);
        let driver = Arc::new(GoDriver::new(config.go_bin_name.clone(), env.entries()));
        Self::with_driver(config, driver)
    }

    /// Build a handler around an externally supplied driver.
    pub fn with_driver(config: Config, driver: Arc<dyn ModuleDriver>) -> Result<Self> {
        let env = GoEnv::new(&config.go_bin_env);
        let http_client = reqwest::Client::builder().build()?;

        // Host names are compared in their IDNA-ASCII form; URL parsing
        // performs the normalization.
        let mut supported_sumdb_hosts = HashSet::new();
        for name in &config.supported_sumdb_names {
            if let Ok(url) = Url::parse(&format!("https://{name}")) {
                if let Some(host) = url.host_str() {
                    supported_sumdb_hosts.insert(host.to_string());
                }
            }
        }

        let sumdb_client = Arc::new(HttpSumdbClient::new(
            http_client.clone(),
            env.get("GOSUMDB"),
        ));

        Ok(Self {
            gate: WorkerGate::new(config.max_go_bin_workers),
            cacher: config.cacher.unwrap_or_else(|| Arc::new(TempCacher)),
            sumdb_client,
            supported_sumdb_hosts,
            http_client,
            path_prefix: config.path_prefix,
            max_zip_cache_bytes: config.max_zip_cache_bytes,
            disable_not_found_log: config.disable_not_found_log,
            env,
            driver,
        })
    }

    /// Replace the checksum-database client (used to inject a fake in
    /// tests, or a client that proxies lookups).
    pub fn with_sumdb_client(mut self, client: Arc<dyn SumdbClient>) -> Self {
        self.sumdb_client = client;
        self
    }

    /// Serve one request.
    pub async fn handle(&self, request: Request) -> Response {
        let (parts, _body) = request.into_parts();

        match route::decode(&parts.method, parts.uri.path(), &self.path_prefix) {
            Err(Rejection::MethodNotAllowed) => respond::method_not_allowed(),
            Err(Rejection::NotFound) => respond::not_found_default(AGE_MALFORMED),
            Ok(Route::Sumdb { raw }) => {
                sumdb::serve(
                    &self.http_client,
                    &self.supported_sumdb_hosts,
                    self.disable_not_found_log,
                    &raw,
                )
                .await
            }
            Ok(Route::Module(module_route)) => {
                self.serve_module(&parts.method, &parts.headers, module_route)
                    .await
            }
        }
    }

    async fn serve_module(
        &self,
        method: &Method,
        headers: &HeaderMap,
        route: ModuleRoute,
    ) -> Response {
        let mut scratch = match ScratchDir::new(self.driver.clone()) {
            Ok(scratch) => scratch,
            Err(err) => {
                error!(%err, "creating scratch directory failed");
                return respond::internal_server_error();
            }
        };

        let response = self
            .serve_module_inner(method, headers, route, &mut scratch)
            .await;
        scratch.release().await;
        response
    }

    async fn serve_module_inner(
        &self,
        method: &Method,
        headers: &HeaderMap,
        route: ModuleRoute,
        scratch: &mut ScratchDir,
    ) -> Response {
        if route.op == ModuleOp::List {
            return match self
                .run_driver(DriverOp::List, scratch.path(), &route.module, &route.version)
                .await
            {
                Ok(out) => respond::text(
                    StatusCode::OK,
                    Some(AGE_MUTABLE),
                    out.versions.join("\n"),
                ),
                Err(err) => self.error_response(&err),
            };
        }

        let caching_forever = route.op == ModuleOp::Fetch;
        let (name, version) = if caching_forever {
            (route.name.clone(), route.version.clone())
        } else {
            // Resolve the query to a canonical version, then serve it as if
            // that artifact had been asked for directly.
            let driver_op = if route.op == ModuleOp::Latest {
                DriverOp::Latest
            } else {
                DriverOp::Lookup
            };
            let out = match self
                .run_driver(driver_op, scratch.path(), &route.module, &route.version)
                .await
            {
                Ok(out) => out,
                Err(err) => return self.error_response(&err),
            };

            let escaped = match escape_version(&out.version) {
                Ok(escaped) => escaped,
                Err(err) => {
                    error!(%err, "driver returned an unescapable version");
                    return respond::internal_server_error();
                }
            };
            let name = format!(
                "{}/@v/{}{}",
                route.escaped_module,
                escaped,
                route.ext.as_str()
            );
            (name, out.version)
        };

        self.fetch_artifact(
            method,
            headers,
            scratch,
            &route.module,
            &version,
            route.ext,
            &name,
            caching_forever,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn fetch_artifact(
        &self,
        method: &Method,
        headers: &HeaderMap,
        scratch: &mut ScratchDir,
        module: &str,
        version: &str,
        ext: ArtifactExt,
        name: &str,
        caching_forever: bool,
    ) -> Response {
        let age = if caching_forever {
            AGE_FOREVER
        } else {
            AGE_MUTABLE
        };

        match self.cacher.get(name).await {
            Ok(cache) => return respond::serve_cache(method, headers, cache, age).await,
            Err(Error::CacheMiss) => {}
            Err(err) => {
                error!(%err, name, "cache probe failed");
                return respond::internal_server_error();
            }
        }

        let out = match self
            .run_driver(DriverOp::Download, scratch.path(), module, version)
            .await
        {
            Ok(out) => out,
            Err(err) => return self.error_response(&err),
        };
        let (info, go_mod, zip) = match (&out.info, &out.go_mod, &out.zip) {
            (Some(info), Some(go_mod), Some(zip)) => {
                (info.clone(), go_mod.clone(), zip.clone())
            }
            _ => {
                error!(module, version, "driver returned an incomplete artifact set");
                return respond::internal_server_error();
            }
        };

        if self.env.verifies(module) {
            if let Err(err) = self.verify(module, version, &go_mod, &zip).await {
                return self.error_response(&err);
            }
        }

        let requested = match ext {
            ArtifactExt::Info => info.clone(),
            ArtifactExt::Mod => go_mod.clone(),
            ArtifactExt::Zip => zip.clone(),
        };

        // Hand the scratch directory to the write-back task; from here on
        // client disconnects no longer affect caching.
        let guard = scratch.hijack();
        let write_back = WriteBack {
            cacher: self.cacher.clone(),
            name_prefix: name
                .strip_suffix(ext.as_str())
                .unwrap_or(name)
                .to_string(),
            info,
            go_mod,
            zip,
            max_zip_cache_bytes: self.max_zip_cache_bytes,
        };
        tokio::spawn(async move {
            write_back.run().await;
            guard.release().await;
        });

        let cache = match Cache::from_file(name, &requested, self.cacher.new_hash()).await {
            Ok(cache) => cache,
            Err(err) => {
                error!(%err, name, "opening artifact for response failed");
                return respond::internal_server_error();
            }
        };
        respond::serve_cache(method, headers, cache, age).await
    }

    /// Check a downloaded artifact set against the checksum database.
    async fn verify(
        &self,
        module: &str,
        version: &str,
        go_mod: &Path,
        zip: &Path,
    ) -> Result<()> {
        let zip_lines = self.sumdb_client.lookup(module, version).await?;
        let zip_path = zip.to_path_buf();
        let zip_hash = tokio::task::spawn_blocking(move || dirhash::hash_zip(&zip_path))
            .await
            .map_err(|e| Error::Other(format!("hash task failed: {e}")))??;
        if !zip_lines.contains(&format!("{module} {version} {zip_hash}")) {
            return Err(Error::UntrustedRevision {
                version: version.to_string(),
            });
        }

        let mod_lines = self
            .sumdb_client
            .lookup(module, &format!("{version}/go.mod"))
            .await?;
        let mod_path = go_mod.to_path_buf();
        let mod_hash = tokio::task::spawn_blocking(move || dirhash::hash_go_mod(&mod_path))
            .await
            .map_err(|e| Error::Other(format!("hash task failed: {e}")))??;
        if !mod_lines.contains(&format!("{module} {version}/go.mod {mod_hash}")) {
            return Err(Error::UntrustedRevision {
                version: version.to_string(),
            });
        }

        Ok(())
    }

    async fn run_driver(
        &self,
        op: DriverOp,
        scratch: &Path,
        module: &str,
        version: &str,
    ) -> Result<DriverOutput> {
        let _permit = self.gate.acquire().await;
        self.driver.run(op, scratch, module, version).await
    }

    /// Map a driver or verification failure onto the response taxonomy.
    fn error_response(&self, err: &Error) -> Response {
        match err {
            Error::UntrustedRevision { .. } => {
                error!("{err}");
                respond::not_found(AGE_MALFORMED, err.to_string())
            }
            _ if err.is_module_not_found() => {
                if !self.disable_not_found_log {
                    error!("{err}");
                }
                respond::not_found(AGE_MUTABLE, err.to_string())
            }
            _ => {
                error!("{err}");
                respond::internal_server_error()
            }
        }
    }
}

/// Background write of the three artifact flavors, detached from the
/// request that produced them.
struct WriteBack {
    cacher: Arc<dyn Cacher>,
    name_prefix: String,
    info: PathBuf,
    go_mod: PathBuf,
    zip: PathBuf,
    max_zip_cache_bytes: u64,
}

impl WriteBack {
    async fn run(self) {
        match tokio::time::timeout(WRITE_BACK_DEADLINE, self.write_all()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(%err, "module cache write-back failed"),
            Err(_) => error!("module cache write-back timed out"),
        }
    }

    async fn write_all(&self) -> Result<()> {
        for (ext, path) in [
            (".info", &self.info),
            (".mod", &self.go_mod),
            (".zip", &self.zip),
        ] {
            let name = format!("{}{}", self.name_prefix, ext);
            let cache = Cache::from_file(&name, path, self.cacher.new_hash()).await?;
            if ext == ".zip"
                && self.max_zip_cache_bytes != 0
                && cache.size() > self.max_zip_cache_bytes
            {
                continue;
            }
            self.cacher.put(cache).await?;
        }
        Ok(())
    }
}

/// Scratch directory owned by exactly one request, or by the write-back
/// task it hands ownership to.
struct ScratchDir {
    dir: Option<TempDir>,
    path: PathBuf,
    driver: Arc<dyn ModuleDriver>,
}

impl ScratchDir {
    fn new(driver: Arc<dyn ModuleDriver>) -> Result<Self> {
        let dir = tempfile::Builder::new().prefix("modproxy").tempdir()?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
            driver,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Re-bind cleanup responsibility to the returned guard. May happen at
    /// most once; afterwards [`ScratchDir::release`] is a no-op.
    fn hijack(&mut self) -> ScratchGuard {
        ScratchGuard {
            dir: self.dir.take(),
            driver: self.driver.clone(),
        }
    }

    /// Clean toolchain caches and remove the directory, unless ownership
    /// was hijacked.
    async fn release(&mut self) {
        if let Some(dir) = self.dir.take() {
            release_dir(dir, &self.driver).await;
        }
    }
}

struct ScratchGuard {
    dir: Option<TempDir>,
    driver: Arc<dyn ModuleDriver>,
}

impl ScratchGuard {
    async fn release(mut self) {
        if let Some(dir) = self.dir.take() {
            release_dir(dir, &self.driver).await;
        }
    }
}

async fn release_dir(dir: TempDir, driver: &Arc<dyn ModuleDriver>) {
    driver.clean(dir.path()).await;
    if let Err(err) = dir.close() {
        warn!(%err, "removing scratch directory failed");
    }
}
