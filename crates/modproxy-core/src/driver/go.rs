//! The Go binary driver.
//!
//! Each operation runs the configured Go binary inside the request's
//! scratch directory with `GOPATH` pointed at it, so everything the
//! toolchain materializes (including its download cache) is owned by the
//! request and reclaimed with the directory.

use super::{DriverOp, DriverOutput, ModuleDriver};
use crate::error::{Error, Result};
use crate::escape::escape_version;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Output;
use tracing::{debug, warn};

/// Driver implementation backed by the `go` command.
#[derive(Debug, Clone)]
pub struct GoDriver {
    bin: String,
    env: Vec<(String, String)>,
}

/// JSON record the Go binary prints for `go list -m -json` and
/// `go mod download -json`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct GoModuleRecord {
    version: String,
    time: Option<String>,
    versions: Option<Vec<String>>,
    info: Option<String>,
    go_mod: Option<String>,
    zip: Option<String>,
    error: Option<String>,
}

impl GoDriver {
    /// `bin` is the Go binary name; `env` is the full subprocess
    /// environment.
    pub fn new(bin: impl Into<String>, env: Vec<(String, String)>) -> Self {
        Self {
            bin: bin.into(),
            env,
        }
    }

    fn command(&self, scratch: &Path, args: &[&str]) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.bin);
        cmd.args(args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .env("GOPATH", scratch)
            .env("GOCACHE", scratch.join("gocache"))
            .env("GO111MODULE", "on")
            .current_dir(scratch)
            .kill_on_drop(true);
        cmd
    }

    async fn output(&self, scratch: &Path, args: &[&str]) -> Result<Output> {
        debug!(bin = %self.bin, ?args, "running toolchain");
        self.command(scratch, args)
            .output()
            .await
            .map_err(|e| Error::Driver {
                message: format!("failed to run {}: {}", self.bin, e),
            })
    }
}

#[async_trait]
impl ModuleDriver for GoDriver {
    async fn run(
        &self,
        op: DriverOp,
        scratch: &Path,
        module_path: &str,
        version: &str,
    ) -> Result<DriverOutput> {
        let target = format!("{module_path}@{version}");
        let args: Vec<&str> = match op {
            DriverOp::List => vec!["list", "-json", "-m", "-versions", &target],
            DriverOp::Latest | DriverOp::Lookup => vec!["list", "-json", "-m", &target],
            DriverOp::Download => vec!["mod", "download", "-json", &target],
        };

        let output = self.output(scratch, &args).await?;
        let record = parse_module_record(&output, module_path, version)?;

        let mut out = DriverOutput {
            version: record.version.clone(),
            versions: record.versions.unwrap_or_default(),
            info: record.info.map(PathBuf::from),
            go_mod: record.go_mod.map(PathBuf::from),
            zip: record.zip.map(PathBuf::from),
        };

        // The resolve operations report metadata on stdout only; materialize
        // the `.info` file the response will stream.
        if matches!(op, DriverOp::Latest | DriverOp::Lookup) {
            out.info = Some(write_info_file(scratch, &out.version, record.time.as_deref()).await?);
        }

        Ok(out)
    }

    async fn clean(&self, scratch: &Path) {
        match self.output(scratch, &["clean", "-modcache"]).await {
            Ok(output) if output.status.success() => {}
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(scratch = %scratch.display(), stderr = %stderr.trim(), "modcache clean failed");
            }
            Err(err) => {
                warn!(scratch = %scratch.display(), %err, "modcache clean failed");
            }
        }
    }
}

/// Write the metadata file for a resolved version into the scratch
/// directory and return its path.
async fn write_info_file(
    scratch: &Path,
    version: &str,
    time: Option<&str>,
) -> Result<PathBuf> {
    let mut info = json!({ "Version": version });
    if let Some(time) = time {
        info["Time"] = json!(time);
    }
    let path = scratch.join(format!("{}.info", escape_version(version)?));
    tokio::fs::write(&path, info.to_string())
        .await
        .map_err(|e| Error::io_with_path(e, &path))?;
    Ok(path)
}

/// Interpret a toolchain invocation's output, preferring the JSON error
/// field over the raw exit status.
fn parse_module_record(
    output: &Output,
    module_path: &str,
    version: &str,
) -> Result<GoModuleRecord> {
    let record: Option<GoModuleRecord> = serde_json::from_slice(&output.stdout).ok();

    if let Some(message) = record.as_ref().and_then(|r| r.error.clone()) {
        return Err(Error::Driver {
            message: strip_toolchain_prefix(&message, module_path, version),
        });
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let message = stderr.trim();
        let message = if message.is_empty() {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        } else {
            message.to_string()
        };
        return Err(Error::Driver {
            message: strip_toolchain_prefix(&message, module_path, version),
        });
    }

    record.ok_or_else(|| Error::Driver {
        message: format!(
            "unexpected toolchain output for {module_path}@{version}: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        ),
    })
}

/// Trim the tool and coordinate prefixes the Go binary puts in front of the
/// interesting part of an error message, so the not-found taxonomy can see
/// its anchored signals.
fn strip_toolchain_prefix(message: &str, module_path: &str, version: &str) -> String {
    let mut msg = message.trim();
    for prefix in ["go: ", "go list -m: ", "go mod download: "] {
        if let Some(rest) = msg.strip_prefix(prefix) {
            msg = rest;
            break;
        }
    }
    for prefix in [
        format!("{module_path}@{version}: "),
        format!("module {module_path}: "),
        format!("{module_path}: "),
    ] {
        if let Some(rest) = msg.strip_prefix(&prefix) {
            msg = rest;
            break;
        }
    }
    msg.to_string()
}
