//! Toolchain driving: resolve and materialize module versions by running
//! the Go binary in per-request scratch directories.

mod gate;
mod go;

pub use gate::WorkerGate;
pub use go::GoDriver;

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// One toolchain operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOp {
    /// Enumerate tagged versions.
    List,
    /// Resolve the conventional "latest" version.
    Latest,
    /// Resolve a branch/commit/tag query to a canonical version.
    Lookup,
    /// Materialize all artifact files on disk.
    Download,
}

/// Result of a driver operation. Only the fields relevant to the operation
/// are populated; paths point into the scratch directory the operation ran
/// in and stay valid until that directory is released.
#[derive(Debug, Clone, Default)]
pub struct DriverOutput {
    /// Canonical version.
    pub version: String,
    /// Metadata (`.info`) file.
    pub info: Option<PathBuf>,
    /// Manifest (`.mod`) file.
    pub go_mod: Option<PathBuf>,
    /// Source archive (`.zip`) file.
    pub zip: Option<PathBuf>,
    /// Tagged versions, for [`DriverOp::List`].
    pub versions: Vec<String>,
}

/// Driver of the upstream toolchain.
///
/// Errors carry the toolchain's own message text so callers can classify
/// "version does not exist" apart from operational failures.
#[async_trait]
pub trait ModuleDriver: Send + Sync {
    async fn run(
        &self,
        op: DriverOp,
        scratch: &Path,
        module_path: &str,
        version: &str,
    ) -> Result<DriverOutput>;

    /// Release toolchain-internal caches rooted at `scratch` so the
    /// directory can be removed. Failures are tolerated.
    async fn clean(&self, scratch: &Path);
}
