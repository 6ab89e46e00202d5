//! A minimalist Go module proxy handler.
//!
//! [`Proxy`] serves the module-download protocol: version lists, latest
//! resolution, query lookups, and `.info`/`.mod`/`.zip` artifacts, resolved
//! by driving the Go toolchain in per-request scratch directories. Fresh
//! downloads are verified against a checksum database and written back to a
//! pluggable [`Cacher`]; `sumdb/` requests are reverse-proxied to the
//! configured database hosts.
//!
//! The proxy does not touch the process environment it runs in: pass the
//! GOPROXY/GONOPROXY/GOSUMDB/GONOSUMDB/GOPRIVATE values you want it to
//! honor through [`Config::go_bin_env`].

pub mod cache;
mod config;
pub mod driver;
mod error;
mod escape;
mod proxy;
mod respond;
mod route;
mod sumdb;
pub mod verify;

pub use cache::{Cache, Cacher, ChecksumHash, DiskCacher, TempCacher};
pub use config::{Config, DEFAULT_SUMDB};
pub use driver::{DriverOp, DriverOutput, GoDriver, ModuleDriver, WorkerGate};
pub use error::{is_not_found_message, Error, Result};
pub use escape::{escape_path, escape_version, unescape_path, unescape_version};
pub use proxy::Proxy;
pub use verify::{HttpSumdbClient, SumdbClient};
