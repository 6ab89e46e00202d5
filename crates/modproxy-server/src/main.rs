//! Go module proxy server.
//!
//! Thin binary around `modproxy-core`: argument parsing, logging bootstrap,
//! and the axum listener.

mod server;

use anyhow::Result;
use clap::Parser;
use modproxy_core::{Config, DiskCacher, Proxy};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "modproxy")]
#[command(about = "A minimalist Go module proxy")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Prefix stripped from request paths before routing
    #[arg(long, default_value = "")]
    path_prefix: String,

    /// Go binary to drive
    #[arg(long, default_value = "go")]
    go_bin: String,

    /// Extra key=value entries for the Go binary's environment (repeatable,
    /// last write wins)
    #[arg(long = "go-env")]
    go_env: Vec<String>,

    /// Maximum concurrent Go binary invocations (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_go_bin_workers: usize,

    /// Cache artifacts persistently under this directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Skip caching zip artifacts larger than this many bytes (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_zip_cache_bytes: u64,

    /// Checksum database hosts to serve passthrough requests for
    /// (repeatable)
    #[arg(long = "sumdb", default_value = "sum.golang.org")]
    supported_sumdb_names: Vec<String>,

    /// Suppress logging of module-not-found failures
    #[arg(long)]
    disable_not_found_log: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    let mut config = Config {
        go_bin_name: args.go_bin,
        max_go_bin_workers: args.max_go_bin_workers,
        path_prefix: args.path_prefix,
        max_zip_cache_bytes: args.max_zip_cache_bytes,
        supported_sumdb_names: args.supported_sumdb_names,
        disable_not_found_log: args.disable_not_found_log,
        ..Config::default()
    };
    // Ambient environment first, explicit overrides after (last write wins).
    config.go_bin_env.extend(args.go_env);
    if let Some(cache_dir) = args.cache_dir {
        info!("caching artifacts under {}", cache_dir.display());
        config.cacher = Some(Arc::new(DiskCacher::new(cache_dir)));
    }

    let proxy = Proxy::new(config)?;
    server::serve(proxy, &args.host, args.port).await
}
