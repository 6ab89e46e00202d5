//! HTTP server wiring for the proxy handler.

use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use modproxy_core::Proxy;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

async fn handle(State(proxy): State<Arc<Proxy>>, request: Request) -> Response {
    proxy.handle(request).await
}

/// Bind and serve until shutdown. Returns once the listener is closed.
pub async fn serve(proxy: Proxy, host: &str, port: u16) -> anyhow::Result<()> {
    let app = Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(proxy));

    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
