//! TCP accept loop (§5 ambient plumbing): one `tokio` current-thread
//! runtime, one `TcpListener::accept` loop, one task per connection.

use std::sync::Arc;

use anyhow::Context;
use cache_core::CoreContext;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::connection::handle_connection;

/// `CoreContext` behind a single mutex: this is plumbing, not a redesign of
/// the single-logical-worker model (§5) — only one request's dispatch ever
/// holds the lock at a time.
pub type SharedContext = Arc<Mutex<CoreContext>>;

pub async fn run(ctx: CoreContext) -> anyhow::Result<()> {
    let addr = format!("{}:{}", ctx.config.server_host, ctx.config.server_port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("listening on {addr}");

    let shared: SharedContext = Arc::new(Mutex::new(ctx));

    loop {
        let (socket, peer) = listener.accept().await.context("accept failed")?;
        log::debug!("accepted connection from {peer}");
        {
            let ctx = shared.lock().await;
            ctx.stats.server.connections_accepted.incr();
        }
        let shared = Arc::clone(&shared);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(socket, shared.clone()).await {
                log::warn!("connection from {peer} ended with error: {e}");
            }
            let ctx = shared.lock().await;
            ctx.stats.server.connections_closed.incr();
        });
    }
}
