//! Liveness endpoint
//!
//! Trivial HTTP responder for platform health checks. Answers every request
//! with a fixed body; shares nothing with the funnel beyond the process.

use anyhow::Result;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const RESPONSE: &[u8] =
    b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 10\r\nConnection: close\r\n\r\nI'm alive!";

/// Bind the port and serve liveness responses until the process exits.
pub async fn serve(port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "Liveness endpoint listening");

    loop {
        match listener.accept().await {
            Ok((mut socket, peer)) => {
                debug!(%peer, "Health check request");
                tokio::spawn(async move {
                    // Drain whatever request line arrives, then answer.
                    let mut buf = [0u8; 1024];
                    let _ = socket.read(&mut buf).await;
                    if let Err(e) = socket.write_all(RESPONSE).await {
                        debug!(error = %e, "Health response write failed");
                    }
                    let _ = socket.shutdown().await;
                });
            }
            Err(e) => {
                warn!(error = %e, "Health listener accept failed");
            }
        }
    }
}
