//! HTTP server lifecycle.
//!
//! Binds the API router to a TCP listener and serves it on a background task
//! until the cancellation token fires.

use crate::api;
use crate::error::AppError;
use crate::services::AssignmentEngine;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a running server.
pub struct ServerHandle {
    cancel_token: CancellationToken,
    local_addr: SocketAddr,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address actually bound (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and let in-flight requests finish.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }

    /// Wait for the server task to exit.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            log::error!("[server] Server task failed: {}", e);
        }
    }
}

/// Bind `addr` and start serving in the background.
pub async fn start(engine: Arc<AssignmentEngine>, addr: SocketAddr) -> Result<ServerHandle, AppError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AppError::unavailable(format!("Failed to bind to {}: {}", addr, e)))?;
    let local_addr = listener
        .local_addr()
        .map_err(|e| AppError::internal(format!("Failed to read bound address: {}", e)))?;

    let cancel_token = CancellationToken::new();
    let cancel_clone = cancel_token.clone();
    let app = api::routes(engine);

    log::info!("[server] Listening on http://{}", local_addr);

    let task = tokio::spawn(async move {
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            cancel_clone.cancelled().await;
        });

        if let Err(e) = server.await {
            log::error!("[server] Server error: {}", e);
        }

        log::info!("[server] Server stopped");
    });

    Ok(ServerHandle {
        cancel_token,
        local_addr,
        task,
    })
}

/// Serve until ctrl-c, then shut down gracefully.
pub async fn run(engine: Arc<AssignmentEngine>, addr: SocketAddr) -> Result<(), AppError> {
    let handle = start(engine, addr).await?;

    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!("[server] Shutdown signal received"),
        Err(e) => log::error!("[server] Failed to listen for shutdown signal: {}", e),
    }

    handle.shutdown();
    handle.wait().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{initialize, PoolSettings};
    use tempfile::tempdir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_serves_health_and_shuts_down() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();
        let engine = Arc::new(AssignmentEngine::new(pool));

        let handle = start(engine, "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert_ne!(handle.local_addr().port(), 0);

        let mut stream = tokio::net::TcpStream::connect(handle.local_addr())
            .await
            .unwrap();
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("x-request-id"));
        assert!(response.contains("\"status\":\"ok\""));

        handle.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bind_failure_is_unavailable() {
        let dir = tempdir().unwrap();
        let pool = initialize(&dir.path().join("test.db"), PoolSettings::default())
            .await
            .unwrap();
        let engine = Arc::new(AssignmentEngine::new(pool));

        let first = start(engine.clone(), "127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let err = start(engine, first.local_addr()).await.err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Unavailable);

        first.shutdown();
        first.wait().await;
    }
}
