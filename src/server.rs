//! HTTP server for the pastebin service

use crate::error::Result;
use crate::service::PasteService;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

/// Accepts connections and serves each one on its own task
pub struct PasteServer {
    service: Arc<PasteService>,
}

impl PasteServer {
    pub fn new(service: PasteService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }

    /// Bind `addr` and serve until the process is terminated
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_shutdown(listener, std::future::pending()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    ///
    /// Connections accepted before shutdown keep running to completion on
    /// their own tasks.
    pub async fn serve_with_shutdown<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let local_addr = listener.local_addr()?;
        info!("Pastebin listening on http://{}", local_addr);

        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    return Ok(());
                }
            };

            debug!("Accepted connection from {}", peer_addr);
            let io = TokioIo::new(stream);
            let service = Arc::clone(&self.service);

            tokio::task::spawn(async move {
                let handler = service_fn(move |req| {
                    let service = Arc::clone(&service);
                    async move {
                        Ok::<_, std::convert::Infallible>(service.handle(req, Some(peer_addr)).await)
                    }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, handler).await {
                    error!("Connection error from {}: {}", peer_addr, err);
                }
            });
        }
    }
}
