//! HTTP server
//!
//! One tokio task per accepted connection, each served by hyper's HTTP/1
//! connection driver.

mod page;
mod routes;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

use crate::handler::RequestHandler;

/// HTTP server
pub struct Server {
  listener: TcpListener,
  local_addr: SocketAddr,
  handler: Arc<RequestHandler>,
}

impl Server {
  /// Create and bind HTTP server to specified address
  pub async fn bind(addr: &str, handler: Arc<RequestHandler>) -> std::io::Result<Self> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!("HTTP server bound to {}", local_addr);

    Ok(Self {
      listener,
      local_addr,
      handler,
    })
  }

  /// Get local listening address
  pub fn local_addr(&self) -> SocketAddr {
    self.local_addr
  }

  /// Handle a single client connection
  async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
    let io = TokioIo::new(stream);
    let handler = Arc::clone(&self.handler);

    let service = service_fn(move |req| {
      let handler = Arc::clone(&handler);
      async move { routes::handle_request(handler, peer_addr, req).await }
    });

    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
      error!("Error serving connection from {}: {}", peer_addr, e);
    }
    info!("Connection handler ended for {}", peer_addr);
  }

  /// Accept and process connections until Ctrl-C
  pub async fn run(self: Arc<Self>) {
    self
      .run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
          error!("Failed to listen for shutdown signal: {}", e);
          std::future::pending::<()>().await;
        }
      })
      .await
  }

  /// Accept and process connections until `shutdown` resolves.
  ///
  /// Connections already accepted keep running to completion.
  pub async fn run_until(self: Arc<Self>, shutdown: impl Future<Output = ()>) {
    info!("Server started, listening on {}", self.local_addr);
    tokio::pin!(shutdown);

    loop {
      tokio::select! {
        _ = &mut shutdown => {
          info!("Shutdown requested, no longer accepting connections");
          break;
        }
        accepted = self.listener.accept() => match accepted {
          Ok((stream, peer_addr)) => {
            info!("New connection accepted from {}", peer_addr);

            // Spawn an independent task for each connection
            let server = Arc::clone(&self);
            tokio::spawn(server.handle_connection(stream, peer_addr));
          }
          Err(e) => {
            error!("Failed to accept connection: {}", e);
          }
        }
      }
    }
  }
}
