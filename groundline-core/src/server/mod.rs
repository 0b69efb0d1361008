//! Unix socket server exposing the ask operation.
//!
//! The server is organized into separate concerns:
//! - `types`: Protocol types for requests
//! - `handler`: Routing requests to the engine and shaping replies
//! - `transport`: Unix socket communication layer

mod handler;
mod transport;
mod types;

// Re-export types for external use
pub use handler::RequestHandler;
pub use transport::{serve_stream, TransportError};
pub use types::{AskPayload, Request};

use crate::config::Config;
use crate::rag::{RagEngine, Result as RagResult};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Main server coordinating transport and request handling.
pub struct Server {
    handler: Arc<handler::RequestHandler>,
    transport: transport::UnixSocketTransport,
}

impl Server {
    /// Creates a server backed by the configured Ollama and Qdrant endpoints.
    ///
    /// No upstream is contacted here; the first request does that.
    pub fn new(config: Config) -> RagResult<Self> {
        let engine = Arc::new(RagEngine::from_config(&config)?);
        Ok(Self::with_engine(config, engine))
    }

    /// Creates a server around an already constructed engine.
    pub fn with_engine(config: Config, engine: Arc<RagEngine>) -> Self {
        let transport = transport::UnixSocketTransport::new(config.server.socket_path.clone());
        let handler = Arc::new(handler::RequestHandler::new(config, engine));
        Self { handler, transport }
    }

    /// Starts the server and listens for connections until Ctrl-C.
    pub async fn start(&self) -> std::result::Result<(), TransportError> {
        let listener = self.transport.bind().await?;

        info!("Listening on {}", self.transport.socket_path());

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, _) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Accept failed: {}", e);
                            continue;
                        }
                    };
                    let handler = Arc::clone(&self.handler);
                    tokio::spawn(async move {
                        if let Err(e) = serve_stream(stream, &handler).await {
                            error!("Connection error: {}", e);
                        }
                    });
                }
                _ = &mut shutdown => {
                    info!("Shutting down...");
                    self.transport.cleanup();
                    break;
                }
            }
        }

        Ok(())
    }
}
