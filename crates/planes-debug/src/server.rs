//! TCP debug server

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;

use crate::protocol::{DebugCommand, DebugResponse};

/// Trait that the application implements to handle debug commands
pub trait DebugHandler: Send + Sync + 'static {
    fn handle_command(&mut self, cmd: DebugCommand) -> DebugResponse;
}

pub type SharedHandler = Arc<Mutex<dyn DebugHandler>>;

/// Debug server handle - the server stops when this is dropped
pub struct DebugServer {
    handle: tokio::task::JoinHandle<()>,
    local_addr: Option<SocketAddr>,
}

impl DebugServer {
    /// Start the debug server on the given localhost port.
    /// Returns immediately; binding and serving happen in the background.
    /// Must be called from within a tokio runtime.
    pub fn start(handler: SharedHandler, port: u16) -> Self {
        let handle = tokio::spawn(async move {
            let addr = format!("127.0.0.1:{}", port);
            match TcpListener::bind(&addr).await {
                Ok(listener) => {
                    log::info!("Debug server listening on {}", addr);
                    accept_loop(listener, handler).await;
                }
                Err(e) => log::error!("Failed to bind debug server on {}: {}", addr, e),
            }
        });

        Self {
            handle,
            local_addr: None,
        }
    }

    /// Bind first, then serve in the background. Port 0 picks a free port;
    /// the bound address is available from [`DebugServer::local_addr`].
    pub async fn bind(handler: SharedHandler, addr: &str) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        log::info!("Debug server listening on {}", local_addr);
        let handle = tokio::spawn(accept_loop(listener, handler));
        Ok(Self {
            handle,
            local_addr: Some(local_addr),
        })
    }

    /// Bound address, known only for servers created with [`DebugServer::bind`].
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

impl Drop for DebugServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn accept_loop(listener: TcpListener, handler: SharedHandler) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                log::info!("Debug client connected from {}", peer);
                let handler = handler.clone();
                tokio::spawn(async move {
                    handle_connection(stream, handler).await;
                    log::info!("Debug client disconnected: {}", peer);
                });
            }
            Err(e) => {
                log::error!("Debug server accept error: {}", e);
            }
        }
    }
}

/// Parse one request line and produce the serialized response line.
async fn respond(line: &str, handler: &SharedHandler) -> String {
    let response = match serde_json::from_str::<DebugCommand>(line) {
        Ok(cmd) => {
            log::debug!("Debug command: {:?}", cmd);
            let mut h = handler.lock().await;
            h.handle_command(cmd)
        }
        Err(e) => DebugResponse::error(format!("Invalid command JSON: {}", e)),
    };

    let mut json = serde_json::to_string(&response).unwrap_or_else(|e| {
        format!(
            "{{\"status\":\"error\",\"message\":\"Serialize error: {}\"}}",
            e
        )
    });
    json.push('\n');
    json
}

async fn handle_connection(stream: TcpStream, handler: SharedHandler) {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => break, // Connection closed
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let reply = respond(trimmed, &handler).await;
                if let Err(e) = writer.write_all(reply.as_bytes()).await {
                    log::error!("Debug server write error: {}", e);
                    break;
                }
                if let Err(e) = writer.flush().await {
                    log::error!("Debug server flush error: {}", e);
                    break;
                }
            }
            Err(e) => {
                log::error!("Debug server read error: {}", e);
                break;
            }
        }
    }
}
