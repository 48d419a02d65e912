//! Development server implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    body::Body,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower_http::services::ServeDir;

use crate::websocket::{client_script, inject_client, LiveReloadHub, ReloadMessage, CLIENT_PATH, SOCKET_PATH};

/// Largest HTML body the reload client is injected into.
const MAX_HTML_BYTES: usize = 16 * 1024 * 1024;

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct DevServerConfig {
    /// Directory to serve (the build root)
    pub root: PathBuf,

    /// Port to listen on
    pub port: u16,

    /// Host to bind to
    pub host: String,

    /// Open browser on start
    pub open: bool,
}

impl Default for DevServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("build"),
            port: 3000,
            host: "127.0.0.1".to_string(),
            open: true,
        }
    }
}

/// Errors that can occur with the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {0}: {1}")]
    BindError(String, String),

    #[error("Server on {0} stopped: {1}")]
    ServeError(SocketAddr, String),

    #[error("File watch error: {0}")]
    WatchError(String),
}

/// Development server: static files plus live reload.
pub struct DevServer {
    config: DevServerConfig,
    hub: LiveReloadHub,
    started: AtomicBool,
}

impl DevServer {
    /// Create a server that pushes messages from `hub`.
    pub fn new(config: DevServerConfig, hub: LiveReloadHub) -> Self {
        Self {
            config,
            hub,
            started: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DevServerConfig {
        &self.config
    }

    pub fn hub(&self) -> &LiveReloadHub {
        &self.hub
    }

    /// Routes: reload socket, reload client, and the build root.
    pub fn router(&self) -> Router {
        Router::new()
            .route(SOCKET_PATH, get(ws_handler))
            .route(CLIENT_PATH, get(client_script_handler))
            .fallback_service(ServeDir::new(&self.config.root))
            .layer(middleware::from_fn(inject_reload_client))
            .with_state(self.hub.clone())
    }

    /// Serve until the process stops.
    ///
    /// Once a call has bound the listener, later calls return immediately. A
    /// failed bind leaves the server startable again.
    pub async fn start(&self) -> Result<(), ServerError> {
        let Some(listener) = self.bind().await? else {
            tracing::debug!("Dev server already started");
            return Ok(());
        };

        let addr = listener.local_addr().map_err(|e| {
            ServerError::BindError(
                format!("{}:{}", self.config.host, self.config.port),
                e.to_string(),
            )
        })?;
        tracing::info!(
            "Serving {} at http://{}",
            self.config.root.display(),
            addr
        );

        if self.config.open {
            let url = format!("http://{}", addr);
            if let Err(e) = open::that(&url) {
                tracing::warn!("Failed to open browser: {}", e);
            }
        }

        axum::serve(listener, self.router())
            .await
            .map_err(|e| ServerError::ServeError(addr, e.to_string()))?;

        Ok(())
    }

    /// Bind the configured host and port. Host names are resolved.
    ///
    /// Returns `None` if an earlier call already bound.
    async fn bind(&self) -> Result<Option<tokio::net::TcpListener>, ServerError> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Ok(None);
        }

        let host = self.config.host.trim_matches(|c| c == '[' || c == ']');
        match tokio::net::TcpListener::bind((host, self.config.port)).await {
            Ok(listener) => Ok(Some(listener)),
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                Err(ServerError::BindError(
                    format!("{}:{}", self.config.host, self.config.port),
                    e.to_string(),
                ))
            }
        }
    }
}

/// Add the reload client to every HTML response.
async fn inject_reload_client(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_HTML_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("Failed to read HTML response: {}", e);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Handler for the live-reload WebSocket endpoint.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<LiveReloadHub>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, hub))
}

/// Forward reload messages to one client until it disconnects.
async fn handle_ws(mut socket: WebSocket, hub: LiveReloadHub) {
    let mut rx = hub.subscribe();

    if send_message(&mut socket, &ReloadMessage::Connected)
        .await
        .is_err()
    {
        return;
    }

    while let Ok(msg) = rx.recv().await {
        if send_message(&mut socket, &msg).await.is_err() {
            break;
        }
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ReloadMessage) -> Result<(), ()> {
    let json = serde_json::to_string(msg).map_err(|_| ())?;
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

/// Handler for the live-reload client script.
async fn client_script_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/javascript")], client_script())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use axum::http::Request;
    use tempfile::tempdir;
    use tower::ServiceExt;

    fn local_config(root: PathBuf) -> DevServerConfig {
        DevServerConfig {
            root,
            port: 0,
            host: "localhost".to_string(),
            open: false,
        }
    }

    async fn get(router: Router, uri: &str) -> Response {
        router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn creates_server_with_default_config() {
        let server = DevServer::new(DevServerConfig::default(), LiveReloadHub::new());
        assert_eq!(server.config().port, 3000);
        assert_eq!(server.config().root, PathBuf::from("build"));
    }

    #[tokio::test]
    async fn binds_host_names() {
        let temp = tempdir().unwrap();
        let server = DevServer::new(local_config(temp.path().to_path_buf()), LiveReloadHub::new());

        // Still serving when the timeout fires
        let first = tokio::time::timeout(Duration::from_millis(200), server.start()).await;
        assert!(first.is_err(), "start returned early: {:?}", first);
    }

    #[tokio::test]
    async fn second_start_after_success_returns_immediately() {
        let temp = tempdir().unwrap();
        let server = DevServer::new(local_config(temp.path().to_path_buf()), LiveReloadHub::new());

        let _ = tokio::time::timeout(Duration::from_millis(200), server.start()).await;

        let second = tokio::time::timeout(Duration::from_secs(1), server.start()).await;
        assert!(matches!(second, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn failed_start_can_be_retried() {
        let config = DevServerConfig {
            host: "not a host".to_string(),
            open: false,
            ..Default::default()
        };
        let server = DevServer::new(config, LiveReloadHub::new());

        assert!(matches!(server.start().await, Err(ServerError::BindError(..))));
        assert!(matches!(server.start().await, Err(ServerError::BindError(..))));
    }

    #[tokio::test]
    async fn injects_client_into_html_responses() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("index.html"),
            "<html><body><h1>Home</h1></body></html>",
        )
        .unwrap();
        let server = DevServer::new(local_config(temp.path().to_path_buf()), LiveReloadHub::new());

        let response = get(server.router(), "/index.html").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_LENGTH).is_none());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains(CLIENT_PATH));
        assert!(html.contains("<h1>Home</h1>"));
    }

    #[tokio::test]
    async fn passes_other_responses_through() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("styles")).unwrap();
        fs::write(temp.path().join("styles/main.css"), "body{color:red}").unwrap();
        let server = DevServer::new(local_config(temp.path().to_path_buf()), LiveReloadHub::new());

        let response = get(server.router(), "/styles/main.css").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("text/css")));
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"body{color:red}");
    }

    #[tokio::test]
    async fn serves_client_script() {
        let server = DevServer::new(DevServerConfig::default(), LiveReloadHub::new());

        let response = get(server.router(), CLIENT_PATH).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/javascript"
        );
    }
}
