//! WebSocket-based live reload.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use sitepipe_tasks::{ReloadKind, ReloadNotifier};

/// Path of the live-reload WebSocket endpoint.
pub const SOCKET_PATH: &str = "/__livereload";

/// Path of the client script injected into HTML pages.
pub const CLIENT_PATH: &str = "/__livereload.js";

/// Messages sent to connected browsers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReloadMessage {
    /// Full page reload
    Reload,

    /// Re-fetch stylesheets without navigating
    Css,

    /// Connection established
    Connected,
}

impl From<ReloadKind> for ReloadMessage {
    fn from(kind: ReloadKind) -> Self {
        match kind {
            ReloadKind::FullReload => ReloadMessage::Reload,
            ReloadKind::StyleInject => ReloadMessage::Css,
        }
    }
}

/// Hub for broadcasting reload messages to all connected clients.
#[derive(Debug, Clone)]
pub struct LiveReloadHub {
    sender: broadcast::Sender<ReloadMessage>,
}

impl LiveReloadHub {
    /// Create a new hub.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    /// Send a message to all connected clients.
    pub fn send(&self, msg: ReloadMessage) {
        // No receivers is fine
        let _ = self.sender.send(msg);
    }

    /// Subscribe to reload messages.
    pub fn subscribe(&self) -> broadcast::Receiver<ReloadMessage> {
        self.sender.subscribe()
    }

    /// Number of connected clients.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LiveReloadHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ReloadNotifier for LiveReloadHub {
    fn notify(&self, kind: ReloadKind) {
        tracing::debug!(
            "Live reload {:?} to {} clients",
            kind,
            self.subscriber_count()
        );
        self.send(kind.into());
    }
}

/// Insert the client script tag before `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{}"></script>"#, CLIENT_PATH);

    match html.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(html.len() + tag.len());
            out.push_str(&html[..pos]);
            out.push_str(&tag);
            out.push_str(&html[pos..]);
            out
        }
        None => format!("{}{}", html, tag),
    }
}

/// Client-side live-reload script.
pub fn client_script() -> String {
    format!(
        r#"
(function() {{
  'use strict';

  const protocol = location.protocol === 'https:' ? 'wss:' : 'ws:';
  const ws = new WebSocket(protocol + '//' + location.host + '{}');

  function refreshStyles() {{
    document.querySelectorAll('link[rel="stylesheet"]').forEach(function(link) {{
      const url = new URL(link.href);
      url.searchParams.set('__reload', Date.now().toString());
      link.href = url.toString();
    }});
  }}

  ws.onmessage = function(event) {{
    const msg = JSON.parse(event.data);

    switch (msg.type) {{
      case 'reload':
        location.reload();
        break;

      case 'css':
        refreshStyles();
        break;

      case 'connected':
        console.log('[sitepipe] Live reload connected');
        break;
    }}
  }};

  ws.onclose = function() {{
    console.log('[sitepipe] Live reload disconnected');
  }};
}})();
"#,
        SOCKET_PATH
    )
}
