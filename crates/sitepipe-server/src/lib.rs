//! Development server with live reload for sitepipe.
//!
//! Serves the build root, watches sources, re-runs the affected transform and
//! pushes reload messages over a WebSocket.

pub mod server;
pub mod watcher;
pub mod websocket;

pub use server::{DevServer, DevServerConfig, ServerError};
pub use watcher::{watch, CategoryWorkers, ChangeKind, FileWatcher, WatchEvent};
pub use websocket::{LiveReloadHub, ReloadMessage};
