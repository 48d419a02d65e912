//! Live-reload hook the transforms call when they finish.

/// What connected browsers should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadKind {
    /// Reload the whole page
    FullReload,
    /// Swap stylesheets in place
    StyleInject,
}

/// Receiver of live-reload signals, implemented by the dev server.
pub trait ReloadNotifier: Send + Sync {
    /// Push a signal to every connected client. No clients means no-op.
    fn notify(&self, kind: ReloadKind);
}
