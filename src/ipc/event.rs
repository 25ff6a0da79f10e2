//! Notification fan-out to connected UI surfaces.
//!
//! Connected clients get JSON-RPC notifications for state they mirror:
//! `daemon.ready` on startup, `usage.updated` after each counted
//! generation, `settings.updated` on configuration writes, and
//! `page.event` for synthesized input/change notifications, so a host
//! can observe mutations the way in-page listeners would.

use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Send a JSON-RPC notification to every connected client. A bus
    /// with no listeners is not an error.
    pub fn broadcast(&self, method: &str, params: Value) {
        let _ = self.tx.send(notification(method, params));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

fn notification(method: &str, params: Value) -> String {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
    .to_string()
}
