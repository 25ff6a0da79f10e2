pub mod ai;
pub mod config;
pub mod error;
pub mod ipc;
pub mod page;
pub mod session;
pub mod settings;
pub mod tabs;

use std::sync::Arc;

use ai::AiClient;
use config::DaemonConfig;
use ipc::event::EventBroadcaster;
use settings::SettingsStore;
use tabs::TabRegistry;

/// Shared application state passed to every RPC handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub settings: Arc<SettingsStore>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub tabs: Arc<TabRegistry>,
    pub ai: Arc<AiClient>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Construct the full context from a resolved configuration, loading
    /// persisted settings from the data directory.
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let settings = Arc::new(SettingsStore::load(&config.data_dir).await?);
        let ai = Arc::new(AiClient::new(&config));
        Ok(Arc::new(Self {
            config: Arc::new(config),
            settings,
            broadcaster: Arc::new(EventBroadcaster::new()),
            tabs: Arc::new(TabRegistry::new()),
            ai,
            started_at: std::time::Instant::now(),
        }))
    }
}

/// Context over a throwaway data directory, for handler and session tests.
#[cfg(test)]
pub(crate) async fn test_context() -> Arc<AppContext> {
    let dir = tempfile::tempdir().expect("tempdir").keep();
    let config = DaemonConfig::new(Some(0), Some(dir), Some("error".to_string()), None);
    AppContext::bootstrap(config).await.expect("test context")
}
