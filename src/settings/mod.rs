//! Persisted settings — the key-value configuration the core consumes.
//!
//! One JSON document on disk, last-write-wins, written with an
//! atomic-rename so a crash never leaves a torn file. The store is the
//! only holder of the running usage counter; `add_usage` performs the
//! read-modify-write entirely under the write lock so two overlapping
//! generation requests can never lose an increment.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

const SETTINGS_FILE: &str = "settings.json";

/// A reusable instruction snippet offered as a one-click button.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickQuery {
    pub id: String,
    pub name: String,
    pub query: String,
}

/// A reusable context snippet, concatenated into the prompt when enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuickContext {
    pub id: String,
    pub name: String,
    pub context: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Credential per provider key ("gemini", "openai").
    pub api_keys: BTreeMap<String, String>,
    pub default_model: String,
    /// Default number of rewrites per request.
    pub default_n: u8,
    pub debug_mode: bool,
    pub mock_suggestion: String,
    /// Running usage counter (approximate tokens). Monotonic except for
    /// an explicit reset.
    pub token_count: u64,
    pub last_used_query: String,
    pub last_used_n: u8,
    pub quick_queries: Vec<QuickQuery>,
    pub quick_contexts: Vec<QuickContext>,
    pub updated_at: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_keys: BTreeMap::new(),
            default_model: "gemini-1.5-flash".to_string(),
            default_n: 1,
            debug_mode: false,
            mock_suggestion: "This is a mock AI suggestion.".to_string(),
            token_count: 0,
            last_used_query: String::new(),
            last_used_n: 2,
            quick_queries: default_quick_queries(),
            quick_contexts: default_quick_contexts(),
            updated_at: None,
        }
    }
}

fn default_quick_queries() -> Vec<QuickQuery> {
    let entries = [
        ("default-grammar", "Grammar", "Check and correct grammar, spelling, and general writing errors."),
        ("default-concise", "Concise", "Make this text as concise as possible while preserving all details and information."),
        ("default-clearer", "Clearer", "Make this text clearer."),
        ("default-shorter", "Shorter", "Make this text shorter while preserving the original meaning and main points."),
        ("default-formal", "Formal", "Make this text more formal."),
        ("default-casual", "Casual", "Make this text more casual."),
        ("default-spanish", "Spanish", "Translate this text into Spanish."),
    ];
    entries
        .into_iter()
        .map(|(id, name, query)| QuickQuery {
            id: id.to_string(),
            name: name.to_string(),
            query: query.to_string(),
        })
        .collect()
}

fn default_quick_contexts() -> Vec<QuickContext> {
    vec![
        QuickContext {
            id: "default-brit".to_string(),
            name: "Brit".to_string(),
            context: "*Exclusively* use British English spelling.".to_string(),
            enabled: false,
        },
        QuickContext {
            id: "default-allcaps".to_string(),
            name: "All-caps".to_string(),
            context: "Only write in all-caps.".to_string(),
            enabled: false,
        },
    ]
}

pub struct SettingsStore {
    path: PathBuf,
    inner: RwLock<Settings>,
}

impl SettingsStore {
    /// Load settings from `{data_dir}/settings.json`, seeding defaults on
    /// first run. A corrupt file is replaced with defaults rather than
    /// refusing to start.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(SETTINGS_FILE);
        let settings = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Settings>(&bytes) {
                Ok(s) => s,
                Err(e) => {
                    warn!(path = %path.display(), err = %e, "settings file unreadable, using defaults");
                    Settings::default()
                }
            },
            Err(_) => {
                debug!(path = %path.display(), "no settings file, seeding defaults");
                Settings::default()
            }
        };
        let store = Self {
            path,
            inner: RwLock::new(settings),
        };
        store.persist(&*store.inner.read().await).await?;
        Ok(store)
    }

    pub async fn snapshot(&self) -> Settings {
        self.inner.read().await.clone()
    }

    pub async fn api_key(&self, provider: &str) -> Option<String> {
        self.inner
            .read()
            .await
            .api_keys
            .get(provider)
            .filter(|k| !k.is_empty())
            .cloned()
    }

    pub async fn token_count(&self) -> u64 {
        self.inner.read().await.token_count
    }

    /// Add to the usage counter and return the new total. Read, modify,
    /// write, and persist all happen under one write-lock acquisition —
    /// the exclusive section that keeps overlapping requests additive.
    pub async fn add_usage(&self, tokens: u64) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.token_count += tokens;
        let total = inner.token_count;
        self.persist(&inner).await?;
        Ok(total)
    }

    pub async fn reset_usage(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.token_count = 0;
        self.persist(&inner).await
    }

    /// Apply a mutation and persist the result.
    pub async fn update<F>(&self, mutate: F) -> Result<Settings>
    where
        F: FnOnce(&mut Settings),
    {
        let mut inner = self.inner.write().await;
        mutate(&mut inner);
        inner.updated_at = Some(Utc::now().to_rfc3339());
        self.persist(&inner).await?;
        Ok(inner.clone())
    }

    /// Merge a partial JSON patch over the current settings, key by key
    /// (last write wins, no transactional guarantees).
    pub async fn merge_patch(&self, patch: serde_json::Value) -> Result<Settings> {
        let mut inner = self.inner.write().await;
        let mut current =
            serde_json::to_value(&*inner).context("settings should serialize")?;
        if let (Some(obj), Some(patch)) = (current.as_object_mut(), patch.as_object()) {
            for (key, value) in patch {
                obj.insert(key.clone(), value.clone());
            }
        }
        let mut merged: Settings =
            serde_json::from_value(current).context("merged settings are not valid")?;
        merged.updated_at = Some(Utc::now().to_rfc3339());
        *inner = merged.clone();
        self.persist(&inner).await?;
        Ok(merged)
    }

    async fn persist(&self, settings: &Settings) -> Result<()> {
        let json = serde_json::to_vec_pretty(settings)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        Ok(())
    }
}
