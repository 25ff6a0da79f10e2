//! Tab registry — the coordinator's view of open host documents.
//!
//! Each tab pairs a [`Document`] with an optional injected binding
//! handle. The registry tracks which tab is active (new tabs become
//! active, like a foreground navigation) and performs the lazy
//! probe-then-inject dance: a binding is only installed when a ping on
//! the existing handle fails, because re-injecting over a live binding
//! would duplicate its selection listener.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::RedraftError;
use crate::page::binding::{self, BindingHandle};
use crate::page::{Document, ElementSpec};

pub type TabId = u64;

struct TabEntry {
    doc: Arc<Mutex<Document>>,
    binding: Option<BindingHandle>,
}

#[derive(Default)]
struct Inner {
    tabs: HashMap<TabId, TabEntry>,
    active: Option<TabId>,
    next_id: TabId,
}

#[derive(Default)]
pub struct TabRegistry {
    inner: RwLock<Inner>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a document and make it the active tab.
    pub async fn open(&self, specs: &[ElementSpec]) -> TabId {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tabs.insert(
            id,
            TabEntry {
                doc: Arc::new(Mutex::new(Document::new(specs))),
                binding: None,
            },
        );
        inner.active = Some(id);
        info!(tab = id, "tab opened");
        id
    }

    pub async fn activate(&self, id: TabId) -> Result<(), RedraftError> {
        let mut inner = self.inner.write().await;
        if !inner.tabs.contains_key(&id) {
            return Err(RedraftError::TabNotFound(id));
        }
        inner.active = Some(id);
        Ok(())
    }

    /// Close a tab. Dropping the entry drops the binding handle, which
    /// stops the binding task on its next channel poll.
    pub async fn close(&self, id: TabId) -> Result<(), RedraftError> {
        let mut inner = self.inner.write().await;
        inner
            .tabs
            .remove(&id)
            .ok_or(RedraftError::TabNotFound(id))?;
        if inner.active == Some(id) {
            inner.active = inner.tabs.keys().max().copied();
        }
        info!(tab = id, "tab closed");
        Ok(())
    }

    pub async fn active(&self) -> Option<TabId> {
        self.inner.read().await.active
    }

    pub async fn count(&self) -> usize {
        self.inner.read().await.tabs.len()
    }

    pub async fn document(&self, id: TabId) -> Result<Arc<Mutex<Document>>, RedraftError> {
        let inner = self.inner.read().await;
        inner
            .tabs
            .get(&id)
            .map(|t| Arc::clone(&t.doc))
            .ok_or(RedraftError::TabNotFound(id))
    }

    /// The binding currently installed in a tab, if any. No probe, no
    /// injection — callers that must not install listeners use this.
    pub async fn binding(&self, id: TabId) -> Result<Option<BindingHandle>, RedraftError> {
        let inner = self.inner.read().await;
        inner
            .tabs
            .get(&id)
            .map(|t| t.binding.clone())
            .ok_or(RedraftError::TabNotFound(id))
    }

    /// Binding handle for a tab, probing then injecting as needed: a
    /// stored handle whose ping succeeds is reused; anything else —
    /// no handle, or a dead task behind it — triggers a fresh injection.
    pub async fn ensure_binding(&self, id: TabId) -> Result<BindingHandle, RedraftError> {
        let existing = {
            let inner = self.inner.read().await;
            let entry = inner.tabs.get(&id).ok_or(RedraftError::TabNotFound(id))?;
            entry.binding.clone()
        };
        if let Some(handle) = existing {
            match handle.ping().await {
                Ok(()) => return Ok(handle),
                Err(e) => debug!(tab = id, err = %e, "binding probe failed, re-injecting"),
            }
        } else {
            debug!(tab = id, "no binding installed, injecting");
        }

        let mut inner = self.inner.write().await;
        let entry = inner.tabs.get_mut(&id).ok_or(RedraftError::TabNotFound(id))?;
        let handle = binding::inject(Arc::clone(&entry.doc));
        entry.binding = Some(handle.clone());
        Ok(handle)
    }
}
