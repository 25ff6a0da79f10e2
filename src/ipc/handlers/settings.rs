//! `settings.*` handlers.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::info;

use crate::AppContext;

pub async fn get(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(serde_json::to_value(ctx.settings.snapshot().await)?)
}

/// Merge the given keys into the stored settings and persist. A value
/// of the wrong type fails the whole patch and leaves the store untouched.
pub async fn update(params: Value, ctx: &AppContext) -> Result<Value> {
    let updated = ctx.settings.merge_patch(params).await?;
    let snapshot = serde_json::to_value(&updated)?;
    ctx.broadcaster.broadcast("settings.updated", snapshot.clone());
    info!("settings updated");
    Ok(snapshot)
}
