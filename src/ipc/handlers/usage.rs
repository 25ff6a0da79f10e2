//! `usage.*` handlers: the cumulative token counter.

use anyhow::Result;
use serde_json::{json, Value};
use tracing::info;

use crate::AppContext;

pub async fn get(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "tokenCount": ctx.settings.token_count().await }))
}

pub async fn reset(_params: Value, ctx: &AppContext) -> Result<Value> {
    ctx.settings.reset_usage().await?;
    ctx.broadcaster
        .broadcast("usage.updated", json!({ "tokenCount": 0 }));
    info!("token counter reset");
    Ok(json!({ "success": true }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reset_zeroes_the_counter() {
        let ctx = crate::test_context().await;
        ctx.settings.add_usage(42).await.unwrap();
        assert_eq!(get(json!({}), &ctx).await.unwrap()["tokenCount"], 42);
        assert_eq!(reset(json!({}), &ctx).await.unwrap()["success"], true);
        assert_eq!(get(json!({}), &ctx).await.unwrap()["tokenCount"], 0);
    }
}
