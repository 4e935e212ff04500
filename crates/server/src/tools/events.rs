//! sw_sync, sw_push and sw_notification_click tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::{Coordinator, SyncOutcome};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Parameters for the sw_sync tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SyncParams {
    /// Sync registration tag (the dashboard uses "background-sync").
    pub tag: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutput {
    pub tag: String,
    pub outcome: SyncOutcome,
}

pub async fn sync_impl(coordinator: &Coordinator, params: SyncParams) -> Result<CallToolResult, McpError> {
    let outcome = coordinator.handle_sync(&params.tag).await;
    json_result(&SyncOutput { tag: params.tag, outcome })
}

/// Parameters for the sw_push tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PushParams {
    /// Push payload text; JSON objects may set title, body and url.
    #[serde(default)]
    pub payload: Option<String>,
}

pub fn push_impl(coordinator: &Coordinator, params: PushParams) -> Result<CallToolResult, McpError> {
    let notification = coordinator.handle_push(params.payload.as_deref());
    json_result(&notification)
}

/// Parameters for the sw_notification_click tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct NotificationClickParams {
    /// Action button pressed; omitted for a click on the notification body.
    #[serde(default)]
    pub action: Option<String>,

    /// The `data.url` carried by the notification.
    #[serde(default)]
    pub url: Option<String>,
}

pub fn notification_click_impl(
    coordinator: &Coordinator, params: NotificationClickParams,
) -> Result<CallToolResult, McpError> {
    let outcome = coordinator.handle_notification_click(params.action.as_deref(), params.url.as_deref());
    json_result(&outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{EchoNetwork, coordinator, output};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sync_tags() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;

        let out = output(&sync_impl(&coordinator, SyncParams { tag: "background-sync".into() }).await.unwrap());
        assert_eq!(out["outcome"], "completed");

        let out = output(&sync_impl(&coordinator, SyncParams { tag: "other".into() }).await.unwrap());
        assert_eq!(out["outcome"], "ignored");
    }

    #[tokio::test]
    async fn test_push_text_payload() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;
        let params = PushParams { payload: Some("Motion at back door".into()) };

        let out = output(&push_impl(&coordinator, params).unwrap());
        assert_eq!(out["title"], "SafeNest");
        assert_eq!(out["body"], "Motion at back door");
        assert_eq!(out["data"]["url"], "/");
        assert_eq!(out["vibrate"], serde_json::json!([100, 50, 100]));
    }

    #[tokio::test]
    async fn test_notification_click_explore() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;
        let params = NotificationClickParams { action: Some("explore".into()), url: Some("/alerts".into()) };

        let out = output(&notification_click_impl(&coordinator, params).unwrap());
        assert_eq!(out["close"], true);
        assert_eq!(out["open_url"], "https://home.example.com/alerts");
    }
}
