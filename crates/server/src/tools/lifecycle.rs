//! sw_install, sw_activate and sw_message tool implementations.

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::{ActivateReport, ControlMessage, Coordinator, InstallReport, WorkerState};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;

/// Output from the sw_install tool.
#[derive(Debug, Clone, Serialize)]
pub struct InstallOutput {
    pub state: WorkerState,
    /// None when install failed and persisted partitions were resumed.
    pub install: Option<InstallReport>,
    /// Present when activation followed install immediately.
    pub activate: Option<ActivateReport>,
    /// Why install failed, when the coordinator resumed instead.
    pub install_error: Option<String>,
}

/// Run install, then activate straight away if waiting may be skipped.
///
/// When install fails but this version's partitions survive from an
/// earlier run, the coordinator resumes them and keeps serving.
pub async fn install_impl(coordinator: &Coordinator) -> Result<CallToolResult, McpError> {
    let install = match coordinator.install().await {
        Ok(report) => report,
        Err(e) => {
            if !coordinator.resume().await? {
                return Err(e.into());
            }
            let output =
                InstallOutput { state: coordinator.state(), install: None, activate: None, install_error: Some(e.to_string()) };
            return json_result(&output);
        }
    };

    let activate = if coordinator.ready_to_activate() { Some(coordinator.activate().await?) } else { None };

    json_result(&InstallOutput { state: coordinator.state(), install: Some(install), activate, install_error: None })
}

/// Output from the sw_activate tool.
#[derive(Debug, Clone, Serialize)]
pub struct ActivateOutput {
    pub state: WorkerState,
    #[serde(flatten)]
    pub report: ActivateReport,
}

pub async fn activate_impl(coordinator: &Coordinator) -> Result<CallToolResult, McpError> {
    let report = coordinator.activate().await?;
    json_result(&ActivateOutput { state: coordinator.state(), report })
}

/// Parameters for the sw_message tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct MessageParams {
    /// Message posted by a page, e.g. `{"type": "SKIP_WAITING"}`.
    pub message: serde_json::Value,
}

/// Output from the sw_message tool.
#[derive(Debug, Clone, Serialize)]
pub struct MessageOutput {
    /// Whether the message type was recognized.
    pub recognized: bool,
    pub state: WorkerState,
    pub activate: Option<ActivateReport>,
}

pub async fn message_impl(coordinator: &Coordinator, params: MessageParams) -> Result<CallToolResult, McpError> {
    let message = ControlMessage::parse(&params.message);
    let recognized = message != ControlMessage::Unknown;
    let activate = coordinator.handle_message(message).await?;

    json_result(&MessageOutput { recognized, state: coordinator.state(), activate })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{EchoNetwork, coordinator, output};
    use safenest_core::{CacheEntry, CachedResponse};
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_install_activates_immediately() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;

        let result = install_impl(&coordinator).await.unwrap();
        let out = output(&result);
        assert_eq!(out["state"], "activated");
        assert_eq!(out["install"]["cached"], 2);
        assert_eq!(out["install"]["partition"], "safenest-static-v1.0.0");
        assert!(out["activate"].is_object());
    }

    #[tokio::test]
    async fn test_install_offline_fails() {
        let network = Arc::new(EchoNetwork::default());
        network.offline.store(true, Ordering::SeqCst);
        let coordinator = coordinator(network).await;

        let err = install_impl(&coordinator).await.unwrap_err();
        assert!(err.message.starts_with("INSTALL_FAILED:"));
        assert_eq!(coordinator.state(), WorkerState::Redundant);
    }

    #[tokio::test]
    async fn test_install_offline_resumes_saved_partitions() {
        let network = Arc::new(EchoNetwork::default());
        let coordinator = coordinator(network.clone()).await;
        let saved = CachedResponse::new("https://home.example.com/", 200, Default::default(), b"saved".to_vec());
        coordinator
            .cache()
            .put_entry(&CacheEntry::new("safenest-static-v1.0.0", "GET", "https://home.example.com/", saved))
            .await
            .unwrap();
        network.offline.store(true, Ordering::SeqCst);

        let out = output(&install_impl(&coordinator).await.unwrap());
        assert_eq!(out["state"], "activated");
        assert!(out["install"].is_null());
        assert!(out["install_error"].as_str().unwrap().starts_with("INSTALL_FAILED:"));
    }

    #[tokio::test]
    async fn test_activate_before_install_rejected() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;
        assert!(activate_impl(&coordinator).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_message() {
        let coordinator = coordinator(Arc::new(EchoNetwork::default())).await;
        let params = MessageParams { message: serde_json::json!({ "type": "PING" }) };

        let out = output(&message_impl(&coordinator, params).await.unwrap());
        assert_eq!(out["recognized"], false);
        assert_eq!(out["state"], "parsed");
    }
}
