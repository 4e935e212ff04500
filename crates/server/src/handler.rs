//! MCP server handler implementation.
//!
//! This module defines the main server handler that
//! routes tool calls to the coordinator's event methods.
use std::sync::Arc;

use crate::tools::cache::{CacheGetParams, CachePurgeParams, get_impl, list_impl, purge_impl};
use crate::tools::events::{NotificationClickParams, PushParams, SyncParams, notification_click_impl, push_impl, sync_impl};
use crate::tools::fetch::{FetchParams, fetch_impl};
use crate::tools::lifecycle::{MessageParams, activate_impl, install_impl, message_impl};

use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::{
        tool::{ToolCallContext, ToolRouter},
        wrapper::Parameters,
    },
    model::{
        CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
        ServerCapabilities, ServerInfo,
    },
    service::{RequestContext, RoleServer},
    tool, tool_router,
};
use safenest_client::Coordinator;

/// The main MCP server handler for the SafeNest coordinator.
#[derive(Clone)]
pub struct SafeNestServer {
    coordinator: Arc<Coordinator>,
    tool_router: ToolRouter<Self>,
}

/// Tool router implementation using the #[tool_router] macro.
///
/// This macro generates the routing logic that maps tool names to handler methods.
#[tool_router]
impl SafeNestServer {
    /// Create a new server handler around one coordinator instance.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator, tool_router: Self::tool_router() }
    }

    #[tool(
        description = "Deliver the install event: pre-cache the static manifest. Activates immediately when waiting is skipped; resumes persisted partitions if install fails."
    )]
    async fn sw_install(&self) -> Result<CallToolResult, McpError> {
        install_impl(&self.coordinator).await
    }

    #[tool(description = "Deliver the activate event: delete stale cache partitions and claim open pages.")]
    async fn sw_activate(&self) -> Result<CallToolResult, McpError> {
        activate_impl(&self.coordinator).await
    }

    /// Deliver a fetch event.
    ///
    /// API and static requests are served cache-first; navigations and
    /// everything else network-first with cache fallback.
    #[tool(
        description = "Deliver a fetch event for a URL. Returns the response the page would receive and whether it came from cache, network, or the offline fallback."
    )]
    async fn sw_fetch(&self, params: Parameters<FetchParams>) -> Result<CallToolResult, McpError> {
        fetch_impl(&self.coordinator, params.0).await
    }

    #[tool(description = "Deliver a background sync event with the given tag.")]
    async fn sw_sync(&self, params: Parameters<SyncParams>) -> Result<CallToolResult, McpError> {
        sync_impl(&self.coordinator, params.0).await
    }

    #[tool(description = "Deliver a push event. Returns the notification to display.")]
    async fn sw_push(&self, params: Parameters<PushParams>) -> Result<CallToolResult, McpError> {
        push_impl(&self.coordinator, params.0)
    }

    #[tool(description = "Deliver a notification click. Returns whether to close it and which page to open.")]
    async fn sw_notification_click(
        &self, params: Parameters<NotificationClickParams>,
    ) -> Result<CallToolResult, McpError> {
        notification_click_impl(&self.coordinator, params.0)
    }

    #[tool(description = "Post a control message from a page, e.g. {\"type\": \"SKIP_WAITING\"}.")]
    async fn sw_message(&self, params: Parameters<MessageParams>) -> Result<CallToolResult, McpError> {
        message_impl(&self.coordinator, params.0).await
    }

    #[tool(description = "Retrieve a cached response by partition, method and URL.")]
    async fn cache_get(&self, params: Parameters<CacheGetParams>) -> Result<CallToolResult, McpError> {
        get_impl(&self.coordinator, params.0).await
    }

    #[tool(description = "List cache partitions with entry counts and whether each belongs to the current version.")]
    async fn cache_list(&self) -> Result<CallToolResult, McpError> {
        list_impl(&self.coordinator).await
    }

    #[tool(description = "Purge entries from a cache partition by URL pattern or keep only the newest N.")]
    async fn cache_purge(&self, params: Parameters<CachePurgeParams>) -> Result<CallToolResult, McpError> {
        purge_impl(&self.coordinator, params.0).await
    }
}

impl ServerHandler for SafeNestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "safenest-sw".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, rmcp::model::ErrorData> {
        Ok(ListToolsResult { meta: None, tools: self.tool_router.list_all(), next_cursor: None })
    }

    async fn call_tool(
        &self, request: CallToolRequestParam, context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, rmcp::model::ErrorData> {
        self.tool_router
            .call(ToolCallContext::new(self, request, context))
            .await
    }
}
