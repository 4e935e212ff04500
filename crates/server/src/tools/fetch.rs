//! sw_fetch tool implementation.
//!
//! Delivers a fetch event and reports the response the page would receive.

use std::collections::BTreeMap;

use rmcp::{ErrorData as McpError, model::CallToolResult};
use safenest_client::fetch::{Destination, FetchRequest};
use safenest_client::{Coordinator, ResponseSource, Route};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::json_result;
use crate::error::ToolError;

/// Parameters for the sw_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FetchParams {
    /// Absolute URL or a path resolved against the dashboard origin.
    pub url: String,

    /// HTTP method (default: GET).
    #[serde(default = "default_method")]
    pub method: String,

    /// Request destination: document, script, style, image, font or empty.
    #[serde(default)]
    pub destination: Option<String>,

    /// Accept header; navigations usually send text/html.
    #[serde(default)]
    pub accept: Option<String>,

    /// Id of the page issuing the request.
    #[serde(default)]
    pub client_id: Option<String>,
}

fn default_method() -> String {
    "GET".into()
}

/// Output from the sw_fetch tool.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutput {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub source: ResponseSource,
    /// None when the request was not intercepted.
    pub route: Option<Route>,
}

fn build_request(coordinator: &Coordinator, params: FetchParams) -> Result<FetchRequest, McpError> {
    let url = coordinator.resolve(&params.url)?;
    let method = params
        .method
        .to_ascii_uppercase()
        .parse()
        .map_err(|_| ToolError::InvalidInput(format!("unsupported method: {}", params.method)))?;

    let mut request = FetchRequest::get(url)
        .with_method(method)
        .with_destination(params.destination.as_deref().map(Destination::parse).unwrap_or_default());
    if let Some(accept) = params.accept {
        request = request.with_accept(accept);
    }
    if let Some(client_id) = params.client_id {
        request = request.with_client(client_id);
    }
    Ok(request)
}

pub async fn fetch_impl(coordinator: &Coordinator, params: FetchParams) -> Result<CallToolResult, McpError> {
    let request = build_request(coordinator, params)?;
    let outcome = coordinator.respond(&request).await?;

    let response = outcome.response;
    let output = FetchOutput {
        body: response.text(),
        url: response.url,
        status: response.status,
        headers: response.headers,
        source: outcome.source,
        route: outcome.route,
    };
    json_result(&output)
}
