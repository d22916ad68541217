//! MCP surface: tools mirror the operation registry one to one, resources
//! expose read-only snapshots under the `toolhive://` scheme.
//!
//! Tool calls never fail at the protocol level. Operation failures travel
//! inside the JSON body, so a client always gets a well-formed result to
//! show the model.

use std::sync::Arc;

use chrono::Utc;
use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, ErrorData, Implementation, ListResourcesResult,
    ListToolsResult, PaginatedRequestParam, RawResource, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceContents, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler};
use serde_json::json;
use tracing::info;

use toolhive_mcp_core::OPERATIONS;

use crate::dispatcher::Dispatcher;

/// Fixed resource catalog: (uri, name, description).
const RESOURCES: &[(&str, &str, &str)] = &[
    (
        "toolhive://status",
        "ToolHive Status",
        "Current ToolHive system status and health information",
    ),
    (
        "toolhive://version",
        "ToolHive Version",
        "ToolHive version and build information",
    ),
    (
        "toolhive://openapi",
        "OpenAPI Specification",
        "Complete OpenAPI specification for ToolHive API",
    ),
    (
        "toolhive://servers",
        "All Servers",
        "List of all MCP servers managed by ToolHive with detailed status",
    ),
    (
        "toolhive://servers/running",
        "Running Servers",
        "List of currently running MCP servers only",
    ),
    (
        "toolhive://registry",
        "Registry Servers",
        "List of available MCP servers from all ToolHive registries",
    ),
    (
        "toolhive://registries",
        "All Registries",
        "List of all configured registries in ToolHive",
    ),
    (
        "toolhive://search",
        "Search Registry",
        "Search interface for finding MCP servers in registries",
    ),
    (
        "toolhive://clients",
        "Client Discovery",
        "Information about MCP clients compatible with ToolHive",
    ),
    (
        "toolhive://help",
        "Help and Usage",
        "Comprehensive help and usage information for the ToolHive MCP server",
    ),
];

#[derive(Clone)]
pub struct ToolHiveServer {
    dispatcher: Arc<Dispatcher>,
}

impl ToolHiveServer {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn tool_list() -> Vec<Tool> {
        OPERATIONS
            .iter()
            .map(|op| Tool::new(op.name, op.description, Arc::new(op.input_schema())))
            .collect()
    }

    fn resource_list() -> Vec<Resource> {
        RESOURCES
            .iter()
            .map(|(uri, name, description)| {
                let mut raw = RawResource::new(*uri, name.to_string());
                raw.description = Some(description.to_string());
                raw.mime_type = Some("application/json".to_string());
                raw.no_annotation()
            })
            .collect()
    }

    /// Resolve one `toolhive://` URI to its JSON body.
    async fn read_uri(&self, uri: &str) -> Result<String, ErrorData> {
        let body = match uri {
            "toolhive://status" => {
                self.dispatcher
                    .invoke("get_toolhive_status", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://version" => {
                self.dispatcher
                    .invoke("get_toolhive_version", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://openapi" => {
                self.dispatcher
                    .invoke("get_openapi_spec", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://servers" => self.dispatcher.servers_overview().await.to_pretty_json(),
            "toolhive://servers/running" => {
                self.dispatcher
                    .invoke("list_running_servers", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://registry" => {
                self.dispatcher
                    .invoke("list_registry_servers", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://registries" => {
                self.dispatcher
                    .invoke("list_registries", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://clients" => {
                self.dispatcher
                    .invoke("get_client_discovery", Default::default())
                    .await
                    .to_pretty_json()
            }
            "toolhive://search" => serde_json::to_string_pretty(&search_help())
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?,
            "toolhive://help" => serde_json::to_string_pretty(&usage_help())
                .map_err(|e| ErrorData::internal_error(e.to_string(), None))?,
            other => {
                return Err(ErrorData::resource_not_found(
                    format!("unknown resource: {other}"),
                    None,
                ));
            }
        };
        Ok(body)
    }
}

fn search_help() -> serde_json::Value {
    json!({
        "description": "Search for MCP servers in the ToolHive registry",
        "usage": "Use the 'search_registry_servers' tool with a query parameter",
        "examples": [
            { "query": "github", "description": "Find GitHub-related servers" },
            { "query": "api", "description": "Find API-related servers" },
            { "query": "memory", "description": "Find memory/storage servers" },
            { "query": "database", "description": "Find database servers" },
            { "query": "file", "description": "Find file system servers" },
        ],
        "note": "Search queries match against server names, descriptions, and tags",
        "timestamp": Utc::now().to_rfc3339(),
    })
}

fn usage_help() -> serde_json::Value {
    json!({
        "description": "ToolHive MCP server - manage ToolHive through natural language",
        "version": env!("CARGO_PKG_VERSION"),
        "tools_count": OPERATIONS.len(),
        "resources_count": RESOURCES.len(),
        "categories": {
            "server_management": [
                "list_running_servers",
                "run_mcp_server",
                "stop_mcp_server",
                "restart_mcp_server",
                "remove_mcp_server",
                "get_server_logs",
            ],
            "registry_management": [
                "list_registry_servers",
                "search_registry_servers",
                "get_server_requirements",
                "list_registries",
                "get_registry_details",
                "add_registry",
                "remove_registry",
            ],
            "system_information": [
                "get_toolhive_status",
                "get_toolhive_version",
                "get_client_discovery",
                "get_openapi_spec",
                "search_internet_for_mcp_server",
            ],
        },
        "documentation": {
            "api_reference": "See toolhive://openapi for the complete API specification",
            "registry_search": "See toolhive://search for search examples",
            "system_status": "See toolhive://status for current system health",
        },
        "timestamp": Utc::now().to_rfc3339(),
    })
}

impl ServerHandler for ToolHiveServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Manage ToolHive MCP servers: run, stop, remove and inspect workloads, \
                 browse and search the registry, and look up setup requirements before \
                 starting a server."
                    .to_string(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        Ok(ListToolsResult {
            tools: Self::tool_list(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        info!(tool = %request.name, "tool call");
        let arguments = request.arguments.unwrap_or_default();
        let result = self.dispatcher.invoke(&request.name, arguments).await;
        Ok(CallToolResult::success(vec![Content::text(
            result.to_pretty_json(),
        )]))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        Ok(ListResourcesResult {
            resources: Self::resource_list(),
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let text = self.read_uri(&request.uri).await?;
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}
