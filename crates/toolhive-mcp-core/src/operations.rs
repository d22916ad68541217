use serde_json::{Map, Value, json};

/// Declared type of a single operation argument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgKind {
    Str,
    Int,
    Bool,
    StrArray,
    StrEnum(&'static [&'static str]),
}

/// Schema entry for one argument of one operation.
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub name: &'static str,
    pub kind: ArgKind,
    pub required: bool,
    pub description: &'static str,
}

/// One named, schema-described unit of work the dispatcher can perform.
///
/// The table is fixed at compile time; argument schemas are resolved here,
/// at registration, rather than ad hoc per call.
#[derive(Debug, Clone, Copy)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub args: &'static [ArgSpec],
}

impl ArgKind {
    fn schema(&self, description: &str) -> Value {
        match self {
            ArgKind::Str => json!({ "type": "string", "description": description }),
            ArgKind::Int => json!({ "type": "integer", "description": description }),
            ArgKind::Bool => json!({ "type": "boolean", "description": description }),
            ArgKind::StrArray => json!({
                "type": "array",
                "items": { "type": "string" },
                "description": description,
            }),
            ArgKind::StrEnum(values) => json!({
                "type": "string",
                "enum": values,
                "description": description,
            }),
        }
    }
}

impl OperationDescriptor {
    /// Render the argument table as a JSON-schema object suitable for the
    /// MCP tool list.
    pub fn input_schema(&self) -> Map<String, Value> {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for arg in self.args {
            properties.insert(arg.name.to_string(), arg.kind.schema(arg.description));
            if arg.required {
                required.push(Value::String(arg.name.to_string()));
            }
        }
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        schema.insert("required".to_string(), Value::Array(required));
        schema
    }

    /// Name of the first required argument missing from `arguments`, if any.
    /// A present-but-null value counts as missing.
    pub fn missing_required(&self, arguments: &Map<String, Value>) -> Option<&'static str> {
        self.args
            .iter()
            .filter(|arg| arg.required)
            .find(|arg| matches!(arguments.get(arg.name), None | Some(Value::Null)))
            .map(|arg| arg.name)
    }
}

const SERVER_NAME: ArgSpec = ArgSpec {
    name: "server_name",
    kind: ArgKind::Str,
    required: true,
    description: "Name of the target MCP server",
};

/// The fixed, versioned operation registry: every management operation this
/// controller can perform, with its argument schema.
pub const OPERATIONS: &[OperationDescriptor] = &[
    OperationDescriptor {
        name: "list_running_servers",
        description: "List all currently running MCP servers",
        args: &[],
    },
    OperationDescriptor {
        name: "stop_mcp_server",
        description: "Stop a running MCP server",
        args: &[ArgSpec {
            name: "server_name",
            kind: ArgKind::Str,
            required: true,
            description: "Name of the server to stop",
        }],
    },
    OperationDescriptor {
        name: "get_toolhive_status",
        description: "Get ToolHive system status",
        args: &[],
    },
    OperationDescriptor {
        name: "list_registry_servers",
        description: "List available MCP servers from the ToolHive registry",
        args: &[],
    },
    OperationDescriptor {
        name: "run_mcp_server",
        description: "Start an MCP server from registry, container image, or protocol scheme",
        args: &[
            ArgSpec {
                name: "server_name",
                kind: ArgKind::Str,
                required: true,
                description: "Server name from registry, container image, or protocol scheme \
                              (e.g., 'github', 'mcp/github:latest', 'npx://package-name')",
            },
            ArgSpec {
                name: "name",
                kind: ArgKind::Str,
                required: false,
                description: "Custom name for the server instance (optional)",
            },
            ArgSpec {
                name: "transport",
                kind: ArgKind::StrEnum(&["stdio", "sse"]),
                required: false,
                description: "Transport mode (default: stdio)",
            },
            ArgSpec {
                name: "port",
                kind: ArgKind::Int,
                required: false,
                description: "Port for the HTTP proxy to listen on (host port)",
            },
            ArgSpec {
                name: "host",
                kind: ArgKind::Str,
                required: false,
                description: "Host for the HTTP proxy to listen on (default: 127.0.0.1)",
            },
            ArgSpec {
                name: "target_port",
                kind: ArgKind::Int,
                required: false,
                description: "Port for the container to expose (SSE transport only)",
            },
            ArgSpec {
                name: "target_host",
                kind: ArgKind::Str,
                required: false,
                description: "Host to forward traffic to (SSE transport only, default: 127.0.0.1)",
            },
            ArgSpec {
                name: "permission_profile",
                kind: ArgKind::Str,
                required: false,
                description: "Permission profile (none, network, or path to JSON file, default: network)",
            },
            ArgSpec {
                name: "env_vars",
                kind: ArgKind::StrArray,
                required: false,
                description: "Environment variables (format: KEY=VALUE)",
            },
            ArgSpec {
                name: "volumes",
                kind: ArgKind::StrArray,
                required: false,
                description: "Volume mounts (format: host-path:container-path[:ro])",
            },
            ArgSpec {
                name: "secrets",
                kind: ArgKind::StrArray,
                required: false,
                description: "Secrets (format: NAME,target=TARGET)",
            },
            ArgSpec {
                name: "foreground",
                kind: ArgKind::Bool,
                required: false,
                description: "Run in foreground mode (block until container exits)",
            },
            ArgSpec {
                name: "detach",
                kind: ArgKind::Bool,
                required: false,
                description: "Run in detached mode",
            },
            ArgSpec {
                name: "args",
                kind: ArgKind::StrArray,
                required: false,
                description: "Additional arguments to pass to the server",
            },
        ],
    },
    OperationDescriptor {
        name: "get_server_requirements",
        description: "Get setup requirements and information for an MCP server before running it",
        args: &[
            ArgSpec {
                name: "server_name",
                kind: ArgKind::Str,
                required: true,
                description: "Server name from registry to check requirements for",
            },
            ArgSpec {
                name: "env_vars",
                kind: ArgKind::StrArray,
                required: false,
                description: "Environment variables you plan to provide (format: KEY=VALUE)",
            },
        ],
    },
    OperationDescriptor {
        name: "remove_mcp_server",
        description: "Remove an MCP server managed by ToolHive",
        args: &[
            ArgSpec {
                name: "server_name",
                kind: ArgKind::Str,
                required: true,
                description: "Name of the server to remove",
            },
            ArgSpec {
                name: "force",
                kind: ArgKind::Bool,
                required: false,
                description: "Force removal of a running container (default: false)",
            },
        ],
    },
    OperationDescriptor {
        name: "search_registry_servers",
        description: "Search for MCP servers in the ToolHive registry by name, description, or tags",
        args: &[
            ArgSpec {
                name: "query",
                kind: ArgKind::Str,
                required: true,
                description: "Search query to find servers (searches name, description, and tags). \
                              Required - cannot be empty.",
            },
            ArgSpec {
                name: "format",
                kind: ArgKind::StrEnum(&["json", "text"]),
                required: false,
                description: "Output format (default: json)",
            },
        ],
    },
    OperationDescriptor {
        name: "restart_mcp_server",
        description: "Restart an MCP server managed by ToolHive",
        args: &[SERVER_NAME],
    },
    OperationDescriptor {
        name: "get_server_logs",
        description: "Get recent logs from an MCP server container",
        args: &[
            SERVER_NAME,
            ArgSpec {
                name: "lines",
                kind: ArgKind::Int,
                required: false,
                description: "Number of log lines to fetch (default: 100)",
            },
        ],
    },
    OperationDescriptor {
        name: "list_registries",
        description: "List all configured ToolHive registries",
        args: &[],
    },
    OperationDescriptor {
        name: "get_registry_details",
        description: "Get detailed information about a specific registry",
        args: &[ArgSpec {
            name: "registry_name",
            kind: ArgKind::Str,
            required: true,
            description: "Name of the registry to inspect",
        }],
    },
    OperationDescriptor {
        name: "add_registry",
        description: "Add a new registry to ToolHive",
        args: &[
            ArgSpec {
                name: "name",
                kind: ArgKind::Str,
                required: true,
                description: "Name of the registry",
            },
            ArgSpec {
                name: "url",
                kind: ArgKind::Str,
                required: true,
                description: "URL of the registry",
            },
            ArgSpec {
                name: "type",
                kind: ArgKind::Str,
                required: false,
                description: "Type of registry (e.g., 'git', 'http', default: git)",
            },
        ],
    },
    OperationDescriptor {
        name: "remove_registry",
        description: "Remove a registry from ToolHive",
        args: &[ArgSpec {
            name: "registry_name",
            kind: ArgKind::Str,
            required: true,
            description: "Name of the registry to remove",
        }],
    },
    OperationDescriptor {
        name: "get_toolhive_version",
        description: "Get ToolHive version information",
        args: &[],
    },
    OperationDescriptor {
        name: "get_client_discovery",
        description: "Get discovery information about MCP clients compatible with ToolHive",
        args: &[],
    },
    OperationDescriptor {
        name: "get_openapi_spec",
        description: "Get the OpenAPI specification of the ToolHive API",
        args: &[],
    },
    OperationDescriptor {
        name: "search_internet_for_mcp_server",
        description: "Search public package indexes for an MCP server that is not in the registry",
        args: &[SERVER_NAME],
    },
];

/// Look up an operation descriptor by name.
pub fn find_operation(name: &str) -> Option<&'static OperationDescriptor> {
    OPERATIONS.iter().find(|op| op.name == name)
}
