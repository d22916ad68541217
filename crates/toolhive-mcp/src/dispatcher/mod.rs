//! The operation dispatcher: a fixed registry of named operations, each
//! backed by one control-plane call or one CLI invocation, all funneled into
//! the uniform [`OperationResult`] record.
//!
//! Nothing escapes `invoke` as a fault. Unknown names, missing arguments and
//! every downstream failure come back as `success: false` results so the
//! transport layer never sees a protocol error.

mod validate;

pub use validate::{ValidationReport, validate_server_requirements};

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use toolhive_mcp_core::{
    OperationDescriptor, OperationResult, Settings, ThvError, find_operation, OPERATIONS,
};

use crate::api::ControlPlane;
use crate::cli::{CliBackend, RunOptions};
use crate::supervisor::ApiSupervisor;
use crate::websearch::WebSearch;

/// Wait between stopping and advising a re-run during restart, giving the
/// container runtime time to release the name.
const RESTART_SETTLE: Duration = Duration::from_secs(2);

pub struct Dispatcher {
    settings: Settings,
    api: Arc<dyn ControlPlane>,
    cli: Arc<dyn CliBackend>,
    web: Arc<dyn WebSearch>,
    supervisor: Option<Arc<ApiSupervisor>>,
}

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn str_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn required_str(args: &Map<String, Value>, key: &str) -> Result<String, ThvError> {
    str_arg(args, key)
        .ok_or_else(|| ThvError::validation(format!("argument '{key}' must be a string")))
}

fn bool_arg(args: &Map<String, Value>, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn u64_arg(args: &Map<String, Value>, key: &str) -> Option<u64> {
    args.get(key).and_then(Value::as_u64)
}

fn port_arg(args: &Map<String, Value>, key: &str) -> Option<u16> {
    u64_arg(args, key).and_then(|p| u16::try_from(p).ok())
}

fn string_vec(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Fold an upstream JSON body into a result payload: objects merge in as-is,
/// anything else lands under `result`.
fn object_payload(body: Value) -> Map<String, Value> {
    match body {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("result".to_string(), other);
            map
        }
    }
}

impl Dispatcher {
    pub fn new(
        settings: Settings,
        api: Arc<dyn ControlPlane>,
        cli: Arc<dyn CliBackend>,
        web: Arc<dyn WebSearch>,
        supervisor: Option<Arc<ApiSupervisor>>,
    ) -> Self {
        Self {
            settings,
            api,
            cli,
            web,
            supervisor,
        }
    }

    /// The fixed operation registry, in declaration order.
    pub fn list_operations(&self) -> &'static [OperationDescriptor] {
        OPERATIONS
    }

    /// Execute one named operation. Never returns an error: every failure
    /// mode resolves to a `success: false` result.
    pub async fn invoke(&self, name: &str, arguments: Map<String, Value>) -> OperationResult {
        let Some(op) = find_operation(name) else {
            return OperationResult::fail(format!("unknown operation: {name}"));
        };
        if let Some(field) = op.missing_required(&arguments) {
            return ThvError::missing_argument(field).into();
        }
        debug!(operation = name, "dispatching");
        match self.dispatch(op.name, &arguments).await {
            Ok(result) => result,
            Err(err) => {
                warn!(operation = name, error = %err, "operation failed");
                err.into()
            }
        }
    }

    /// Snapshot of every managed server regardless of state, used by the
    /// resource surface.
    pub async fn servers_overview(&self) -> OperationResult {
        match self.api.list_servers().await {
            Ok(body) => {
                let servers = body["servers"].as_array().cloned().unwrap_or_default();
                let running = servers
                    .iter()
                    .filter(|server| server["State"] == json!("running"))
                    .count();
                OperationResult::ok()
                    .with("count", servers.len())
                    .with("running_count", running)
                    .with_json("servers", Value::Array(servers))
                    .with("timestamp", timestamp())
            }
            Err(err) => err.into(),
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        args: &Map<String, Value>,
    ) -> Result<OperationResult, ThvError> {
        match name {
            "list_running_servers" => self.list_running_servers().await,
            "stop_mcp_server" => self.stop_server(args).await,
            "get_toolhive_status" => self.toolhive_status().await,
            "list_registry_servers" => self.list_registry_servers().await,
            "run_mcp_server" => self.run_server(args).await,
            "get_server_requirements" => self.server_requirements(args).await,
            "remove_mcp_server" => self.remove_server(args).await,
            "search_registry_servers" => self.search_registry(args).await,
            "restart_mcp_server" => self.restart_server(args).await,
            "get_server_logs" => self.server_logs(args).await,
            "list_registries" => Ok(OperationResult::ok_with(object_payload(
                self.api.list_registries().await?,
            ))),
            "get_registry_details" => self.registry_details(args).await,
            "add_registry" => self.add_registry(args).await,
            "remove_registry" => self.remove_registry(args).await,
            "get_toolhive_version" => Ok(OperationResult::ok_with(object_payload(
                self.api.version().await?,
            ))),
            "get_client_discovery" => Ok(OperationResult::ok_with(object_payload(
                self.api.client_discovery().await?,
            ))),
            "get_openapi_spec" => Ok(OperationResult::ok_with(object_payload(
                self.api.openapi_spec().await?,
            ))),
            "search_internet_for_mcp_server" => self.internet_search(args).await,
            other => Err(ThvError::validation(format!(
                "operation '{other}' is registered but has no handler"
            ))),
        }
    }

    async fn list_running_servers(&self) -> Result<OperationResult, ThvError> {
        let body = self.api.list_servers().await?;
        let running: Vec<Value> = body["servers"]
            .as_array()
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|server| server["State"] == json!("running"))
            .collect();
        Ok(OperationResult::ok()
            .with("count", running.len())
            .with_json("running_servers", Value::Array(running))
            .with("timestamp", timestamp()))
    }

    async fn stop_server(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        match self.api.stop_server(&server_name).await {
            Ok(()) => Ok(OperationResult::ok()
                .with("message", format!("Server '{server_name}' stopped successfully"))),
            Err(err) if err.is_not_found() => Ok(OperationResult::fail(format!(
                "Server '{server_name}' not found or already stopped"
            ))),
            Err(err) => Err(err),
        }
    }

    /// Best-effort status snapshot: an unreachable API is part of the answer
    /// here, not a failure.
    async fn toolhive_status(&self) -> Result<OperationResult, ThvError> {
        let healthy = self.api.health().await.unwrap_or(false);
        let version = if healthy {
            self.api
                .version()
                .await
                .ok()
                .and_then(|body| body["version"].as_str().map(str::to_string))
        } else {
            None
        };

        let mut result = OperationResult::ok()
            .with("api_healthy", healthy)
            .with("api_base_url", self.settings.api_base.clone())
            .with("version", version.unwrap_or_else(|| "unknown".to_string()))
            .with("auto_start_enabled", self.settings.auto_start)
            .with("timestamp", timestamp());

        match &self.supervisor {
            Some(supervisor) => {
                let status = supervisor.status().await;
                result = result.with("api_server_auto_started", status.auto_started);
                if let Some(pid) = status.pid {
                    result = result.with("api_server_pid", pid);
                }
            }
            None => result = result.with("api_server_auto_started", false),
        }

        if healthy {
            if let Ok(body) = self.api.list_servers().await {
                let servers = body["servers"].as_array().cloned().unwrap_or_default();
                let running = servers
                    .iter()
                    .filter(|server| server["State"] == json!("running"))
                    .count();
                result = result
                    .with("total_servers", servers.len())
                    .with("running_servers", running);
            }
        }
        Ok(result)
    }

    async fn list_registry_servers(&self) -> Result<OperationResult, ThvError> {
        let output = self.cli.registry_catalog().await?.into_result()?;
        let servers = match serde_json::from_str::<Value>(&output.stdout) {
            Ok(parsed) => parsed,
            Err(_) => json!({ "raw_output": output.stdout, "format": "text" }),
        };
        Ok(OperationResult::ok()
            .with_json("registry_servers", servers)
            .with("timestamp", timestamp()))
    }

    async fn run_server(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let env_vars = string_vec(args, "env_vars");

        let report = validate_server_requirements(
            self.cli.as_ref(),
            self.web.as_ref(),
            &server_name,
            &env_vars,
        )
        .await?;
        if !report.valid {
            let mut result = OperationResult::fail(format!(
                "Cannot start {server_name} - missing required parameters. See suggestions."
            ))
            .with("validation_failed", true)
            .with_json(
                "missing_requirements",
                Value::Array(report.missing_required_env_vars.clone()),
            )
            .with("suggestions", report.suggestions.clone());
            if let Some(info) = &report.server_info {
                result = result.with_json("server_info", info.clone());
            }
            if let Some(findings) = &report.found_alternatives {
                result = result.with_json(
                    "found_alternatives",
                    serde_json::to_value(findings).unwrap_or(Value::Array(vec![])),
                );
            }
            return Ok(result);
        }

        let options = RunOptions {
            name: str_arg(args, "name"),
            transport: str_arg(args, "transport"),
            port: port_arg(args, "port"),
            host: str_arg(args, "host"),
            target_port: port_arg(args, "target_port"),
            target_host: str_arg(args, "target_host"),
            permission_profile: str_arg(args, "permission_profile"),
            env_vars,
            volumes: string_vec(args, "volumes"),
            secrets: string_vec(args, "secrets"),
            foreground: bool_arg(args, "foreground"),
            detach: bool_arg(args, "detach"),
            args: string_vec(args, "args"),
        };
        let output = self.cli.run_server(&server_name, &options).await?;
        let mut result = if output.success() {
            OperationResult::ok()
        } else {
            OperationResult::fail(format!(
                "thv run exited with code {}",
                output.exit_code
            ))
        }
        .with("exit_code", output.exit_code)
        .with("stdout", output.stdout)
        .with("stderr", output.stderr)
        .with("command", output.command);
        if !report.suggestions.is_empty() {
            result = result.with_json(
                "setup_info",
                json!({
                    "server_info": report.server_info,
                    "suggestions": report.suggestions,
                }),
            );
        }
        Ok(result)
    }

    async fn server_requirements(
        &self,
        args: &Map<String, Value>,
    ) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let env_vars = string_vec(args, "env_vars");
        let report = validate_server_requirements(
            self.cli.as_ref(),
            self.web.as_ref(),
            &server_name,
            &env_vars,
        )
        .await?;
        Ok(OperationResult::ok_with(report.to_payload()))
    }

    async fn remove_server(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let force = bool_arg(args, "force");
        let output = self.cli.remove_server(&server_name, force).await?;
        let removed = output.success();
        let mut result = if removed {
            OperationResult::ok()
        } else {
            OperationResult::fail(format!("Server '{server_name}' removal failed"))
        };
        result = result
            .with("exit_code", output.exit_code)
            .with("stdout", output.stdout)
            .with("stderr", output.stderr)
            .with("command", output.command);
        if removed {
            result = result.with(
                "message",
                format!("Server '{server_name}' removed successfully"),
            );
        }
        Ok(result)
    }

    async fn search_registry(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let query = str_arg(args, "query").unwrap_or_default();
        if query.is_empty() {
            return Ok(OperationResult::fail(
                "Search query is required. Use 'list_registry_servers' to see all available servers.",
            )
            .with(
                "suggestion",
                "Provide a search term like 'github', 'memory', 'api', etc.",
            ));
        }
        let format = str_arg(args, "format").unwrap_or_else(|| "json".to_string());
        let output = self.cli.search(&query, &format).await?;
        if !output.success() {
            return Ok(OperationResult::fail(if output.stderr.trim().is_empty() {
                "Search failed".to_string()
            } else {
                output.stderr.trim().to_string()
            })
            .with("exit_code", output.exit_code)
            .with("command", output.command)
            .with("query", query));
        }
        let mut result = OperationResult::ok()
            .with("command", output.command)
            .with("query", query);
        if format == "json" {
            match serde_json::from_str::<Value>(&output.stdout) {
                Ok(parsed) => {
                    let count = parsed.as_array().map(Vec::len).unwrap_or(0);
                    result = result.with_json("results", parsed).with("count", count);
                }
                Err(_) => {
                    return Ok(OperationResult::fail("Failed to parse search results as JSON")
                        .with("raw_output", output.stdout));
                }
            }
        } else {
            result = result.with("results", output.stdout).with("format", "text");
        }
        Ok(result)
    }

    /// Stop-and-advise: the original run configuration is not recorded
    /// anywhere, so after a forced removal the caller has to re-issue the run
    /// with their own parameters.
    async fn restart_server(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let output = self.cli.remove_server(&server_name, true).await?;
        if !output.success() {
            return Ok(OperationResult::fail(format!(
                "Failed to stop server for restart: {}",
                output.stderr.trim()
            )));
        }
        tokio::time::sleep(RESTART_SETTLE).await;
        Ok(OperationResult::fail(
            "Restart requires manual intervention. Please run the server again with the same parameters.",
        )
        .with(
            "instructions",
            vec![
                format!("1. Server '{server_name}' has been stopped"),
                "2. Use 'run_mcp_server' to start it again with your desired configuration"
                    .to_string(),
            ],
        ))
    }

    async fn server_logs(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let lines = u64_arg(args, "lines").unwrap_or(100);
        let output = self.cli.container_logs(&server_name, lines).await?;
        if output.success() {
            Ok(OperationResult::ok()
                .with("logs", output.stdout)
                .with("stderr", output.stderr)
                .with("lines_requested", lines)
                .with("server_name", server_name))
        } else {
            Ok(
                OperationResult::fail(format!("Failed to get logs: {}", output.stderr.trim()))
                    .with("server_name", server_name),
            )
        }
    }

    async fn registry_details(
        &self,
        args: &Map<String, Value>,
    ) -> Result<OperationResult, ThvError> {
        let registry_name = required_str(args, "registry_name")?;
        let body = self.api.registry_details(&registry_name).await?;
        Ok(OperationResult::ok_with(object_payload(body)))
    }

    async fn add_registry(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let name = required_str(args, "name")?;
        let url = required_str(args, "url")?;
        let kind = str_arg(args, "type").unwrap_or_else(|| "git".to_string());
        let body = json!({ "name": name, "url": url, "type": kind });
        self.api.add_registry(&body).await?;
        Ok(OperationResult::ok().with("message", "Registry added successfully"))
    }

    async fn remove_registry(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let registry_name = required_str(args, "registry_name")?;
        self.api.remove_registry(&registry_name).await?;
        Ok(OperationResult::ok().with(
            "message",
            format!("Registry '{registry_name}' removed successfully"),
        ))
    }

    async fn internet_search(&self, args: &Map<String, Value>) -> Result<OperationResult, ThvError> {
        let server_name = required_str(args, "server_name")?;
        let findings = self.web.find_candidates(&server_name).await?;
        let suggestions = if findings.is_empty() {
            validate::generic_install_suggestions(&server_name)
        } else {
            validate::finding_suggestions(&findings)
        };
        Ok(OperationResult::ok()
            .with(
                "search_summary",
                format!("Internet search results for MCP server '{server_name}'"),
            )
            .with("server_name", server_name)
            .with_json(
                "found_alternatives",
                serde_json::to_value(&findings).unwrap_or(Value::Array(vec![])),
            )
            .with("installation_suggestions", suggestions)
            .with("web_search_performed", true)
            .with("timestamp", timestamp()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliOutput;
    use crate::websearch::WebFinding;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Control-plane fake that records every call it receives.
    #[derive(Default)]
    struct MockApi {
        calls: Mutex<Vec<String>>,
        healthy: bool,
        servers: Option<Value>,
        stop_not_found: bool,
        registry_body: Mutex<Option<Value>>,
    }

    impl MockApi {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ControlPlane for MockApi {
        async fn health(&self) -> Result<bool, ThvError> {
            self.record("health");
            Ok(self.healthy)
        }
        async fn list_servers(&self) -> Result<Value, ThvError> {
            self.record("list_servers");
            Ok(self.servers.clone().unwrap_or(json!({ "servers": [] })))
        }
        async fn stop_server(&self, name: &str) -> Result<(), ThvError> {
            self.record("stop_server");
            if self.stop_not_found {
                Err(ThvError::not_found(format!("server '{name}' not found")))
            } else {
                Ok(())
            }
        }
        async fn version(&self) -> Result<Value, ThvError> {
            self.record("version");
            Ok(json!({ "version": "0.9.0" }))
        }
        async fn list_registries(&self) -> Result<Value, ThvError> {
            self.record("list_registries");
            Ok(json!({ "registries": ["default"] }))
        }
        async fn registry_details(&self, _name: &str) -> Result<Value, ThvError> {
            self.record("registry_details");
            Ok(json!({ "name": "default" }))
        }
        async fn add_registry(&self, data: &Value) -> Result<Value, ThvError> {
            self.record("add_registry");
            *self.registry_body.lock().unwrap() = Some(data.clone());
            Ok(Value::Null)
        }
        async fn remove_registry(&self, _name: &str) -> Result<(), ThvError> {
            self.record("remove_registry");
            Ok(())
        }
        async fn client_discovery(&self) -> Result<Value, ThvError> {
            self.record("client_discovery");
            Ok(json!({ "clients": [] }))
        }
        async fn openapi_spec(&self) -> Result<Value, ThvError> {
            self.record("openapi_spec");
            Ok(json!({ "openapi": "3.0.0" }))
        }
    }

    fn cli_ok(stdout: &str) -> CliOutput {
        CliOutput {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
            command: "thv <mock>".to_string(),
        }
    }

    fn cli_fail(stderr: &str) -> CliOutput {
        CliOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
            command: "thv <mock>".to_string(),
        }
    }

    /// CLI fake with one canned output per command family.
    #[derive(Default)]
    struct MockCli {
        calls: Mutex<Vec<String>>,
        run_output: Option<CliOutput>,
        rm_output: Option<CliOutput>,
        search_output: Option<CliOutput>,
        catalog_output: Option<CliOutput>,
        info_output: Option<CliOutput>,
        logs_output: Option<CliOutput>,
    }

    impl MockCli {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn count_of(&self, call: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
        }

        fn canned(&self, slot: &Option<CliOutput>) -> Result<CliOutput, ThvError> {
            slot.clone()
                .ok_or_else(|| ThvError::process("no canned output for this call"))
        }
    }

    #[async_trait]
    impl CliBackend for MockCli {
        async fn run_server(
            &self,
            _target: &str,
            _options: &RunOptions,
        ) -> Result<CliOutput, ThvError> {
            self.record("run");
            self.canned(&self.run_output)
        }
        async fn remove_server(&self, _name: &str, _force: bool) -> Result<CliOutput, ThvError> {
            self.record("rm");
            self.canned(&self.rm_output)
        }
        async fn search(&self, _query: &str, _format: &str) -> Result<CliOutput, ThvError> {
            self.record("search");
            self.canned(&self.search_output)
        }
        async fn registry_catalog(&self) -> Result<CliOutput, ThvError> {
            self.record("registry_catalog");
            self.canned(&self.catalog_output)
        }
        async fn registry_info(&self, _name: &str) -> Result<CliOutput, ThvError> {
            self.record("registry_info");
            self.canned(&self.info_output)
        }
        async fn container_logs(&self, _name: &str, _lines: u64) -> Result<CliOutput, ThvError> {
            self.record("logs");
            self.canned(&self.logs_output)
        }
    }

    #[derive(Default)]
    struct MockWeb {
        calls: Mutex<usize>,
        findings: Vec<WebFinding>,
    }

    #[async_trait]
    impl WebSearch for MockWeb {
        async fn find_candidates(&self, _server_name: &str) -> Result<Vec<WebFinding>, ThvError> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.findings.clone())
        }
    }

    fn dispatcher(api: MockApi, cli: MockCli, web: MockWeb) -> (Dispatcher, Arc<MockApi>, Arc<MockCli>, Arc<MockWeb>) {
        let api = Arc::new(api);
        let cli = Arc::new(cli);
        let web = Arc::new(web);
        let dispatcher = Dispatcher::new(
            Settings::default(),
            api.clone(),
            cli.clone(),
            web.clone(),
            None,
        );
        (dispatcher, api, cli, web)
    }

    fn args(pairs: Value) -> Map<String, Value> {
        pairs.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_unknown_operation_is_a_stable_failure() {
        let (d, api, cli, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d.invoke("definitely_not_real", Map::new()).await;
        assert!(!result.success);
        assert_eq!(
            result.error.as_deref(),
            Some("unknown operation: definitely_not_real")
        );
        assert_eq!(api.call_count(), 0);
        assert_eq!(cli.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_argument_short_circuits() {
        let (d, api, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d.invoke("stop_mcp_server", Map::new()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("server_name"));
        assert_eq!(api.call_count(), 0, "no API call for an invalid request");
    }

    #[tokio::test]
    async fn test_stop_server_success() {
        let (d, api, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d
            .invoke("stop_mcp_server", args(json!({ "server_name": "github" })))
            .await;
        assert!(result.success);
        assert!(result.payload["message"]
            .as_str()
            .unwrap()
            .contains("stopped successfully"));
        assert_eq!(api.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stop_server_not_found_maps_to_failure_result() {
        let api = MockApi {
            stop_not_found: true,
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(api, MockCli::default(), MockWeb::default());
        let result = d
            .invoke("stop_mcp_server", args(json!({ "server_name": "ghost" })))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found or already stopped"));
    }

    #[tokio::test]
    async fn test_list_running_servers_filters_state() {
        let api = MockApi {
            servers: Some(json!({ "servers": [
                { "Name": "a", "State": "running" },
                { "Name": "b", "State": "exited" },
                { "Name": "c", "State": "running" },
            ]})),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(api, MockCli::default(), MockWeb::default());
        let result = d.invoke("list_running_servers", Map::new()).await;
        assert!(result.success);
        assert_eq!(result.payload["count"], json!(2));
        assert_eq!(result.payload["running_servers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_with_unknown_server_returns_guidance_without_running() {
        let cli = MockCli {
            info_output: Some(cli_fail("server not found in registry")),
            run_output: Some(cli_ok("should never be used")),
            ..Default::default()
        };
        let (d, _, cli, web) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke("run_mcp_server", args(json!({ "server_name": "github" })))
            .await;
        assert!(!result.success);
        assert_eq!(result.payload["validation_failed"], json!(true));
        assert!(!result.payload["suggestions"].as_array().unwrap().is_empty());
        assert_eq!(cli.count_of("run"), 0, "run must not execute after failed validation");
        assert_eq!(*web.calls.lock().unwrap(), 1, "the fallback search ran once");
    }

    #[tokio::test]
    async fn test_run_with_missing_env_var_short_circuits() {
        let cli = MockCli {
            info_output: Some(cli_ok(
                r#"{"name":"github","env_vars":[{"name":"GITHUB_TOKEN","description":"token","required":true}]}"#,
            )),
            run_output: Some(cli_ok("")),
            ..Default::default()
        };
        let (d, _, cli, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke("run_mcp_server", args(json!({ "server_name": "github" })))
            .await;
        assert!(!result.success);
        assert_eq!(result.payload["validation_failed"], json!(true));
        let missing = result.payload["missing_requirements"].as_array().unwrap();
        assert_eq!(missing[0]["name"], json!("GITHUB_TOKEN"));
        assert_eq!(cli.count_of("run"), 0);
    }

    #[tokio::test]
    async fn test_run_with_satisfied_requirements_executes() {
        let cli = MockCli {
            info_output: Some(cli_ok(
                r#"{"name":"github","env_vars":[{"name":"GITHUB_TOKEN","description":"token","required":true}]}"#,
            )),
            run_output: Some(cli_ok("started")),
            ..Default::default()
        };
        let (d, _, cli, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke(
                "run_mcp_server",
                args(json!({
                    "server_name": "github",
                    "env_vars": ["GITHUB_TOKEN=abc123"],
                    "transport": "stdio",
                })),
            )
            .await;
        assert!(result.success, "error: {:?}", result.error);
        assert_eq!(result.payload["exit_code"], json!(0));
        assert_eq!(cli.count_of("run"), 1);
    }

    #[tokio::test]
    async fn test_requirements_reports_optional_and_missing_vars() {
        let cli = MockCli {
            info_output: Some(cli_ok(
                r#"{"name":"gitlab","env_vars":[
                    {"name":"GITLAB_TOKEN","description":"api token","required":true},
                    {"name":"GITLAB_HOST","description":"self-hosted url","required":false}
                ]}"#,
            )),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke(
                "get_server_requirements",
                args(json!({ "server_name": "gitlab" })),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.payload["valid"], json!(false));
        let missing = result.payload["missing_required_env_vars"].as_array().unwrap();
        assert_eq!(missing[0]["name"], json!("GITLAB_TOKEN"));
        let suggestions = result.payload["suggestions"].as_array().unwrap();
        assert!(suggestions.iter().any(|s| s.as_str().unwrap().contains("GITLAB_HOST")));
    }

    #[tokio::test]
    async fn test_search_with_empty_query_never_hits_cli() {
        let (d, _, cli, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d
            .invoke("search_registry_servers", args(json!({ "query": "" })))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("list_registry_servers"));
        assert_eq!(cli.count_of("search"), 0);
    }

    #[tokio::test]
    async fn test_search_parses_json_results() {
        let cli = MockCli {
            search_output: Some(cli_ok(r#"[{"name":"github"},{"name":"gitlab"}]"#)),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke("search_registry_servers", args(json!({ "query": "git" })))
            .await;
        assert!(result.success);
        assert_eq!(result.payload["count"], json!(2));
    }

    #[tokio::test]
    async fn test_restart_stops_then_advises_rerun() {
        let cli = MockCli {
            rm_output: Some(cli_ok("removed")),
            ..Default::default()
        };
        let (d, _, cli, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke("restart_mcp_server", args(json!({ "server_name": "github" })))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("manual intervention"));
        let instructions = result.payload["instructions"].as_array().unwrap();
        assert!(instructions[0].as_str().unwrap().contains("github"));
        assert_eq!(cli.count_of("rm"), 1);
    }

    #[tokio::test]
    async fn test_server_logs_success_and_failure() {
        let cli = MockCli {
            logs_output: Some(cli_ok("line1\nline2\n")),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke(
                "get_server_logs",
                args(json!({ "server_name": "github", "lines": 2 })),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.payload["logs"], json!("line1\nline2\n"));
        assert_eq!(result.payload["lines_requested"], json!(2));

        let cli = MockCli {
            logs_output: Some(cli_fail("no such container")),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d
            .invoke("get_server_logs", args(json!({ "server_name": "ghost" })))
            .await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no such container"));
    }

    #[tokio::test]
    async fn test_add_registry_defaults_type_to_git() {
        let (d, api, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d
            .invoke(
                "add_registry",
                args(json!({ "name": "corp", "url": "https://registry.corp.example" })),
            )
            .await;
        assert!(result.success);
        let body = api.registry_body.lock().unwrap().clone().unwrap();
        assert_eq!(body["type"], json!("git"));
        assert_eq!(body["name"], json!("corp"));
    }

    #[tokio::test]
    async fn test_status_is_best_effort_when_api_down() {
        let (d, _, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d.invoke("get_toolhive_status", Map::new()).await;
        assert!(result.success);
        assert_eq!(result.payload["api_healthy"], json!(false));
        assert_eq!(result.payload["version"], json!("unknown"));
        assert_eq!(result.payload["api_server_auto_started"], json!(false));
    }

    #[tokio::test]
    async fn test_status_counts_servers_when_healthy() {
        let api = MockApi {
            healthy: true,
            servers: Some(json!({ "servers": [
                { "Name": "a", "State": "running" },
                { "Name": "b", "State": "exited" },
            ]})),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(api, MockCli::default(), MockWeb::default());
        let result = d.invoke("get_toolhive_status", Map::new()).await;
        assert!(result.success);
        assert_eq!(result.payload["api_healthy"], json!(true));
        assert_eq!(result.payload["total_servers"], json!(2));
        assert_eq!(result.payload["running_servers"], json!(1));
        assert_eq!(result.payload["version"], json!("0.9.0"));
    }

    #[tokio::test]
    async fn test_internet_search_with_findings() {
        let web = MockWeb {
            findings: vec![WebFinding {
                source: "npm".to_string(),
                identifier: "mcp-github".to_string(),
                url: "https://www.npmjs.com/package/mcp-github".to_string(),
                run_target: "npx://mcp-github".to_string(),
                description: None,
            }],
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), MockCli::default(), web);
        let result = d
            .invoke(
                "search_internet_for_mcp_server",
                args(json!({ "server_name": "github" })),
            )
            .await;
        assert!(result.success);
        assert_eq!(result.payload["web_search_performed"], json!(true));
        assert_eq!(
            result.payload["found_alternatives"][0]["run_target"],
            json!("npx://mcp-github")
        );
        assert!(result.payload["installation_suggestions"]
            .as_array()
            .unwrap()
            .iter()
            .any(|s| s.as_str().unwrap().contains("npx://mcp-github")));
    }

    #[tokio::test]
    async fn test_internet_search_without_findings_gives_generic_pointers() {
        let (d, _, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d
            .invoke(
                "search_internet_for_mcp_server",
                args(json!({ "server_name": "ghost" })),
            )
            .await;
        assert!(result.success);
        assert!(result.payload["found_alternatives"].as_array().unwrap().is_empty());
        let suggestions = result.payload["installation_suggestions"].as_array().unwrap();
        assert!(suggestions.iter().any(|s| s.as_str().unwrap().contains("npm search")));
    }

    #[tokio::test]
    async fn test_registry_list_falls_back_to_raw_text() {
        let cli = MockCli {
            catalog_output: Some(cli_ok("NAME  DESCRIPTION\ngithub  GitHub server\n")),
            ..Default::default()
        };
        let (d, _, _, _) = dispatcher(MockApi::default(), cli, MockWeb::default());
        let result = d.invoke("list_registry_servers", Map::new()).await;
        assert!(result.success);
        assert_eq!(result.payload["registry_servers"]["format"], json!("text"));
    }

    #[tokio::test]
    async fn test_api_errors_become_failure_results() {
        // No canned catalog output: the CLI mock fails the call.
        let (d, _, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        let result = d.invoke("list_registry_servers", Map::new()).await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[test]
    fn test_list_operations_matches_registry() {
        let (d, _, _, _) = dispatcher(MockApi::default(), MockCli::default(), MockWeb::default());
        assert_eq!(d.list_operations().len(), OPERATIONS.len());
    }
}
