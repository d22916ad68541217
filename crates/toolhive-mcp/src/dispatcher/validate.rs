//! Pre-flight validation for run requests: check registry metadata for
//! required environment variables before spending a CLI invocation, and fall
//! back to a package-index search when the server is not in the registry.

use serde_json::{Value, json};

use toolhive_mcp_core::ThvError;

use crate::cli::CliBackend;
use crate::websearch::{WebFinding, WebSearch};

/// Outcome of validating a server name against the registry.
#[derive(Debug)]
pub struct ValidationReport {
    pub valid: bool,
    /// Registry metadata when the server was found.
    pub server_info: Option<Value>,
    /// `{name, description}` pairs for each required variable not provided.
    pub missing_required_env_vars: Vec<Value>,
    pub suggestions: Vec<String>,
    /// Set when the server was missing from the registry and the package
    /// indexes were consulted instead.
    pub found_alternatives: Option<Vec<WebFinding>>,
}

impl ValidationReport {
    /// Render as the JSON shape the requirements operation returns.
    pub fn to_payload(&self) -> serde_json::Map<String, Value> {
        let mut payload = serde_json::Map::new();
        payload.insert("valid".to_string(), json!(self.valid));
        if let Some(info) = &self.server_info {
            payload.insert("server_info".to_string(), info.clone());
            payload.insert(
                "missing_required_env_vars".to_string(),
                Value::Array(self.missing_required_env_vars.clone()),
            );
        }
        payload.insert("suggestions".to_string(), json!(self.suggestions));
        if let Some(findings) = &self.found_alternatives {
            payload.insert(
                "found_alternatives".to_string(),
                serde_json::to_value(findings).unwrap_or(Value::Array(vec![])),
            );
            payload.insert(
                "recommended_action".to_string(),
                json!("Try one of the suggested commands above, or verify the server name is correct."),
            );
        }
        payload
    }
}

/// Generic pointers shown when the indexes turned up nothing.
pub fn generic_install_suggestions(server_name: &str) -> Vec<String> {
    vec![
        format!("Try searching npm: npm search mcp {server_name}"),
        format!("Check GitHub: https://github.com/search?q=mcp+{server_name}"),
        format!("Look for Docker images: docker search mcp-{server_name}"),
        format!("Try with npx: npx://mcp-{server_name}"),
        format!("Check if it's a Docker image: mcp/{server_name}:latest"),
    ]
}

/// Suggestions derived from concrete index hits.
pub fn finding_suggestions(findings: &[WebFinding]) -> Vec<String> {
    let mut suggestions = vec!["Found potential matches outside the registry:".to_string()];
    for finding in findings {
        suggestions.push(format!(
            "  - {} ({}): run with target '{}'",
            finding.identifier, finding.source, finding.run_target
        ));
    }
    suggestions.push(
        "If none work, check the server's own documentation for setup instructions.".to_string(),
    );
    suggestions
}

/// Check a server name against the registry and the caller-provided
/// environment variables.
///
/// A server missing from the registry is not an error: the report comes back
/// invalid, enriched with whatever the package indexes know about the name.
pub async fn validate_server_requirements(
    cli: &dyn CliBackend,
    web: &dyn WebSearch,
    server_name: &str,
    provided_env_vars: &[String],
) -> Result<ValidationReport, ThvError> {
    let info = match fetch_registry_info(cli, server_name).await {
        Some(info) => info,
        None => {
            let findings = web.find_candidates(server_name).await.unwrap_or_default();
            let mut suggestions = vec![format!(
                "Server '{server_name}' was not found in the ToolHive registry."
            )];
            if findings.is_empty() {
                suggestions.extend(generic_install_suggestions(server_name));
            } else {
                suggestions.extend(finding_suggestions(&findings));
            }
            return Ok(ValidationReport {
                valid: false,
                server_info: None,
                missing_required_env_vars: vec![],
                suggestions,
                found_alternatives: Some(findings),
            });
        }
    };

    let provided_names: Vec<&str> = provided_env_vars
        .iter()
        .map(|pair| pair.split('=').next().unwrap_or(pair))
        .collect();

    let declared = info["env_vars"].as_array().cloned().unwrap_or_default();
    let mut missing = Vec::new();
    let mut suggestions = Vec::new();
    for var in &declared {
        if !var["required"].as_bool().unwrap_or(false) {
            continue;
        }
        let name = var["name"].as_str().unwrap_or_default();
        if !provided_names.contains(&name) {
            missing.push(json!({
                "name": name,
                "description": var["description"].as_str().unwrap_or("No description available"),
            }));
        }
    }

    if !missing.is_empty() {
        suggestions.push(format!(
            "To run {server_name}, you need to provide the following environment variables:"
        ));
        for var in &missing {
            suggestions.push(format!(
                "  - {}: {}",
                var["name"].as_str().unwrap_or_default(),
                var["description"].as_str().unwrap_or_default()
            ));
        }
    }
    let optional: Vec<&Value> = declared
        .iter()
        .filter(|var| !var["required"].as_bool().unwrap_or(false))
        .collect();
    if !optional.is_empty() {
        suggestions.push("Optional environment variables:".to_string());
        for var in optional {
            suggestions.push(format!(
                "  - {}: {}",
                var["name"].as_str().unwrap_or_default(),
                var["description"].as_str().unwrap_or("No description")
            ));
        }
    }

    Ok(ValidationReport {
        valid: missing.is_empty(),
        server_info: Some(info),
        missing_required_env_vars: missing,
        suggestions,
        found_alternatives: None,
    })
}

/// Registry metadata for a server, or `None` when the lookup failed in any
/// way (absent, CLI error, unparsable output).
async fn fetch_registry_info(cli: &dyn CliBackend, server_name: &str) -> Option<Value> {
    let output = cli.registry_info(server_name).await.ok()?;
    if !output.success() {
        return None;
    }
    serde_json::from_str(&output.stdout).ok()
}
