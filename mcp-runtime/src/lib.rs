//! MCP runtime for the Replicated vendor portal: vendor API client, entity
//! services, tool and resource surface, and the stdio server.

pub mod client;
pub mod config;
pub mod logging;
pub mod resilience;
pub mod resources;
pub mod rpc;
pub mod server;
pub mod services;
pub mod tools;

use std::sync::Arc;
use std::time::Instant;

use clap::Subcommand;
use serde_json::{Value, json};

use replicated_core::Validate;

use crate::client::{Transport, ValidationMode, VendorClient};
use crate::config::RuntimeConfig;
use crate::rpc::to_pretty_json;
use crate::server::McpServer;
use crate::services::ListOptions;
use crate::tools::ToolError;

#[derive(Subcommand, Clone, Debug, Default)]
pub enum McpCommands {
    /// Serve MCP over stdio (default)
    #[default]
    Serve,
    /// List applications once and print a connectivity and validation report
    Check,
}

pub async fn run(config: RuntimeConfig, command: McpCommands) -> i32 {
    let mut settings = match config.validate() {
        Ok(settings) => settings,
        Err(err) => {
            let payload = json!({
                "error": "config_error",
                "message": err.to_string(),
                "problems": err.problems,
            });
            eprintln!("{}", to_pretty_json(&payload));
            return 1;
        }
    };
    logging::init(settings.log_level);

    if matches!(command, McpCommands::Check) {
        // The report lists invalid entities itself rather than failing on them.
        settings.validation = ValidationMode::Advisory;
    }
    let client = match settings.build_client() {
        Ok(client) => client,
        Err(err) => {
            eprintln!(
                "{}",
                to_pretty_json(&json!({ "error": "config_error", "message": err.to_string() }))
            );
            return 1;
        }
    };
    tracing::info!(
        config = %settings,
        endpoint_overridden = settings.endpoint_overridden,
        "configuration loaded"
    );

    match command {
        McpCommands::Serve => {
            let server = Arc::new(McpServer::new(Arc::new(client)));
            match server.serve_stdio().await {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "MCP server stopped");
                    let payload = json!({
                        "error": "mcp_server_error",
                        "message": err.to_string(),
                    });
                    eprintln!("{}", to_pretty_json(&payload));
                    1
                }
            }
        }
        McpCommands::Check => {
            let (report, code) = check(&client, client.transport().endpoint().as_str()).await;
            println!("{}", to_pretty_json(&report));
            code
        }
    }
}

/// One `list applications` call, reported as JSON. Exit code 0 when the API
/// answered, 2 when it did not.
pub async fn check<T: Transport>(client: &VendorClient<T>, endpoint: &str) -> (Value, i32) {
    let started = Instant::now();
    let result = client.applications().list(ListOptions::default()).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let checked_at = chrono::Utc::now().to_rfc3339();

    match result {
        Ok(page) => {
            let invalid: Vec<Value> = page
                .items
                .iter()
                .filter_map(|app| {
                    app.validate().err().map(|err| {
                        json!({ "id": app.id, "violations": err.violations })
                    })
                })
                .collect();
            let report = json!({
                "status": "ok",
                "checked_at": checked_at,
                "endpoint": endpoint,
                "elapsed_ms": elapsed_ms,
                "applications": {
                    "count": page.items.len(),
                    "total_count": page.total_count,
                    "valid": page.items.len() - invalid.len(),
                    "invalid": invalid
                }
            });
            (report, 0)
        }
        Err(err) => {
            tracing::error!(error = %err, "vendor API check failed");
            let report = json!({
                "status": "error",
                "checked_at": checked_at,
                "endpoint": endpoint,
                "elapsed_ms": elapsed_ms,
                "error": ToolError::from(err).to_value()
            });
            (report, 2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::{MockTransport, client};

    #[tokio::test]
    async fn check_reports_invalid_applications_but_succeeds() {
        let client = client(MockTransport::always(json!({
            "applications": [
                {
                    "id": "app-1",
                    "name": "Good",
                    "slug": "good",
                    "team_id": "team-1",
                    "created_at": "2024-01-01T00:00:00Z",
                    "updated_at": "2024-01-01T00:00:00Z"
                },
                { "id": "app-2", "name": "Bad", "slug": "Bad Slug" }
            ],
            "total_count": 2
        })));

        let (report, code) = check(&client, "https://vendor.test").await;

        assert_eq!(code, 0);
        assert_eq!(report["status"], "ok");
        assert_eq!(report["applications"]["count"], 2);
        assert_eq!(report["applications"]["valid"], 1);
        assert_eq!(report["applications"]["invalid"][0]["id"], "app-2");
    }

    #[tokio::test]
    async fn check_exits_two_when_the_api_rejects_the_token() {
        let client = client(MockTransport::new().with_response(401, json!({"message": "Unauthorized"})));

        let (report, code) = check(&client, "https://vendor.test").await;

        assert_eq!(code, 2);
        assert_eq!(report["status"], "error");
        assert_eq!(report["error"]["error"], "unauthorized");
    }

    #[tokio::test]
    async fn run_exits_one_on_config_errors() {
        let code = run(RuntimeConfig::default(), McpCommands::Check).await;
        assert_eq!(code, 1);
    }
}
