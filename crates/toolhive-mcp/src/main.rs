use std::sync::Arc;

use anyhow::Context;
use rmcp::ServiceExt;
use rmcp::transport::stdio;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use toolhive_mcp::api::ApiClient;
use toolhive_mcp::cli::ThvCli;
use toolhive_mcp::dispatcher::Dispatcher;
use toolhive_mcp::server::ToolHiveServer;
use toolhive_mcp::supervisor::ApiSupervisor;
use toolhive_mcp::websearch::PackageIndexSearch;
use toolhive_mcp_core::Settings;

fn main() -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(run())
}

/// `RUST_LOG` when set, otherwise errors only.
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
}

async fn run() -> anyhow::Result<()> {
    // stdout carries the MCP protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    info!(
        api_base = %settings.api_base,
        cli_path = %settings.cli_path,
        auto_start = settings.auto_start,
        "starting ToolHive MCP server"
    );

    let api = Arc::new(
        ApiClient::new(settings.api_base.clone()).context("building control-plane client")?,
    );
    let supervisor = Arc::new(ApiSupervisor::new(settings.clone(), api.clone()));
    if !supervisor.ensure_running().await.is_healthy() {
        warn!("ToolHive API not available; API-backed operations will report transport errors");
    }

    let cli = Arc::new(ThvCli::new(settings.cli_path.clone()));
    let web = Arc::new(PackageIndexSearch::new().context("building package index client")?);
    let dispatcher = Arc::new(Dispatcher::new(
        settings,
        api,
        cli,
        web,
        Some(supervisor.clone()),
    ));

    let service = ToolHiveServer::new(dispatcher)
        .serve(stdio())
        .await
        .inspect_err(|e| error!("serving error: {e:?}"))?;
    info!("MCP server ready for connections");

    tokio::select! {
        result = service.waiting() => {
            result?;
            info!("client disconnected");
        }
        _ = shutdown_signal() => {
            info!("termination signal received");
        }
    }

    // Defensive: also runs when the client simply disconnected and nothing
    // was ever auto-started.
    supervisor.shut_down().await;
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(e) => {
            warn!("failed to install SIGTERM handler: {e}");
            std::future::pending::<()>().await;
            unreachable!();
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
