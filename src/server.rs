//! Server startup: tracing, configuration, the background refresh task and
//! the SSE/stdio transports.

use anyhow::Result;
use rmcp::ServiceExt;
use rmcp::transport::sse_server::SseServer;
use rmcp::transport::stdio;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{self, layer::SubscriberExt, util::SubscriberInitExt};

use crate::catalog::{DocCache, InMemoryCatalog};
use crate::config::{self, Config};
use crate::fetcher::DocsClient;
use crate::mcp::DocServer;

/// Run the initial refresh in the background so the server can answer
/// immediately (with a "not yet available" response until the first cycle
/// publishes), then keep re-refreshing on the configured interval.
fn spawn_refresh_task(config: Config, catalog: Arc<InMemoryCatalog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let client = DocsClient::new();

        let fetched = client.refresh(&config.sources).await;
        catalog.publish(fetched).await;

        let Some(secs) = config.refresh_interval_secs else {
            return;
        };
        let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
        // The first tick completes immediately; the initial refresh above
        // already covered it.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let fetched = client.refresh(&config.sources).await;
            catalog.publish(fetched).await;
        }
    })
}

fn load_startup_config(config_path: Option<&Path>) -> Result<Config> {
    let path = config::find_config(config_path)?;
    tracing::info!(path = %path.display(), "loading source configuration");
    let config = config::load_config(&path)?;
    tracing::info!(sources = config.sources.len(), "configuration loaded");
    Ok(config)
}

// start sse server
pub async fn start_sse_server(addr: &str, config_path: Option<&Path>) -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".to_string().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_startup_config(config_path)?;
    let catalog = Arc::new(InMemoryCatalog::new());
    let _refresh = spawn_refresh_task(config, catalog.clone());

    let service_catalog = catalog.clone();
    let ct = SseServer::serve(addr.parse()?)
        .await?
        .with_service(move || DocServer::new(service_catalog.clone()));

    tokio::signal::ctrl_c().await?;
    ct.cancel();
    Ok(())
}

// start stdio server
pub async fn start_stdio_server(config_path: Option<&Path>) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting documentation MCP server");

    let config = load_startup_config(config_path)?;
    let catalog = Arc::new(InMemoryCatalog::new());
    let _refresh = spawn_refresh_task(config, catalog.clone());

    let service = DocServer::new(catalog)
        .serve(stdio())
        .await
        .inspect_err(|e| {
            tracing::error!("serving error: {:?}", e);
        })?;

    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_refresh_task_publishes_catalog() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/guide")
            .with_status(200)
            .with_body("guide body")
            .create_async()
            .await;

        let dir = tempdir().unwrap();
        let path = dir.path().join("sources.toml");
        fs::write(
            &path,
            format!(
                r#"
                [[sources]]
                tool_name = "guide"
                urls = ["{}/guide"]
                content_type = "unknown"
                "#,
                server.url()
            ),
        )
        .unwrap();

        let config = config::load_config(&path).unwrap();
        let catalog = Arc::new(InMemoryCatalog::new());
        assert!(catalog.snapshot().await.is_empty());

        let handle = spawn_refresh_task(config, catalog.clone());
        handle.await.unwrap();

        let doc = catalog.lookup("guide").await.unwrap();
        assert_eq!(doc.content, "guide body");
    }
}
