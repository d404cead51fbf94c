//! MCP tool surface over the documentation catalog.
//!
//! Exposes two tools: one returning a single formatted document by tool
//! name, one listing every cached source with its metadata. Both are pure
//! read-side formatting over the catalog cache; a name that is unknown or
//! not yet fetched produces a clearly worded markdown response, never a
//! protocol error.

use itertools::Itertools;
use rmcp::model::{
    Implementation, ListPromptsResult, PaginatedRequestParam, ProtocolVersion, ServerCapabilities,
};
use rmcp::service::RequestContext;
use rmcp::{
    Error as McpError, RoleServer, ServerHandler,
    model::{Content, IntoContents, ServerInfo},
    schemars, tool,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{Catalog, DocCache, Document, InMemoryCatalog};

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DocContent {
    pub content: String,
}

impl IntoContents for DocContent {
    fn into_contents(self) -> Vec<Content> {
        vec![Content::text(self.content)]
    }
}

/// Render one cached document with its header and metadata block.
pub fn format_document(doc: &Document) -> String {
    let mut out = Vec::new();

    out.push(format!("# {}", doc.display_name));
    out.push(String::new());

    if !doc.description.is_empty() {
        out.push(format!("*{}*", doc.description));
        out.push(String::new());
    }

    out.push("## Metadata".to_string());
    out.push(String::new());
    out.push(format!(
        "- **Source URL(s):** {}",
        doc.urls.iter().join(", ")
    ));
    out.push(format!(
        "- **Fetched:** {}",
        doc.fetched_at.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push(format!("- **Size:** {:.1} KB", doc.size_bytes as f64 / 1024.0));
    out.push(String::new());

    if let Some(error) = &doc.error {
        out.push(format!("⚠️ **Warning:** Partial or failed fetch - {error}"));
        out.push(String::new());
    }

    out.push("---".to_string());
    out.push(String::new());
    out.push(doc.content.clone());

    out.join("\n")
}

/// Response for a lookup that found nothing. Distinguishes an unknown name
/// from a cache that has not finished its first refresh.
pub fn format_not_found(tool_name: &str, cache_is_warm: bool) -> String {
    if cache_is_warm {
        format!(
            "# Not Found\n\nNo documentation source named '{tool_name}' is configured. \
             Use list_documentation_sources to see what is available."
        )
    } else {
        format!(
            "# Not Available Yet\n\nDocumentation for '{tool_name}' has not been cached yet; \
             the initial fetch may still be running. Try again shortly."
        )
    }
}

/// Render the index over every cached source.
pub fn format_index(catalog: &Catalog) -> String {
    let mut out = vec!["# Available Documentation Sources\n".to_string()];

    if catalog.is_empty() {
        out.push("*No documentation cached yet. The initial fetch may still be running.*\n".to_string());
        return out.join("\n");
    }

    out.push(format!("Total sources: {}\n", catalog.len()));

    for doc in catalog.iter() {
        out.push(format!("## `{}`", doc.tool_name));
        out.push(format!("**{}**", doc.display_name));

        if !doc.description.is_empty() {
            out.push(format!("\n*{}*", doc.description));
        }

        out.push(format!("\n- URLs: {}", doc.urls.len()));
        out.push(format!("- Size: {:.1} KB", doc.size_bytes as f64 / 1024.0));

        match &doc.error {
            Some(error) => out.push(format!("- ⚠️ Status: Error - {error}")),
            None => out.push("- ✓ Status: Successfully cached".to_string()),
        }

        out.push(String::new());
    }

    out.join("\n")
}

/// MCP service handle over the shared catalog cache.
#[derive(Clone)]
pub struct DocServer {
    catalog: Arc<InMemoryCatalog>,
}

#[tool(tool_box)]
impl DocServer {
    pub fn new(catalog: Arc<InMemoryCatalog>) -> Self {
        Self { catalog }
    }

    #[tool(description = "Get the cached documentation for one configured source as markdown")]
    async fn get_documentation(
        &self,
        #[tool(param)]
        #[schemars(description = "Name of the documentation source to retrieve")]
        tool_name: String,
    ) -> DocContent {
        match self.catalog.lookup(&tool_name).await {
            Some(doc) => DocContent {
                content: format_document(&doc),
            },
            None => {
                let snapshot = self.catalog.snapshot().await;
                DocContent {
                    content: format_not_found(&tool_name, !snapshot.is_empty()),
                }
            }
        }
    }

    #[tool(description = "List all available documentation sources with metadata")]
    async fn list_documentation_sources(&self) -> DocContent {
        let snapshot = self.catalog.snapshot().await;
        DocContent {
            content: format_index(&snapshot),
        }
    }
}

#[tool(tool_box)]
impl ServerHandler for DocServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "This server provides normalized documentation fetched from configured \
                 remote sources. Use 'get_documentation' with a source name to retrieve \
                 one document as markdown, or 'list_documentation_sources' to see every \
                 cached source with its fetch status."
                    .to_string(),
            ),
        }
    }

    async fn list_prompts(
        &self,
        _request: PaginatedRequestParam,
        _: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        // No prompts in this implementation.
        Ok(ListPromptsResult {
            next_cursor: None,
            prompts: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_doc(error: Option<&str>) -> Document {
        Document {
            tool_name: "sdk_docs".to_string(),
            display_name: "SDK Reference".to_string(),
            description: "Client SDK documentation".to_string(),
            urls: vec![
                "https://example.com/sdk".to_string(),
                "https://example.com/sdk/advanced".to_string(),
            ],
            content: "# SDK\n\nHow to use the SDK.".to_string(),
            size_bytes: 2048,
            fetched_at: Utc::now(),
            error: error.map(|e| e.to_string()),
        }
    }

    fn empty_cache() -> Arc<InMemoryCatalog> {
        Arc::new(InMemoryCatalog::new())
    }

    async fn publish(cache: &InMemoryCatalog, docs: Vec<Document>) {
        let mut catalog = Catalog::new();
        for doc in docs {
            catalog.insert(doc);
        }
        cache.publish(catalog).await;
    }

    #[test]
    fn test_format_document_layout() {
        let formatted = format_document(&sample_doc(None));

        assert!(formatted.starts_with("# SDK Reference"));
        assert!(formatted.contains("*Client SDK documentation*"));
        assert!(formatted.contains(
            "- **Source URL(s):** https://example.com/sdk, https://example.com/sdk/advanced"
        ));
        assert!(formatted.contains("- **Size:** 2.0 KB"));
        assert!(formatted.contains("- **Fetched:** "));
        assert!(!formatted.contains("Warning"));
        assert!(formatted.contains("How to use the SDK."));
    }

    #[test]
    fn test_format_document_with_error_warning() {
        let formatted = format_document(&sample_doc(Some("HTTP 500 for https://example.com/sdk")));
        assert!(formatted.contains("⚠️ **Warning:** Partial or failed fetch - HTTP 500"));
    }

    #[test]
    fn test_format_index_cold_cache() {
        let formatted = format_index(&Catalog::new());
        assert!(formatted.contains("# Available Documentation Sources"));
        assert!(formatted.contains("No documentation cached yet"));
    }

    #[test]
    fn test_format_index_entries() {
        let mut catalog = Catalog::new();
        catalog.insert(sample_doc(None));
        let mut broken = sample_doc(Some("No content fetched for broken"));
        broken.tool_name = "broken".to_string();
        broken.size_bytes = 0;
        catalog.insert(broken);

        let formatted = format_index(&catalog);
        assert!(formatted.contains("Total sources: 2"));
        assert!(formatted.contains("## `sdk_docs`"));
        assert!(formatted.contains("- ✓ Status: Successfully cached"));
        assert!(formatted.contains("## `broken`"));
        assert!(formatted.contains("- ⚠️ Status: Error - No content fetched for broken"));
    }

    #[tokio::test]
    async fn test_get_documentation_cold_cache() {
        let server = DocServer::new(empty_cache());
        let result = server.get_documentation("sdk_docs".to_string()).await;
        assert!(result.content.contains("has not been cached yet"));
    }

    #[tokio::test]
    async fn test_get_documentation_unknown_name() {
        let cache = empty_cache();
        publish(&cache, vec![sample_doc(None)]).await;

        let server = DocServer::new(cache);
        let result = server.get_documentation("nope".to_string()).await;
        assert!(result.content.contains("No documentation source named 'nope'"));
    }

    #[tokio::test]
    async fn test_get_documentation_found() {
        let cache = empty_cache();
        publish(&cache, vec![sample_doc(None)]).await;

        let server = DocServer::new(cache);
        let result = server.get_documentation("sdk_docs".to_string()).await;
        assert!(result.content.contains("# SDK Reference"));
        assert!(result.content.contains("How to use the SDK."));
    }

    #[tokio::test]
    async fn test_list_documentation_sources_tool() {
        let cache = empty_cache();
        publish(&cache, vec![sample_doc(None)]).await;

        let server = DocServer::new(cache);
        let result = server.list_documentation_sources().await;
        assert!(result.content.contains("Total sources: 1"));
        assert!(result.content.contains("## `sdk_docs`"));
    }

    #[tokio::test]
    async fn test_sse_round_trip() {
        use rmcp::ServiceExt;
        use rmcp::model::{CallToolRequestParam, ClientCapabilities, ClientInfo, Implementation};
        use rmcp::transport::SseTransport;
        use rmcp::transport::sse_server::SseServer;

        let cache = Arc::new(InMemoryCatalog::new());
        publish(&cache, vec![sample_doc(None)]).await;

        let addr = "127.0.0.1:18082";
        let server = SseServer::serve(addr.parse().unwrap()).await.unwrap();
        let service_cache = cache.clone();
        let ct = server.with_service(move || DocServer::new(service_cache.clone()));

        let transport = SseTransport::start(&format!("http://{addr}/sse"))
            .await
            .unwrap();
        let client_info = ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "test sse client".to_string(),
                version: "0.0.1".to_string(),
            },
        };
        let client = client_info.serve(transport).await.unwrap();

        let result = client
            .call_tool(CallToolRequestParam {
                name: "get_documentation".into(),
                arguments: serde_json::json!({ "tool_name": "sdk_docs" })
                    .as_object()
                    .cloned(),
            })
            .await
            .unwrap();

        ct.cancel();

        assert!(!result.content.is_empty());
        assert!(
            result
                .content
                .iter()
                .any(|c| c.as_text().unwrap().text.contains("SDK Reference"))
        );
    }
}
