use crate::client::CodeMemory;
use crate::config::Config;
use crate::search::SearchMode;
use crate::types::*;

use anyhow::{Context, Result};
use rmcp::{
    ErrorData as McpError, ServerHandler, ServiceExt,
    handler::server::{router::prompt::PromptRouter, tool::ToolRouter, wrapper::Parameters},
    model::*,
    prompt, prompt_handler, prompt_router,
    tool, tool_handler, tool_router,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct CodeMemoryServer {
    client: Arc<CodeMemory>,
    tool_router: ToolRouter<Self>,
    prompt_router: PromptRouter<Self>,
}

impl CodeMemoryServer {
    pub async fn new(config: Config) -> Result<Self> {
        let client = CodeMemory::new(config).await?;
        Ok(Self::with_client(Arc::new(client)))
    }

    pub fn with_client(client: Arc<CodeMemory>) -> Self {
        Self {
            client,
            tool_router: Self::tool_router(),
            prompt_router: Self::prompt_router(),
        }
    }

    pub fn client(&self) -> &CodeMemory {
        &self.client
    }
}

#[tool_router(router = tool_router)]
impl CodeMemoryServer {
    #[tool(
        description = "Index a codebase directory for search. Unchanged files are skipped, so repeated runs are cheap; changing the embedding model triggers a full rebuild."
    )]
    async fn index_codebase(
        &self,
        Parameters(req): Parameters<IndexCodebaseRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let report = self
            .client
            .index_codebase(&req.directory, &CancellationToken::new())
            .await
            .map_err(|e| e.to_user_string())?;

        let response = IndexCodebaseResponse::from(report);
        serde_json::to_string_pretty(&response).map_err(|e| format!("Serialization failed: {}", e))
    }

    #[tool(
        description = "Search indexed code. search_type 'definition' finds named declarations, 'references' finds chunks mentioning an identifier, 'file_structure' returns the outline of one file (query is the file path)."
    )]
    async fn search_code(
        &self,
        Parameters(req): Parameters<SearchCodeRequest>,
    ) -> Result<String, String> {
        let mode = req.validate()?;

        let response = match mode {
            SearchMode::FileStructure => {
                let structure = self
                    .client
                    .file_structure(&req.query)
                    .await
                    .map_err(|e| e.to_user_string())?;
                SearchCodeResponse {
                    search_type: req.search_type,
                    results: vec![],
                    structure: structure.into_iter().map(OutlineItem::from).collect(),
                }
            }
            mode => {
                let hits = self
                    .client
                    .search_code(&req.query, mode, req.top_k)
                    .await
                    .map_err(|e| e.to_user_string())?;
                SearchCodeResponse {
                    search_type: req.search_type,
                    results: hits.into_iter().map(SearchResultItem::from).collect(),
                    structure: vec![],
                }
            }
        };

        serde_json::to_string_pretty(&response).map_err(|e| format!("Serialization failed: {}", e))
    }

    #[tool(description = "Search indexed documentation files (markdown sections)")]
    async fn search_docs(
        &self,
        Parameters(req): Parameters<SearchDocsRequest>,
    ) -> Result<String, String> {
        req.validate()?;

        let hits = self
            .client
            .search_docs(&req.query, req.top_k)
            .await
            .map_err(|e| e.to_user_string())?;

        let response = SearchDocsResponse {
            results: hits.into_iter().map(SearchResultItem::from).collect(),
        };
        serde_json::to_string_pretty(&response).map_err(|e| format!("Serialization failed: {}", e))
    }

    #[tool(
        description = "Report index contents: chunk and file counts, language breakdown, embedding model identity and last run time"
    )]
    async fn check_index_status(
        &self,
        Parameters(_req): Parameters<StatusRequest>,
    ) -> Result<String, String> {
        let stats = self.client.status().await.map_err(|e| e.to_user_string())?;
        let response = StatusResponse::from_stats(stats, self.client.model_matches());
        serde_json::to_string_pretty(&response).map_err(|e| format!("Serialization failed: {}", e))
    }

    #[tool(description = "Delete all indexed data and fingerprint state")]
    async fn clear_index(
        &self,
        Parameters(_req): Parameters<ClearRequest>,
    ) -> Result<String, String> {
        self.client
            .clear_index()
            .await
            .map_err(|e| e.to_user_string())?;

        let response = ClearResponse {
            success: true,
            message: "Index cleared".to_string(),
        };
        serde_json::to_string_pretty(&response).map_err(|e| format!("Serialization failed: {}", e))
    }
}

// Prompts for slash commands
#[prompt_router]
impl CodeMemoryServer {
    #[prompt(
        name = "index",
        description = "Index a codebase directory (incremental for already-indexed trees)"
    )]
    async fn index_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let directory = args.get("directory").and_then(|v| v.as_str()).unwrap_or(".");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Please index the codebase at '{}'.", directory),
        )])
    }

    #[prompt(name = "find", description = "Find the definition of a named symbol")]
    async fn find_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let name = args.get("name").and_then(|v| v.as_str()).unwrap_or("");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Please find the definition of '{}' in the indexed code.", name),
        )])
    }

    #[prompt(name = "docs", description = "Search indexed documentation")]
    async fn docs_prompt(
        &self,
        Parameters(args): Parameters<serde_json::Value>,
    ) -> Result<Vec<PromptMessage>, McpError> {
        let query = args.get("query").and_then(|v| v.as_str()).unwrap_or("");

        Ok(vec![PromptMessage::new_text(
            PromptMessageRole::User,
            format!("Please search the documentation for: {}", query),
        )])
    }

    #[prompt(name = "status", description = "Report index contents and model identity")]
    async fn status_prompt(&self) -> Vec<PromptMessage> {
        vec![PromptMessage::new_text(
            PromptMessageRole::User,
            "Please report the current index status.",
        )]
    }

    #[prompt(name = "clear", description = "Delete all indexed data")]
    async fn clear_prompt(&self) -> Vec<PromptMessage> {
        vec![PromptMessage::new_text(
            PromptMessageRole::User,
            "Please clear all indexed data.",
        )]
    }
}

#[tool_handler(router = self.tool_router)]
#[prompt_handler]
impl ServerHandler for CodeMemoryServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_prompts()
                .build(),
            server_info: Implementation {
                name: "code-memory".into(),
                title: Some("Code Memory - Local Code Search Index".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Local code intelligence over an indexed tree. \
                Use index_codebase first, then search_code for definitions, references \
                and file outlines, and search_docs for documentation sections."
                    .into(),
            ),
        }
    }
}

impl CodeMemoryServer {
    pub async fn serve_stdio(config: Config) -> Result<()> {
        tracing::info!("Starting code-memory MCP server");

        let server = Self::new(config).await.context("Failed to create MCP server")?;

        let transport = rmcp::transport::io::stdio();

        server.serve(transport).await?.waiting().await?;

        Ok(())
    }
}
