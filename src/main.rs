use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use code_memory::client::CodeMemory;
use code_memory::config::Config;
use code_memory::mcp_server::CodeMemoryServer;
use code_memory::search::SearchMode;
use code_memory::types::{
    IndexCodebaseResponse, OutlineItem, SearchResultItem, StatusResponse,
};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

#[derive(Parser)]
#[command(
    name = "code-memory",
    version,
    long_version = LONG_VERSION,
    about = "Local code search index with an MCP interface"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the MCP protocol over stdio (default)
    Serve,
    /// Index a directory tree
    Index {
        /// Directory to index
        directory: String,
    },
    /// Search indexed code
    Search {
        /// Query text; a file path for file_structure
        query: String,
        /// One of definition, references, file_structure
        #[arg(long, default_value = "definition")]
        search_type: String,
        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Search indexed documentation
    Docs {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Report index contents and model identity
    Status,
    /// Delete all indexed data
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the MCP protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "code_memory=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::new()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => CodeMemoryServer::serve_stdio(config).await?,
        Command::Index { directory } => {
            let client = CodeMemory::new(config).await?;
            let cancel = CancellationToken::new();

            let run_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Cancellation requested, stopping at the next file");
                    run_cancel.cancel();
                }
            });

            let report = client.index_codebase(&directory, &cancel).await?;
            print_json(&IndexCodebaseResponse::from(report))?;
        }
        Command::Search {
            query,
            search_type,
            top_k,
        } => {
            let mode = SearchMode::parse(&search_type)?;
            let client = CodeMemory::new(config).await?;
            match mode {
                SearchMode::FileStructure => {
                    let outline = client.file_structure(&query).await?;
                    let items: Vec<OutlineItem> =
                        outline.into_iter().map(OutlineItem::from).collect();
                    print_json(&items)?;
                }
                mode => {
                    let hits = client.search_code(&query, mode, top_k).await?;
                    let items: Vec<SearchResultItem> =
                        hits.into_iter().map(SearchResultItem::from).collect();
                    print_json(&items)?;
                }
            }
        }
        Command::Docs { query, top_k } => {
            let client = CodeMemory::new(config).await?;
            let hits = client.search_docs(&query, top_k).await?;
            let items: Vec<SearchResultItem> =
                hits.into_iter().map(SearchResultItem::from).collect();
            print_json(&items)?;
        }
        Command::Status => {
            let client = CodeMemory::new(config).await?;
            let stats = client.status().await?;
            print_json(&StatusResponse::from_stats(stats, client.model_matches()))?;
        }
        Command::Clear => {
            let client = CodeMemory::new(config).await?;
            client.clear_index().await?;
            println!("Index cleared");
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
