use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Documentation fetch-and-cache MCP server")]
struct Cli {
    /// Type of server to run
    #[arg(short, long, value_enum, default_value_t = ServerType::Sse)]
    server_type: ServerType,

    /// Address for the SSE server
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    address: String,

    /// Path to the source configuration file (defaults to sources.toml,
    /// searched in the working directory and its parents)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ServerType {
    /// Start an SSE server
    Sse,
    /// Start a stdio server
    Stdio,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.server_type {
        ServerType::Sse => {
            println!("Starting SSE server on {}", cli.address);
            docset_mcp::server::start_sse_server(&cli.address, cli.config.as_deref()).await?;
        }
        ServerType::Stdio => {
            docset_mcp::server::start_stdio_server(cli.config.as_deref()).await?;
        }
    }

    Ok(())
}
