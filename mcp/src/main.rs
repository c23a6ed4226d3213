use clap::Parser;

use replicated_mcp_runtime::config::RuntimeConfig;
use replicated_mcp_runtime::{McpCommands, run};

#[derive(Parser)]
#[command(
    name = "replicated-mcp-server",
    version,
    about = "MCP server for the Replicated Vendor Portal API, over stdio"
)]
struct Cli {
    #[command(flatten)]
    config: RuntimeConfig,

    #[command(subcommand)]
    command: Option<McpCommands>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let code = run(cli.config, cli.command.unwrap_or_default()).await;
    std::process::exit(code);
}
