//! tool-proxy - OpenAI-compatible tool-calling proxy

use tool_proxy::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::run().await
}
