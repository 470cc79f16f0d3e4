use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    callwarden::cli::app::run().await
}
