use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    cleats_cli::main_entry().await
}
