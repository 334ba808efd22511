#[tokio::main]
async fn main() -> anyhow::Result<()> {
    notes_client::cli::run().await
}
