#[tokio::main]
async fn main() -> anyhow::Result<()> {
    feed::start_server().await
}
