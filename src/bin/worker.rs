use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Consumer name within the feed_generators group; defaults to
    /// consumer-{pid}
    #[arg(long)]
    consumer: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    feed::start_worker(args.consumer).await
}
