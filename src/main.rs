use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = authrelay::cli::Cli::parse();
    if let Err(e) = authrelay::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
