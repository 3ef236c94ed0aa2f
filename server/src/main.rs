use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short = 'p', long, default_value = "8080")]
    port: u16,

    /// Maximum number of connected clients
    #[arg(short = 'm', long, default_value = "32")]
    max_clients: usize,

    /// Pause before a revealed pair is resolved, in milliseconds
    #[arg(short = 'd', long, default_value = "1000")]
    resolution_delay_ms: u64,

    /// Seconds of silence before a client is dropped
    #[arg(short = 't', long, default_value = "5")]
    timeout_secs: u64,

    /// Seed for reproducible boards
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let mut config = ServerConfig::default()
        .with_addr(&format!("{}:{}", args.host, args.port))
        .with_resolution_delay(Duration::from_millis(args.resolution_delay_ms));
    config.max_clients = args.max_clients;
    config.client_timeout = Duration::from_secs(args.timeout_secs);
    if let Some(seed) = args.seed {
        info!("Dealing boards from seed {}", seed);
        config = config.with_seed(seed);
    }

    info!("Starting server on {}", config.bind_addr);
    let mut server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
