use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::network::Server;
use server::persistence::FileProfileStore;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "3001")]
    port: u16,

    /// Maximum number of simultaneous connections
    #[arg(short, long, default_value = "64")]
    max_clients: usize,

    /// Directory player profiles are stored under
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Number of shard directories for profiles
    #[arg(long, default_value = "200")]
    shards: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    let config = ServerConfig {
        bind_addr: format!("{}:{}", args.host, args.port),
        max_clients: args.max_clients,
        data_dir: args.data_dir,
        shards: args.shards,
        ..ServerConfig::default()
    };

    info!("Starting arena server on {}", config.bind_addr);
    info!(
        "Profiles stored under {} across {} shards",
        config.data_dir.display(),
        config.shards
    );

    let store = Arc::new(FileProfileStore::new(&config.data_dir, config.shards));
    let mut server = Server::new(config, store).await?;
    server.run().await?;

    Ok(())
}
