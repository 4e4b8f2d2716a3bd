use clap::Parser;
use client::network::Client;
use log::info;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:3001")]
    server: String,

    /// Identity to register under
    #[arg(short = 'i', long, default_value = "bot")]
    player_id: String,

    /// Trophy count announced on registration
    #[arg(short, long, default_value = "0")]
    trophies: u32,

    /// Milliseconds between deployment attempts
    #[arg(long, default_value = "1500")]
    spawn_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Starting bot client...");
    info!("Connecting to: {}", args.server);

    let mut client = Client::new(
        &args.server,
        &args.player_id,
        args.trophies,
        Duration::from_millis(args.spawn_interval_ms),
    )
    .await?;

    let interrupted = tokio::select! {
        result = client.run() => {
            result?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    if interrupted {
        info!("Interrupted, leaving");
        client.disconnect().await?;
    }

    Ok(())
}
