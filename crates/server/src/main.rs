use clap::Parser;
use snowflake_core::config::ConfigStore;
use snowflake_server::{router, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "snowserve", version, about = "HTTP surface for the Snowflake pipeline")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let store = ConfigStore::open(&cli.config)?;
    let state = AppState::new(store.config().clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    log::info!("listening on {}", cli.listen);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
