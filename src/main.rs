use std::time::Duration;

use battleship_server::{init_logging, Server, ServerConfig, MAX_BOARD_SIZE, MIN_BOARD_SIZE};
use clap::Parser;

#[derive(Parser)]
#[command(author, version, about = "Two-player naval combat session server", long_about = None)]
struct Cli {
    #[arg(long, default_value = "0.0.0.0:8080")]
    bind: String,
    #[arg(long, help = "Fix RNG seed for reproducible games (e.g., --seed 12345)")]
    seed: Option<u64>,
    #[arg(long, default_value_t = MIN_BOARD_SIZE)]
    min_board_size: u8,
    #[arg(long, default_value_t = MAX_BOARD_SIZE)]
    max_board_size: u8,
    /// Build phase length for queue-paired matches, in seconds.
    #[arg(long, default_value_t = 60)]
    build_time: u32,
    /// Turn length for queue-paired matches, in seconds.
    #[arg(long, default_value_t = 30)]
    move_time: u32,
    /// How long finished matches stay queryable, in seconds.
    #[arg(long, default_value_t = 30)]
    retention: u64,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<ServerConfig> {
        if self.min_board_size > self.max_board_size || self.max_board_size > MAX_BOARD_SIZE {
            anyhow::bail!(
                "invalid board size range {}..={} (max {})",
                self.min_board_size,
                self.max_board_size,
                MAX_BOARD_SIZE
            );
        }
        let mut config = ServerConfig {
            bind: self.bind,
            board_sizes: self.min_board_size..=self.max_board_size,
            retention: Duration::from_secs(self.retention),
            seed: self.seed,
            ..ServerConfig::default()
        };
        config.default_options.build_time_secs = self.build_time;
        config.default_options.move_time_secs = self.move_time;
        config
            .default_options
            .validate(&config.board_sizes)
            .map_err(|e| anyhow::anyhow!("invalid default game options: {}", e))?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let config = Cli::parse().into_config()?;
    if let Some(seed) = config.seed {
        tracing::info!(seed, "using fixed seed (games will be reproducible)");
    }
    let server = Server::bind(config).await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await
}
