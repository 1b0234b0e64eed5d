use clap::Parser;
use poly_fade::cli::{Cli, Commands};
use poly_fade::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // A bad or missing config halts startup; trading with guessed
    // settings is worse than not trading.
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", cli.config, e);
            std::process::exit(1);
        }
    };

    poly_fade::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(mode = ?config.app.mode, "starting poly-fade");
            args.execute(config).await?;
        }
        Commands::Config => {
            println!("Current configuration:");
            println!("  Mode: {:?}", config.app.mode);
            println!("  Feed: {}", config.feed.rest_base_url);
            println!(
                "  Markets: {}",
                if config.app.allowlist_markets.is_empty() {
                    format!("top {} by volume", config.app.top_n_by_volume)
                } else {
                    config.app.allowlist_markets.join(", ")
                }
            );
            println!(
                "  Strategy: threshold={}, tp={}bps, sl={}bps, atr_targets={}",
                config.strategy.anomaly_threshold,
                config.strategy.take_profit_bps,
                config.strategy.stop_loss_bps,
                config.strategy.atr_targets
            );
            println!(
                "  Risk: max_pos={}, max_exposure={}, max_daily_loss={}",
                config.risk.max_position_per_market,
                config.risk.max_global_exposure,
                config.risk.max_daily_loss
            );
            println!("  Signer: {:?}", config.signer.mode);
        }
    }

    Ok(())
}
