// Spot Grid Bot - CLI
// Single entry point: init the workspace, run the grids, report profits

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use spot_grid_bot::{Config, ConfigError, TradingResult};
use spot_grid_bot::logging::{init_logging, init_logging_simple};

// Load command modules from cli directory
#[path = "../cli/run_commands.rs"]
mod run_commands;
#[path = "../cli/report_commands.rs"]
mod report_commands;

#[derive(Parser)]
#[command(name = "grid-bot")]
#[command(version)]
#[command(about = "Spot grid trading bot", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "GRID_CONFIG_FILE", default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize configuration and workspace
    Init,

    /// Start the grids and trade until interrupted
    Run,

    /// Profit summary from recorded fills
    Report {
        /// Only this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        // Init doesn't require config (it creates it)
        Commands::Init => {
            init_logging_simple(cli.verbose);
            init_workspace(&cli.config)
        }
        Commands::Run => {
            let config = load_config_or_exit(&cli.config);
            let _guard = init_logging(&config.logging, cli.verbose);
            info!("🚀 Spot Grid Bot v{}", env!("CARGO_PKG_VERSION"));
            info!("📁 Config: {}", cli.config);
            run_commands::run_bot(config).await
        }
        Commands::Report { symbol } => {
            init_logging_simple(cli.verbose);
            let config = load_config_or_exit(&cli.config);
            report_commands::show_report(&config, symbol).await
        }
    };

    if let Err(e) = result {
        error!("❌ [{}] {}", e.category(), e.user_message());
        std::process::exit(1);
    }
}

/// Load config or exit with helpful error message
fn load_config_or_exit(path: &str) -> Config {
    match Config::from_file(path) {
        Ok(mut config) => {
            config.apply_env_overrides();
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration Error");
            eprintln!("{}", e);

            if matches!(e, ConfigError::FileRead(_)) {
                eprintln!();
                eprintln!("💡 Quick fix:");
                eprintln!("   1. Run: grid-bot init");
                eprintln!("   2. Edit {} with your API keys and grids", path);
                eprintln!("   3. Try again");
            }

            std::process::exit(1);
        }
    }
}

fn init_workspace(config_path: &str) -> TradingResult<()> {
    use std::fs;

    info!("🔧 Initializing workspace...");

    fs::create_dir_all("logs")?;
    fs::create_dir_all("data")?;

    // Create default config if it doesn't exist
    if !std::path::Path::new(config_path).exists() {
        let default_config = include_str!("../../config.toml.example");
        fs::write(config_path, default_config)?;
        info!("📝 Created {}", config_path);
    } else {
        warn!("⚠️  {} already exists, skipping", config_path);
    }

    info!("✅ Workspace initialized successfully!");
    info!("💡 Next steps:");
    info!("   1. Edit {} with your API keys and grids", config_path);
    info!("   2. Run: grid-bot run");
    info!("   3. Check progress: grid-bot report");

    Ok(())
}
