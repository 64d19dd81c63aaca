//! CLI/service wrapper (§6, §11 ambient stack): load and validate a
//! configuration file, build the `Core`, install a `tracing`
//! formatter honoring `RUST_LOG`, and run until shutdown. Process
//! supervision (systemd unit, restart policy) is out of scope (§1).

use clap::Parser;
use shedsolar::config::Config;
use shedsolar::core::Core;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "shedsolar", about = "Battery-box thermostat firmware")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(long, default_value = "/etc/shedsolar/config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let cfg = match Config::from_file(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            tracing::error!(error = %err, path = %args.config.display(), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let core = match Core::build(cfg) {
        Ok(core) => core,
        Err(err) => {
            tracing::error!(error = %err, "failed to open GPIO/SPI hardware");
            return ExitCode::FAILURE;
        }
    };

    core.run().await;

    ExitCode::SUCCESS
}
