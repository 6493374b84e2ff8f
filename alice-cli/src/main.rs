mod logging;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result};
use tracing::{error, info};

use alice_core::admin::AdminAction;
use alice_core::config::AliceConfig;
use alice_core::hardware::MockHardware;

/// Command-line front-end for the Alice CV-QKD transmitter station.
#[derive(Parser, Debug)]
#[command(author, version, about = "Alice CV-QKD transmitter station", long_about = None)]
struct Cli {
    /// Path to the station's TOML configuration file.
    #[arg(short = 'f', long = "config", default_value = "config.toml")]
    config: PathBuf,

    /// Increase logging verbosity (-v warnings, -vv info, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Drive the server against the in-memory mock hardware facade instead
    /// of a real optical front-end (which this core does not implement).
    #[arg(long)]
    mock: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if !cli.mock {
        error!("no concrete hardware driver is implemented; re-run with --mock");
        std::process::exit(2);
    }

    let config = AliceConfig::load(&cli.config)
        .wrap_err_with(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let (admin_tx, admin_rx) = alice_core::admin::channel();
    let shutdown = Arc::new(AtomicBool::new(false));

    {
        let shutdown = Arc::clone(&shutdown);
        let admin_tx = admin_tx.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            let _ = admin_tx.send(AdminAction::GracefulStop);
        })
        .wrap_err("failed to install SIGINT handler")?;
    }

    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) => break, // stdin closed
                Ok(_) => {
                    if admin_tx.send(AdminAction::parse(&line)).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });

    let hardware_seed = config.alice.rng_seed;
    info!(config = %cli.config.display(), "Alice station starting");
    alice_core::server::run(
        cli.config.clone(),
        config,
        move || MockHardware::new(hardware_seed),
        admin_rx,
        shutdown,
    )?;

    info!("Alice station stopped");
    Ok(())
}
