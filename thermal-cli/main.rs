use anyhow::{bail, Context};
use log::{error, info, warn};
use thermal_cli::args::{CliArgs, USAGE};
use thermal_cli::logging::setup_logging;
use thermal_cli::{BatchDriver, OverlayConfig};

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse(std::env::args().skip(1)).context("invalid arguments, try --help")?;
    if args.help {
        println!("{}", USAGE);
        return Ok(());
    }

    let _logger = setup_logging(&args.log_level, args.log_dir.as_deref())
        .with_context(|| format!("cannot initialize logging with level {:?}", args.log_level))?;

    let config = match &args.config {
        Some(path) => OverlayConfig::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => OverlayConfig::default(),
    };
    info!("{}", config.summary());

    if !args.input_dir.is_dir() {
        bail!("input directory {} does not exist", args.input_dir.display());
    }

    if let Err(e) = thermal_core::init_thread_pool(config.thread_count()) {
        warn!("using the existing thread pool: {}", e);
    }

    let driver = BatchDriver::new(config, &args.input_dir, &args.output_dir)
        .with_context(|| format!("cannot prepare output directory {}", args.output_dir.display()))?;
    let summary = driver
        .run()
        .with_context(|| format!("cannot scan {}", args.input_dir.display()))?;

    println!("{}", summary);
    if !summary.is_success() {
        error!("{} pairs failed", summary.failed.len());
    }
    Ok(())
}
