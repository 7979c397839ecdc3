use std::{env, path::PathBuf, process::ExitCode};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use phpstitch::{AssembleConfig, BundleMetadata, Bundler, PharBuilder, version::discover_version};

/// Merge PHP source files into a single script or a phar archive
#[derive(Debug, Parser)]
#[command(name = "phpstitch")]
#[command(version, about)]
struct Cli {
    /// Configuration file (JSON, or TOML with a `.toml` extension)
    #[arg(short, long, default_value = "bundle.json")]
    config: PathBuf,

    /// Directory to run in; paths in the configuration are relative to it
    #[arg(short = 'w', long)]
    working_dir: Option<PathBuf>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(dir) = &cli.working_dir {
        if !dir.is_dir() {
            bail!("working directory does not exist: {}", dir.display());
        }
        env::set_current_dir(dir)
            .with_context(|| format!("failed to change into {}", dir.display()))?;
    }

    let base_dir = env::current_dir().context("failed to determine the current directory")?;
    let config = AssembleConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let files = config.resolve(&base_dir)?;
    let metadata = BundleMetadata::new(discover_version(&base_dir));
    let output = base_dir.join(&config.output);

    if config.output_format.is_phar() {
        let summary = PharBuilder::new(config.bundle_options(), config.output_format.compression())
            .build(&files, &metadata, &output)
            .context("failed to build the phar archive")?;
        info!("Phar archive built successfully!");
        info!("File: {}", summary.output.display());
        info!("Size: {} bytes", summary.bytes);
        info!("Files included: {}", summary.file_count);
    } else {
        let summary = Bundler::new(config.bundle_options())
            .build(&files, &metadata, &output)
            .context("failed to build the bundle")?;
        info!("Bundle script built successfully!");
        info!("File: {}", summary.output.display());
        info!("Size: {} bytes", summary.bytes);
        info!("Files bundled: {}", summary.file_count);
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
