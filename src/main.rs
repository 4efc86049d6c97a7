use anyhow::Context;
use clap::Parser;
use gcodeplan::{init_logging, load_config, process_file, summary, LONG_VERSION};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    long_version = LONG_VERSION,
    about = "Estimate print time of slicer G-code and annotate the file",
    long_about = None
)]
struct Cli {
    /// G-code file to process
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Configuration file (TOML or JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Also simulate the stealth (silent) profile
    #[arg(long)]
    stealth: bool,

    /// Only estimate; leave the file untouched
    #[arg(long)]
    no_post_process: bool,

    /// Print the statistics as JSON
    #[arg(long)]
    json: bool,

    /// Log as JSON lines instead of text
    #[arg(long)]
    json_log: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json_log)?;

    let mut config = load_config(cli.config.as_deref())?;
    if cli.stealth {
        config.estimator.enable_stealth = true;
    }
    info!("gcodeplan {}", LONG_VERSION);

    let result = process_file(&cli.file, config.clone(), !cli.no_post_process)
        .with_context(|| format!("failed to process {}", cli.file.display()))?;

    if cli.json {
        println!("{}", result.statistics_json()?);
    } else {
        print!("{}", summary(&result, &config));
    }
    Ok(())
}
