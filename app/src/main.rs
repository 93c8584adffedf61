use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;

mod logger;
mod watch;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Paths to watch
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Window in milliseconds during which native changes are coalesced
    #[arg(short, long, value_parser(parse_duration), default_value("500"))]
    latency: Duration,

    /// Periodically compare directory snapshots instead of using native notifications
    #[arg(long)]
    poll: bool,

    /// Report changes per directory instead of per file
    #[arg(long)]
    dirs_only: bool,

    /// Stop watching after this many seconds
    #[arg(short, long, value_parser(parse_seconds))]
    timeout: Option<Duration>,

    /// Max level of log messages printed to stderr
    #[arg(long, default_value("info"))]
    log_level: LevelFilter,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.log_level)?;

    watch::run(args)
}

fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let millis = arg.parse()?;
    Ok(Duration::from_millis(millis))
}

fn parse_seconds(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}
