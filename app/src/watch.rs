use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{at, never, select};
use log::{error, info};

use fswatch::{CreateFlags, PollSource, Watcher, WatcherConfig};

use crate::Args;

pub fn run(args: Args) -> Result<()> {
    let config = watcher_config(&args);
    let watcher = if args.poll {
        Watcher::with_source(PollSource::new(), config)
    } else {
        Watcher::with_config(config)
    }
    .context("unable to create watcher")?;

    for path in &args.paths {
        watcher
            .add(path)
            .with_context(|| format!("unable to watch {}", path.display()))?;
        info!("watching {}", path.display());
    }

    let start = Instant::now();
    let deadline = args.timeout.map(|timeout| at(start + timeout)).unwrap_or_else(never);
    let mut received = 0;

    loop {
        select! {
            recv(watcher.events()) -> event => match event {
                Ok(event) => {
                    println!("{}", event);
                    received += 1;
                }
                Err(_) => break,
            },
            recv(watcher.errors()) -> err => match err {
                Ok(err) => error!("{}", err),
                Err(_) => break,
            },
            recv(deadline) -> _ => {
                info!("timeout reached, closing watcher");
                watcher.close()?;
            }
        }
    }

    info!("{} events received in {:?}", received, start.elapsed());
    Ok(())
}

fn watcher_config(args: &Args) -> WatcherConfig {
    let mut flags = WatcherConfig::default().flags;
    if args.dirs_only {
        flags.remove(CreateFlags::FILE_EVENTS);
    }

    WatcherConfig {
        latency: args.latency,
        flags,
        ..WatcherConfig::default()
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use clap::Parser;
    use fswatch::CreateFlags;

    use crate::watch::{run, watcher_config};
    use crate::Args;

    #[test]
    fn config_from_args() {
        let args = Args::try_parse_from(["fswatch", "--latency", "20", "/tmp/a"]).unwrap();
        let config = watcher_config(&args);
        assert_eq!(config.latency, Duration::from_millis(20));
        assert_eq!(
            config.flags,
            CreateFlags::FILE_EVENTS | CreateFlags::WATCH_ROOT
        );
        assert_eq!(config.buffer, 0);

        let args = Args::try_parse_from(["fswatch", "--dirs-only", "/tmp/a"]).unwrap();
        assert_eq!(watcher_config(&args).flags, CreateFlags::WATCH_ROOT);
    }

    #[test]
    fn stops_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().to_str().unwrap();
        let args = Args::try_parse_from([
            "fswatch",
            "--poll",
            "--latency",
            "10",
            "--timeout",
            "1",
            path,
        ])
        .unwrap();

        let start = Instant::now();
        run(args).unwrap();
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[test]
    fn fails_for_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let args = Args::try_parse_from([
            "fswatch",
            "--poll",
            "--timeout",
            "1",
            missing.to_str().unwrap(),
        ])
        .unwrap();

        let err = run(args).unwrap_err();
        assert!(err.to_string().contains("unable to watch"));
    }
}
