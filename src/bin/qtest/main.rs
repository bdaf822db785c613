use std::io;
use std::path::PathBuf;
use std::process;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

mod console;

use crate::console::{log_level, Config, Console, LogHandle};

/// Command interpreter for exercising the string queue.
#[derive(Parser)]
#[command(name = "qtest", version)]
struct Cli {
    /// Run commands from this file instead of stdin
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Raise log verbosity; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Percent chance that any allocation fails
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u32).range(0..=100))]
    fail: u32,

    /// Seed for allocation failure injection
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Capacity of the buffer removed values are copied into
    #[arg(long, default_value_t = 1024)]
    length: usize,
}

// RUST_LOG wins over -v
fn init_logging(verbose: u8) -> LogHandle {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(verbose)));
    let (filter, handle) = reload::Layer::new(filter);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .init();
    handle
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = init_logging(cli.verbose);

    let config = Config {
        fail_percent: cli.fail,
        seed: cli.seed,
        length: cli.length,
        echo: cli.file.is_some(),
        verbose: cli.verbose,
        log: Some(log),
    };

    let stdout = io::stdout();
    let mut console = Console::new(config, stdout.lock());
    match &cli.file {
        Some(path) => console.run_file(path)?,
        None => console.run(io::stdin().lock())?,
    };

    let errors = console.finish()?;
    if errors > 0 {
        eprintln!("{} error(s)", errors);
        process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::Cli;

    use clap::Parser;

    #[test]
    fn test_cli_fail_range() {
        assert!(Cli::try_parse_from(["qtest", "--fail", "101"]).is_err());
        assert!(Cli::try_parse_from(["qtest", "--fail", "-1"]).is_err());

        let cli = Cli::try_parse_from(["qtest", "--fail", "100", "-vv"]).unwrap();
        assert_eq!(cli.fail, 100);
        assert_eq!(cli.verbose, 2);

        let cli = Cli::try_parse_from(["qtest"]).unwrap();
        assert_eq!(cli.fail, 0);
        assert_eq!(cli.length, 1024);
    }
}
