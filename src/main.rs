mod cli;
mod commands;
mod config;
mod reporter;
mod tasks;
mod transport;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command, TargetArgs};
use config::Config;
use std::io;
use std::path::PathBuf;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub target: TargetArgs,
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load and validate the config file (defaults when it doesn't exist)
    pub fn config(&self) -> Result<Config> {
        let path = config::config_path(self.config_path.as_deref())?;
        Config::load(&path)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        dry_run: cli.dry_run,
        fail_fast: cli.fail_fast,
        target: cli.target,
        config_path: cli.config,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Setup(args) => commands::setup::run(&ctx, args),
        Command::Swap(args) => commands::swap::run(&ctx, args),
        Command::Reboot(args) => commands::reboot::run(&ctx, args),
        Command::Facts => commands::facts::run(&ctx),
        Command::Tasks => commands::tasks::run(&ctx),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "hostprep", &mut io::stdout());
            Ok(())
        }
    }
}
