use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "hostprep")]
#[command(version)]
#[command(about = "Provision a fresh Ubuntu/Debian host over SSH", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Only detect; report what would change without mutating the host
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Stop at the first task that fails instead of moving on
    #[arg(long, global = true)]
    pub fail_fast: bool,

    /// Config file (default: ~/.config/hostprep/config.toml)
    #[arg(long, global = true, env = "HOSTPREP_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Which host to provision and how to reach it
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Target host (ssh destination or alias from ~/.ssh/config)
    #[arg(short = 'H', long, global = true, env = "HOSTPREP_HOST")]
    pub host: Option<String>,

    /// Remote user
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// SSH port
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// SSH identity file
    #[arg(short, long, global = true)]
    pub identity: Option<PathBuf>,

    /// Provision this machine through the local shell (overrides --host)
    #[arg(long, global = true)]
    pub local: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Fresh setup, or the named tasks (e.g. `setup nginx,redis docker`)
    Setup(SetupArgs),

    /// Add a swap file
    Swap(SwapArgs),

    /// Restart the host
    Reboot(RebootArgs),

    /// Show the host facts used by version- and arch-gated tasks
    Facts,

    /// List registered tasks and the default sequence
    Tasks,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct SetupArgs {
    /// Tasks to run, comma- or space-separated (empty: default sequence)
    pub tasks: Vec<String>,
}

#[derive(Args)]
pub struct SwapArgs {
    /// Size in gigabytes (default from config)
    #[arg(short, long)]
    pub size: Option<u32>,
}

#[derive(Args)]
pub struct RebootArgs {
    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Seconds to wait for the host to come back (0: don't wait)
    #[arg(long, default_value = "120")]
    pub wait: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_setup_collects_tasks() {
        let cli = Cli::try_parse_from(["hostprep", "-H", "web1", "setup", "nginx,redis", "docker"])
            .unwrap();
        assert_eq!(cli.target.host.as_deref(), Some("web1"));
        match cli.command {
            Command::Setup(args) => assert_eq!(args.tasks, vec!["nginx,redis", "docker"]),
            _ => panic!("expected setup"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["hostprep", "setup", "--dry-run", "-vv", "--local"]).unwrap();
        assert!(cli.dry_run);
        assert!(cli.target.local);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_swap_size() {
        let cli = Cli::try_parse_from(["hostprep", "swap", "--size", "4"]).unwrap();
        match cli.command {
            Command::Swap(args) => assert_eq!(args.size, Some(4)),
            _ => panic!("expected swap"),
        }
    }
}
