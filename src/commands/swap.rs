//! `hostprep swap [--size N]`

use anyhow::{Result, bail};
use converge::{Outcome, Run, apply};

use crate::Context;
use crate::cli::SwapArgs;
use crate::reporter::ConsoleReporter;
use crate::tasks::base::Swap;
use crate::transport;

pub fn run(ctx: &Context, args: SwapArgs) -> Result<()> {
    let config = ctx.config()?;
    let size = args.size.unwrap_or(config.provision.swap_size_gb);
    if size == 0 {
        bail!("Swap size must be at least 1G");
    }

    let executor = transport::connect(&ctx.target, &config)?;
    let run = Run::new(executor.as_ref()).with_dry_run(ctx.dry_run);

    let mut reporter = ConsoleReporter::new(ctx.quiet);
    if let Outcome::Aborted { error } = apply(&Swap::new(size), &run, &mut reporter) {
        bail!("Could not add swap: {error}");
    }
    Ok(())
}
