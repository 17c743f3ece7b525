//! `hostprep reboot`: restart the host and wait until SSH answers again

use anyhow::{Context as _, Result, bail};
use converge::Executor;
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use std::thread;
use std::time::{Duration, Instant};

use crate::Context;
use crate::cli::RebootArgs;
use crate::transport;
use crate::ui;

/// Time the host gets to go down before polling starts
const GRACE: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_secs(5);

pub fn run(ctx: &Context, args: RebootArgs) -> Result<()> {
    let config = ctx.config()?;
    let executor = transport::connect(&ctx.target, &config)?;
    let host = executor.describe();

    if !args.yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Reboot {host}?"))
            .default(false)
            .interact()
            .context("Failed to read confirmation")?;
        if !confirmed {
            bail!("Reboot cancelled");
        }
    }

    if ctx.dry_run {
        ui::info(&format!("Dry run: would reboot {host}"));
        return Ok(());
    }

    // the connection drops under us, so a transport error here is expected
    match executor.run("shutdown -r now", true, true) {
        Ok(result) if result.failed() => bail!("Reboot refused: {}", result.diagnostic()),
        Ok(_) => {}
        Err(e) => log::debug!("reboot: {e}"),
    }
    ui::success(&format!("Reboot issued on {host}"));

    if args.wait == 0 || ctx.target.local {
        return Ok(());
    }
    wait_for(executor.as_ref(), Duration::from_secs(args.wait), ctx.quiet)
}

/// Poll with a no-op command until the host answers or `timeout` passes
fn wait_for(executor: &dyn Executor, timeout: Duration, quiet: bool) -> Result<()> {
    let pb = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    if let Ok(style) = ProgressStyle::with_template("{spinner:.green} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(format!("Waiting for {}", executor.describe()));
    pb.enable_steady_tick(Duration::from_millis(100));

    let started = Instant::now();
    thread::sleep(GRACE);
    while started.elapsed() < timeout {
        match executor.run("true", false, true) {
            Ok(result) if result.succeeded => {
                pb.finish_and_clear();
                ui::success(&format!(
                    "{} is back after {}s",
                    executor.describe(),
                    started.elapsed().as_secs()
                ));
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => log::debug!("still down: {e}"),
        }
        thread::sleep(POLL_INTERVAL);
    }

    pb.finish_and_clear();
    bail!(
        "{} did not come back within {}s",
        executor.describe(),
        timeout.as_secs()
    )
}
