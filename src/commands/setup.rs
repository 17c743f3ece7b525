//! `hostprep setup [TASKS]...`

use anyhow::{Result, bail};
use converge::{DispatchOptions, Run, dispatch};

use crate::Context;
use crate::cli::SetupArgs;
use crate::reporter::{ConsoleReporter, print_summary};
use crate::tasks::TaskCatalog;
use crate::transport;
use crate::ui;

pub fn run(ctx: &Context, args: SetupArgs) -> Result<()> {
    let config = ctx.config()?;
    let executor = transport::connect(&ctx.target, &config)?;
    let run = Run::new(executor.as_ref()).with_dry_run(ctx.dry_run);
    let catalog = TaskCatalog::new(&config);

    if !ctx.quiet {
        let what = if args.tasks.is_empty() {
            "fresh setup".to_string()
        } else {
            args.tasks.join(" ")
        };
        ui::header(&format!("{} ({what})", executor.describe()));
        if ctx.dry_run {
            ui::info("Dry run: detecting only, nothing will be changed");
        }
    }

    let mut reporter = ConsoleReporter::new(ctx.quiet);
    let report = dispatch(
        &catalog,
        &run,
        &args.tasks,
        &DispatchOptions {
            fail_fast: ctx.fail_fast,
        },
        &mut reporter,
    );

    if !ctx.quiet {
        print_summary(&report.summary);
    }

    if let Some(action) = &report.halted_at {
        bail!("Stopped after {action} failed (--fail-fast)");
    }
    if report.summary.aborted > 0 {
        bail!("{} task(s) failed", report.summary.aborted);
    }
    Ok(())
}
