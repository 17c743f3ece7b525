//! `hostprep facts`

use anyhow::{Context as _, Result};
use converge::Run;

use crate::Context;
use crate::transport;
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let executor = transport::connect(&ctx.target, &config)?;
    let run = Run::new(executor.as_ref());
    let facts = run.facts().context("Could not probe host facts")?;

    ui::header(&executor.describe());
    ui::kv("distribution", &facts.distribution_id);
    ui::kv("release", &facts.release);
    ui::kv("codename", &facts.codename);
    ui::kv("architecture", &facts.architecture.to_string());
    Ok(())
}
