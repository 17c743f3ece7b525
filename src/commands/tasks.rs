//! `hostprep tasks`

use anyhow::Result;
use colored::Colorize;
use converge::Catalog;
use strum::IntoEnumIterator;

use crate::Context;
use crate::tasks::{TaskCatalog, TaskId};
use crate::ui;

pub fn run(ctx: &Context) -> Result<()> {
    let config = ctx.config()?;
    let catalog = TaskCatalog::new(&config);

    ui::section("Tasks");
    for task in TaskId::iter() {
        let name: &'static str = task.into();
        println!("  {:<12} {}", name.bold(), task.description());
    }

    ui::section("Default sequence");
    for (i, action) in catalog.default_sequence().iter().enumerate() {
        println!(
            "  {:>2}. {:<24} {}",
            i + 1,
            action.name(),
            action.description().dimmed()
        );
    }
    Ok(())
}
