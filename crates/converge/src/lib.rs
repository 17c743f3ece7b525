//! # Converge
//!
//! Idempotent provisioning of a single remote host.
//!
//! Every unit of work is an [`Action`]: it first detects whether its
//! end-state already holds and only then issues the minimal ordered set of
//! commands to reach it. Running the same actions twice leaves the host
//! unchanged the second time.
//!
//! ## Core Concepts
//!
//! - **Executor**: Runs shell commands on the target (SSH, local shell, simulation)
//! - **Run**: Per-invocation context holding the memoized [`HostFacts`]
//! - **Action**: Detect → decide → mutate, with hard-required and best-effort steps
//! - **Catalog**: Name → actions registration table driven by [`dispatch`]
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Action, Detection, Run, Steps, apply, NoReport, shell};
//!
//! #[derive(Debug)]
//! struct Redis;
//!
//! impl Action for Redis {
//!     fn name(&self) -> &'static str { "redis" }
//!     fn description(&self) -> String { "Install redis-server".into() }
//!
//!     fn detect(&self, run: &Run<'_>) -> converge::Result<Detection> {
//!         Ok(Detection::from_probe(run.has_binary("redis-server")?, ""))
//!     }
//!
//!     fn mutate(&self, steps: &mut Steps<'_, '_>) -> converge::Result<()> {
//!         steps.required(&shell::apt_install(&["redis-server"]))?;
//!         Ok(())
//!     }
//! }
//!
//! let run = Run::new(&executor);
//! let outcome = apply(&Redis, &run, &mut NoReport);
//! ```
//!
//! ## Provider Traits
//!
//! - [`Executor`]: How commands reach the host
//! - [`Reporter`]: Receives progress events
//! - [`Catalog`]: Resolves task names to actions
//!
//! The `sim` feature exposes [`sim::SimHost`], an in-memory host for tests.

pub mod action;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod facts;
pub mod reporter;
pub mod run;
pub mod shell;
pub mod types;
pub mod version;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

// Re-export main types at crate root
pub use action::{Action, BoxedAction, Detection, Steps, apply};
pub use dispatch::{Catalog, DispatchOptions, DispatchReport, dispatch, split_selectors};
pub use error::{Error, ErrorCategory, Result};
pub use executor::Executor;
pub use facts::HostFacts;
pub use reporter::{NoReport, Recording, Reporter};
pub use run::Run;
pub use types::{ActionState, Architecture, CommandResult, Outcome, RunSummary};
pub use version::Version;
