//! # Converge
//!
//! An idempotent task engine for provisioning hosts.
//!
//! Each task asserts a piece of desired state (file content, a running
//! service, an installed package, a marked block in `/etc/hosts`, ...). The
//! executor runs tasks strictly in order: it asks the checker whether the
//! state already holds, performs the action only when it does not, and
//! records one outcome per task.
//!
//! ## Core Concepts
//!
//! - **Task**: a validated unit of desired state ([`Task`], built from a [`TaskSpec`])
//! - **Checker**: per-kind rules deciding whether a task is already satisfied
//! - **Executor**: ordered execution with stop-on-failure, producing a [`RunReport`]
//! - **Runner**: every external process goes through a [`CommandRunner`]
//!
//! ## Example
//!
//! ```ignore
//! use converge::{
//!     Action, ApplyContext, ExecuteOptions, FileContent, NoProgress, SystemRunner, Task,
//!     execute,
//! };
//!
//! let tasks = vec![Task::new(
//!     "motd",
//!     Action::FileContent(FileContent::inline("/etc/motd", "managed\n").with_mode(0o644)),
//! )];
//!
//! let ctx = ApplyContext::new(&SystemRunner);
//! let report = execute(&tasks, &ctx, &ExecuteOptions::default(), &mut NoProgress);
//! assert!(report.is_success());
//! ```

pub mod action;
pub mod block;
pub mod check;
pub mod context;
pub mod error;
pub mod executor;
pub mod fsutil;
pub mod ini;
pub mod planner;
pub mod runner;
pub mod system;
pub mod task;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use block::{BlockOutcome, apply_block, apply_lines};
pub use check::{Preview, is_satisfied, preview};
pub use context::{ApplyContext, NoProgress, ProgressCallback};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{Target, execute, execute_specs, execute_targets};
pub use planner::{ExecutionPlan, PlanEntry, PlanStatus, filter_tasks};
pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use system::{PackageManager, ServiceManager};
pub use task::{
    Action, BlockContent, BlockTask, FetchTask, FileContent, FileSource, HostEntry, HostnameTask,
    IniTask, PackageTask, RepoTask, ServiceDesired, ServiceTask, ShellTask, Task, TaskKind,
    TaskSpec, validate_all,
};
pub use types::{ExecuteOptions, ExecutionResult, RunReport, RunSummary, TaskStatus};
