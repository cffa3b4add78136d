//! Apply context and progress reporting
//!
//! The context carries everything a task needs to inspect or change its
//! target: the filesystem root the task paths are resolved against, the
//! command runner, and the service and package managers.

use crate::runner::{CommandRunner, TargetRunner};
use crate::system::{PackageManager, ServiceManager};
use crate::task::Task;
use crate::types::ExecutionResult;
use std::path::{Path, PathBuf};

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called before a task is checked and applied (`index` is zero-based)
    fn on_task_start(&mut self, index: usize, total: usize, task: &Task);

    /// Called once the task has an outcome
    fn on_task_complete(&mut self, result: &ExecutionResult);

    /// Called when a failure stops the run; lists the tasks left unexecuted
    fn on_abort(&mut self, not_run: &[String]);
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_task_start(&mut self, _index: usize, _total: usize, _task: &Task) {}
    fn on_task_complete(&mut self, _result: &ExecutionResult) {}
    fn on_abort(&mut self, _not_run: &[String]) {}
}

/// Context passed to checks and actions
pub struct ApplyContext<'a> {
    /// Root the task paths are resolved against, `/` for the live system
    pub root: PathBuf,
    /// Runner for every external process, reached through [`Self::commands`]
    pub runner: &'a dyn CommandRunner,
    pub services: ServiceManager,
    pub packages: PackageManager,
}

impl<'a> ApplyContext<'a> {
    /// Context for the live system
    pub fn new(runner: &'a dyn CommandRunner) -> Self {
        Self {
            root: PathBuf::from("/"),
            runner,
            services: ServiceManager::default(),
            packages: PackageManager::default(),
        }
    }

    /// Resolve task paths under `root` instead of `/`
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_service_manager(mut self, services: ServiceManager) -> Self {
        self.services = services;
        self
    }

    /// Location of an absolute task path on this target
    pub fn target_path(&self, path: &Path) -> PathBuf {
        match path.strip_prefix("/") {
            Ok(relative) => self.root.join(relative),
            Err(_) => self.root.join(path),
        }
    }

    /// Account database used to resolve owner names
    pub fn passwd_path(&self) -> PathBuf {
        self.target_path(Path::new("/etc/passwd"))
    }

    /// Group database used to resolve group names
    pub fn group_path(&self) -> PathBuf {
        self.target_path(Path::new("/etc/group"))
    }

    /// Whether this context addresses the live system
    pub fn is_live(&self) -> bool {
        self.root == Path::new("/")
    }

    /// Runner whose commands execute on this target
    pub fn commands(&self) -> TargetRunner<'_> {
        TargetRunner::new(self.runner, &self.root)
    }
}
