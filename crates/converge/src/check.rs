//! Idempotency checks
//!
//! Each task kind has a rule deciding whether the target already holds the
//! desired state. A satisfied task is skipped without running its action.

use crate::block;
use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::fsutil::{self, Ownership};
use crate::ini;
use crate::runner::{CommandRunner, argv};
use crate::task::{
    Action, BlockTask, FetchTask, FileContent, FileSource, IniTask, RepoTask, ServiceDesired, Task,
};
use std::fs;
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

/// Whether the target already satisfies `task`
pub fn is_satisfied(task: &Task, ctx: &ApplyContext) -> Result<bool> {
    let satisfied = match &task.action {
        Action::FileContent(f) => file_satisfied(f, ctx)?,
        Action::ServiceState(s) => match s.state {
            ServiceDesired::Started => ctx.services.is_running(&ctx.commands(), &s.service)?,
            ServiceDesired::Stopped => !ctx.services.is_running(&ctx.commands(), &s.service)?,
            ServiceDesired::Restarted => false,
        },
        Action::PackageInstalled(p) => {
            match ctx.packages.installed_version(&ctx.commands(), &p.package)? {
                Some(installed) => p.version.as_ref().is_none_or(|want| *want == installed),
                None => false,
            }
        }
        Action::RepoRegistered(r) => repo_satisfied(r, ctx)?,
        Action::ShellCommand(s) => s
            .creates
            .as_ref()
            .is_some_and(|marker| ctx.target_path(marker).exists()),
        Action::BlockInFile(b) => {
            let (current, desired) = block_contents(b, ctx)?;
            current.unwrap_or_default() == desired
        }
        Action::IniValue(i) => {
            let current = fsutil::read_text_optional(&ctx.target_path(&i.path))?;
            current
                .and_then(|c| ini::get_option(&c, &i.section, &i.option))
                .is_some_and(|v| v == i.value.trim())
        }
        Action::FetchFile(f) => fetch_satisfied(f, ctx)?,
        Action::Hostname(h) => hostname_satisfied(&h.hostname, ctx)?,
    };

    log::debug!(
        "{} '{}': {}",
        task.kind(),
        task.name,
        if satisfied { "satisfied" } else { "needs action" }
    );
    Ok(satisfied)
}

/// Bytes the file should contain
pub(crate) fn desired_bytes(f: &FileContent) -> Result<Vec<u8>> {
    match &f.source {
        FileSource::Inline(content) => Ok(content.as_bytes().to_vec()),
        FileSource::Local(src) => fs::read(src).map_err(|e| Error::io(src, e)),
    }
}

/// Resolve owner and group names against the target's account databases
pub(crate) fn resolve_ownership(f: &FileContent, ctx: &ApplyContext) -> Result<Ownership> {
    let uid = match &f.owner {
        Some(owner) => Some(fsutil::lookup_uid(&ctx.passwd_path(), owner)?),
        None => None,
    };
    let gid = match &f.group {
        Some(group) => Some(fsutil::lookup_gid(&ctx.group_path(), group)?),
        None => None,
    };
    Ok(Ownership { uid, gid })
}

fn file_satisfied(f: &FileContent, ctx: &ApplyContext) -> Result<bool> {
    let path = ctx.target_path(&f.path);
    let meta = match fs::metadata(&path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(Error::io(&path, e)),
    };

    if f.force {
        let current = fs::read(&path).map_err(|e| Error::io(&path, e))?;
        if current != desired_bytes(f)? {
            return Ok(false);
        }
    }

    if let Some(mode) = f.mode
        && fsutil::mode_of(&meta) != mode
    {
        return Ok(false);
    }

    let ownership = resolve_ownership(f, ctx)?;
    if ownership.uid.is_some_and(|uid| meta.uid() != uid)
        || ownership.gid.is_some_and(|gid| meta.gid() != gid)
    {
        return Ok(false);
    }
    Ok(true)
}

fn repo_satisfied(r: &RepoTask, ctx: &ApplyContext) -> Result<bool> {
    let content = fsutil::read_text_optional(&ctx.target_path(&r.file))?;
    Ok(content.is_some_and(|c| c.lines().any(|line| line.trim() == r.repo.trim())))
}

/// Registration file content with `repo` appended as its own line
pub(crate) fn repo_content(existing: &str, repo: &str) -> String {
    let mut out = existing.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(repo.trim());
    out.push('\n');
    out
}

/// Current file content (if any) and the content after splicing the block
pub(crate) fn block_contents(
    b: &BlockTask,
    ctx: &ApplyContext,
) -> Result<(Option<String>, String)> {
    let current = fsutil::read_text_optional(&ctx.target_path(&b.path))?;
    let desired = block::splice(current.as_deref().unwrap_or(""), &b.marker, &b.content.lines())?;
    Ok((current, desired))
}

fn fetch_satisfied(f: &FetchTask, ctx: &ApplyContext) -> Result<bool> {
    let src = ctx.target_path(&f.src);
    let Some(source) = fsutil::read_optional(&src)? else {
        return Ok(false);
    };
    Ok(fsutil::read_optional(&f.dest)?.is_some_and(|dest| dest == source))
}

pub(crate) fn hostname_path(ctx: &ApplyContext) -> PathBuf {
    ctx.target_path(Path::new("/etc/hostname"))
}

fn current_hostname(ctx: &ApplyContext) -> Result<Option<String>> {
    Ok(fsutil::read_text_optional(&hostname_path(ctx))?.map(|c| c.trim().to_string()))
}

fn hostname_satisfied(want: &str, ctx: &ApplyContext) -> Result<bool> {
    if current_hostname(ctx)?.as_deref() != Some(want) {
        return Ok(false);
    }
    if !ctx.is_live() {
        return Ok(true);
    }
    // The running name only follows /etc/hostname after a reboot
    let running = ctx.commands().run_checked(&argv(&["hostname"]), None)?;
    Ok(running.stdout.trim() == want)
}

/// Current and desired text of a file-shaped task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub path: PathBuf,
    pub current: String,
    pub desired: String,
}

/// Text preview of what the task would write, for file-shaped tasks
pub fn preview(task: &Task, ctx: &ApplyContext) -> Result<Option<Preview>> {
    let preview = match &task.action {
        Action::FileContent(f) => {
            let path = ctx.target_path(&f.path);
            let current = fsutil::read_optional(&path)?;
            let desired = if !f.force && current.is_some() {
                current.clone().unwrap_or_default()
            } else {
                desired_bytes(f)?
            };
            Preview {
                path,
                current: String::from_utf8_lossy(&current.unwrap_or_default()).into_owned(),
                desired: String::from_utf8_lossy(&desired).into_owned(),
            }
        }
        Action::BlockInFile(b) => {
            let (current, desired) = block_contents(b, ctx)?;
            Preview {
                path: ctx.target_path(&b.path),
                current: current.unwrap_or_default(),
                desired,
            }
        }
        Action::IniValue(IniTask {
            path,
            section,
            option,
            value,
        }) => {
            let path = ctx.target_path(path);
            let current = fsutil::read_text_optional(&path)?.unwrap_or_default();
            let desired = if ini::get_option(&current, section, option).as_deref()
                == Some(value.trim())
            {
                current.clone()
            } else {
                ini::set_option(&current, section, option, value.trim())
            };
            Preview {
                path,
                current,
                desired,
            }
        }
        Action::RepoRegistered(r) => {
            let path = ctx.target_path(&r.file);
            let current = fsutil::read_text_optional(&path)?.unwrap_or_default();
            let desired = if repo_satisfied(r, ctx)? {
                current.clone()
            } else {
                repo_content(&current, &r.repo)
            };
            Preview {
                path,
                current,
                desired,
            }
        }
        Action::Hostname(h) => {
            let path = hostname_path(ctx);
            Preview {
                current: fsutil::read_text_optional(&path)?.unwrap_or_default(),
                desired: format!("{}\n", h.hostname),
                path,
            }
        }
        Action::ServiceState(_)
        | Action::PackageInstalled(_)
        | Action::ShellCommand(_)
        | Action::FetchFile(_) => return Ok(None),
    };
    Ok(Some(preview))
}
