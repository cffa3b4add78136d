//! Actions that bring a target to the desired state
//!
//! Actions run only after the checker found the task unsatisfied (or the task
//! bypasses the check). File writes go through [`fsutil::write_atomic`];
//! everything else goes through the context's runner.

use crate::block;
use crate::check::{self, desired_bytes, resolve_ownership};
use crate::context::ApplyContext;
use crate::error::{Error, Result};
use crate::fsutil;
use crate::ini;
use crate::runner::{CommandRunner, argv};
use crate::task::{Action, FetchTask, FileContent, IniTask, RepoTask, ShellTask, Task};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Perform the action of `task`, returning captured command output if any
pub fn perform(task: &Task, ctx: &ApplyContext) -> Result<Option<String>> {
    match &task.action {
        Action::FileContent(f) => write_file(f, ctx).map(|()| None),
        Action::ServiceState(s) => {
            let output = ctx.services.apply(&ctx.commands(), &s.service, s.state)?;
            log::info!("Service {} {}", s.service, s.state.as_str());
            Ok(Some(output.stdout))
        }
        Action::PackageInstalled(p) => {
            if p.update_cache {
                ctx.packages.update(&ctx.commands())?;
            }
            let output = ctx
                .packages
                .install(&ctx.commands(), &p.package, p.version.as_deref())?;
            log::info!("Installed {}", task.action.target());
            Ok(Some(output.stdout))
        }
        Action::RepoRegistered(r) => register_repo(r, ctx),
        Action::ShellCommand(s) => run_shell(s, ctx).map(Some),
        Action::BlockInFile(b) => {
            let path = ctx.target_path(&b.path);
            if !b.content.is_empty() {
                ensure_parent(&path)?;
            }
            block::apply_lines(&path, &b.marker, &b.content.lines())?;
            Ok(None)
        }
        Action::IniValue(i) => set_ini(i, ctx).map(|()| None),
        Action::FetchFile(f) => fetch(f, ctx).map(|()| None),
        Action::Hostname(h) => {
            let path = check::hostname_path(ctx);
            ensure_parent(&path)?;
            fsutil::write_atomic(
                &path,
                format!("{}\n", h.hostname).as_bytes(),
                None,
                fsutil::Ownership::default(),
            )?;
            log::info!("Hostname set to {}", h.hostname);
            if ctx.is_live() {
                let output = ctx
                    .commands()
                    .run_checked(&argv(&["hostname", &h.hostname]), None)?;
                return Ok(Some(output.stdout));
            }
            Ok(None)
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        log::debug!("Creating {}", parent.display());
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    Ok(())
}

fn write_file(f: &FileContent, ctx: &ApplyContext) -> Result<()> {
    let path = ctx.target_path(&f.path);
    let ownership = resolve_ownership(f, ctx)?;

    if !f.force && path.exists() {
        // Leave content alone, only fix up metadata
        if let Some(mode) = f.mode {
            fs::set_permissions(&path, fs::Permissions::from_mode(mode))
                .map_err(|e| Error::io(&path, e))?;
        }
        if ownership.uid.is_some() || ownership.gid.is_some() {
            std::os::unix::fs::chown(&path, ownership.uid, ownership.gid)
                .map_err(|e| Error::io(&path, e))?;
        }
        return Ok(());
    }

    let content = desired_bytes(f)?;
    ensure_parent(&path)?;
    fsutil::write_atomic(&path, &content, f.mode, ownership)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}

fn register_repo(r: &RepoTask, ctx: &ApplyContext) -> Result<Option<String>> {
    let path = ctx.target_path(&r.file);
    let existing = fsutil::read_text_optional(&path)?.unwrap_or_default();
    if !existing.lines().any(|line| line.trim() == r.repo.trim()) {
        ensure_parent(&path)?;
        let content = check::repo_content(&existing, &r.repo);
        fsutil::write_atomic(&path, content.as_bytes(), None, fsutil::Ownership::default())?;
        log::info!("Registered repository in {}", path.display());
    }

    if r.update_cache {
        let output = ctx.packages.update(&ctx.commands())?;
        return Ok(Some(output.stdout));
    }
    Ok(None)
}

fn run_shell(s: &ShellTask, ctx: &ApplyContext) -> Result<String> {
    let output = ctx.commands().run_checked(&s.argv, s.cwd.as_deref())?;

    if let Some(creates) = &s.creates
        && !ctx.target_path(creates).exists()
    {
        log::warn!(
            "`{}` succeeded but did not create {}",
            crate::runner::render(&s.argv),
            creates.display()
        );
    }
    Ok(output.stdout)
}

fn set_ini(i: &IniTask, ctx: &ApplyContext) -> Result<()> {
    let path = ctx.target_path(&i.path);
    let existing = fsutil::read_text_optional(&path)?.unwrap_or_default();
    let updated = ini::set_option(&existing, &i.section, &i.option, i.value.trim());
    if updated == existing {
        return Ok(());
    }
    ensure_parent(&path)?;
    fsutil::write_atomic(&path, updated.as_bytes(), None, fsutil::Ownership::default())?;
    log::info!("Set [{}] {} in {}", i.section, i.option, path.display());
    Ok(())
}

fn fetch(f: &FetchTask, ctx: &ApplyContext) -> Result<()> {
    let src = ctx.target_path(&f.src);
    let Some(bytes) = fsutil::read_optional(&src)? else {
        return Err(Error::action(format!(
            "{} does not exist on the target",
            f.src.display()
        )));
    };
    ensure_parent(&f.dest)?;
    fsutil::write_atomic(&f.dest, &bytes, None, fsutil::Ownership::default())?;
    log::info!("Fetched {} to {}", f.src.display(), f.dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{BlockContent, BlockTask, HostEntry, HostnameTask, PackageTask};
    use crate::testing::FakeSystem;
    use tempfile::TempDir;

    #[test]
    fn test_write_file_creates_parents_and_mode() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        let task = Task::new(
            "sshd",
            Action::FileContent(
                FileContent::inline("/etc/ssh/sshd_config", "PermitRootLogin prohibit-password\n")
                    .with_mode(0o600),
            ),
        );

        perform(&task, &ctx).unwrap();
        let path = dir.path().join("etc/ssh/sshd_config");
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PermitRootLogin prohibit-password\n"
        );
        assert_eq!(fsutil::mode_of(&fs::metadata(&path).unwrap()), 0o600);
        assert!(check::is_satisfied(&task, &ctx).unwrap());
    }

    #[test]
    fn test_unforced_file_keeps_content() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        fs::create_dir_all(dir.path().join("etc")).unwrap();
        fs::write(dir.path().join("etc/motd"), "local edit\n").unwrap();

        let mut file = FileContent::inline("/etc/motd", "managed\n").with_mode(0o640);
        file.force = false;
        perform(&Task::new("motd", Action::FileContent(file)), &ctx).unwrap();

        let path = dir.path().join("etc/motd");
        assert_eq!(fs::read_to_string(&path).unwrap(), "local edit\n");
        assert_eq!(fsutil::mode_of(&fs::metadata(&path).unwrap()), 0o640);
    }

    #[test]
    fn test_package_install_refreshes_cache_first() {
        let system = FakeSystem::new("/");
        let ctx = ApplyContext::new(&system);
        let task = Task::new(
            "ntp",
            Action::PackageInstalled(PackageTask {
                package: "ntp".into(),
                version: None,
                update_cache: true,
            }),
        );

        perform(&task, &ctx).unwrap();
        let apt = system.calls_to("apt-get");
        assert_eq!(apt.len(), 2);
        assert_eq!(apt[0], argv(&["apt-get", "update"]));
        assert!(system.package_version("ntp").is_some());
    }

    #[test]
    fn test_repo_registration_appends_once() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        let task = Task::new(
            "repo",
            Action::RepoRegistered(RepoTask {
                repo: "deb https://download.ceph.com/debian-luminous/ xenial main".into(),
                file: "/etc/apt/sources.list.d/ceph.list".into(),
                update_cache: false,
            }),
        );

        perform(&task, &ctx).unwrap();
        perform(&task.clone().always(), &ctx).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/apt/sources.list.d/ceph.list")).unwrap(),
            "deb https://download.ceph.com/debian-luminous/ xenial main\n"
        );
    }

    #[test]
    fn test_shell_failure_is_external_command_error() {
        let system = FakeSystem::new("/");
        system.fail("ceph-deploy", 1, "[ERROR ] RuntimeError: bad monitor");
        let ctx = ApplyContext::new(&system);
        let task = Task::new(
            "new cluster",
            Action::ShellCommand(ShellTask {
                argv: argv(&["ceph-deploy", "--cluster", "prod", "new", "cephmon1.prod"]),
                cwd: None,
                creates: None,
            }),
        );

        let err = perform(&task, &ctx).unwrap_err();
        assert!(matches!(err, Error::ExternalCommand { exit_code: Some(1), .. }));
        assert!(err.to_string().contains("bad monitor"));
    }

    #[test]
    fn test_block_action_writes_hosts() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        let task = Task::new(
            "hosts",
            Action::BlockInFile(BlockTask {
                path: "/etc/hosts".into(),
                marker: "prod".into(),
                content: BlockContent::Entries(vec![HostEntry::new(
                    "10.0.0.1",
                    "mon1",
                    "mon1.cluster.local",
                )]),
            }),
        );

        perform(&task, &ctx).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("etc/hosts")).unwrap(),
            "# BEGIN prod\n10.0.0.1\tmon1\tmon1.cluster.local\n# END prod\n"
        );
    }

    #[test]
    fn test_ini_and_hostname_actions() {
        let dir = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());

        let ini = Task::new(
            "pool size",
            Action::IniValue(IniTask {
                path: "/root/prod/prod.conf".into(),
                section: "global".into(),
                option: "osd pool default size".into(),
                value: "2".into(),
            }),
        );
        perform(&ini, &ctx).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("root/prod/prod.conf")).unwrap(),
            "[global]\nosd pool default size = 2\n"
        );

        let hostname = Task::new(
            "hostname",
            Action::Hostname(HostnameTask {
                hostname: "cephosdrgw1".into(),
            }),
        );
        perform(&hostname, &ctx).unwrap();
        assert!(check::is_satisfied(&hostname, &ctx).unwrap());
        // Not the live system, so the running hostname is left alone
        assert!(system.calls_to("hostname").is_empty());
    }

    #[test]
    fn test_fetch_missing_source_is_action_error() {
        let dir = TempDir::new().unwrap();
        let local = TempDir::new().unwrap();
        let system = FakeSystem::new(dir.path());
        let ctx = ApplyContext::new(&system).with_root(dir.path());
        let task = Task::new(
            "fetch",
            Action::FetchFile(FetchTask {
                src: "/root/.ssh/id_rsa.pub".into(),
                dest: local.path().join("pubkeys/admin.pub"),
            }),
        );

        let err = perform(&task, &ctx).unwrap_err();
        assert!(matches!(err, Error::Action { .. }));

        fs::create_dir_all(dir.path().join("root/.ssh")).unwrap();
        fs::write(dir.path().join("root/.ssh/id_rsa.pub"), "ssh-rsa AAA\n").unwrap();
        perform(&task, &ctx).unwrap();
        assert_eq!(
            fs::read_to_string(local.path().join("pubkeys/admin.pub")).unwrap(),
            "ssh-rsa AAA\n"
        );
    }
}
