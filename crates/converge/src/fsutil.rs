//! Filesystem helpers: atomic replacement and account lookup

use crate::error::{Error, Result};
use std::fs::{self, File, Permissions};
use std::io::{self, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Ownership to apply to a written file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Ownership {
    pub uid: Option<u32>,
    pub gid: Option<u32>,
}

/// Replace `path` with `contents` via temp file + rename.
///
/// Either the whole new content is visible afterwards or, on failure, the
/// previous file is untouched. When `mode` is `None` an existing file's
/// permissions are carried over.
pub fn write_atomic(
    path: &Path,
    contents: &[u8],
    mode: Option<u32>,
    ownership: Ownership,
) -> Result<()> {
    write_atomic_with(path, mode, ownership, |file| file.write_all(contents))
}

/// Atomic replacement with a caller-supplied fill step
pub(crate) fn write_atomic_with<F>(
    path: &Path,
    mode: Option<u32>,
    ownership: Ownership,
    fill: F,
) -> Result<()>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".hostprov-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| Error::io(dir, e))?;

    fill(tmp.as_file_mut()).map_err(|e| Error::io(path, e))?;
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;

    let permissions = match mode {
        Some(mode) => Some(permissions_from_mode(mode)),
        None => fs::metadata(path).ok().map(|m| m.permissions()),
    };
    // Fresh temp files are 0600; default new files to 0644 like an editor would
    let permissions = permissions.unwrap_or_else(|| permissions_from_mode(0o644));
    tmp.as_file()
        .set_permissions(permissions)
        .map_err(|e| Error::io(path, e))?;

    if ownership.uid.is_some() || ownership.gid.is_some() {
        std::os::unix::fs::fchown(tmp.as_file(), ownership.uid, ownership.gid)
            .map_err(|e| Error::io(path, e))?;
    }

    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

fn permissions_from_mode(mode: u32) -> Permissions {
    Permissions::from_mode(mode)
}

/// Read a file, returning `None` when it does not exist
pub fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Read a UTF-8 text file, returning `None` when it does not exist
pub fn read_text_optional(path: &Path) -> Result<Option<String>> {
    match read_optional(path)? {
        Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
            Error::action(format!("{} is not valid UTF-8 text", path.display()))
        }),
        None => Ok(None),
    }
}

/// Permission bits of an existing file
pub fn mode_of(meta: &fs::Metadata) -> u32 {
    meta.permissions().mode() & 0o7777
}

/// Resolve a user name (or numeric id) through a passwd-format file
pub fn lookup_uid(passwd: &Path, name: &str) -> Result<u32> {
    lookup_id(passwd, name, "user")
}

/// Resolve a group name (or numeric id) through a group-format file
pub fn lookup_gid(group: &Path, name: &str) -> Result<u32> {
    lookup_id(group, name, "group")
}

fn lookup_id(db: &Path, name: &str, what: &str) -> Result<u32> {
    if let Ok(id) = name.parse::<u32>() {
        return Ok(id);
    }
    // root is id 0 even on a target without account databases
    if name == "root" {
        return Ok(0);
    }

    let content = read_text_optional(db)?.unwrap_or_default();
    content
        .lines()
        .filter(|line| !line.starts_with('#'))
        .find_map(|line| {
            let mut fields = line.split(':');
            let entry_name = fields.next()?;
            let _password = fields.next()?;
            let id = fields.next()?;
            (entry_name == name).then(|| id.parse::<u32>().ok()).flatten()
        })
        .ok_or_else(|| Error::action(format!("unknown {what} '{name}' in {}", db.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_atomic_creates_and_replaces() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");

        write_atomic(&path, b"one\n", None, Ownership::default()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"one\n");

        write_atomic(&path, b"two\n", None, Ownership::default()).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two\n");
    }

    #[test]
    fn test_write_atomic_preserves_existing_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, "old\n").unwrap();
        fs::set_permissions(&path, Permissions::from_mode(0o640)).unwrap();

        write_atomic(&path, b"new\n", None, Ownership::default()).unwrap();
        assert_eq!(mode_of(&fs::metadata(&path).unwrap()), 0o640);
    }

    #[test]
    fn test_write_atomic_applies_mode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sshd_config");
        write_atomic(&path, b"Port 22\n", Some(0o600), Ownership::default()).unwrap();
        assert_eq!(mode_of(&fs::metadata(&path).unwrap()), 0o600);
    }

    #[test]
    fn test_interrupted_write_leaves_original() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hosts");
        fs::write(&path, "127.0.0.1\tlocalhost\n").unwrap();

        let result = write_atomic_with(&path, None, Ownership::default(), |file| {
            file.write_all(b"10.0.0.1\tmo")?;
            Err(io::Error::other("simulated crash mid-write"))
        });

        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "127.0.0.1\tlocalhost\n");
        // The temp file is cleaned up with the failed write
        let leftovers: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("file");
        let err = write_atomic(&path, b"x", None, Ownership::default()).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn test_read_optional() {
        let dir = TempDir::new().unwrap();
        assert_eq!(read_optional(&dir.path().join("nope")).unwrap(), None);
        fs::write(dir.path().join("yes"), "x").unwrap();
        assert_eq!(
            read_optional(&dir.path().join("yes")).unwrap(),
            Some(b"x".to_vec())
        );
    }

    #[test]
    fn test_lookup_ids() {
        let dir = TempDir::new().unwrap();
        let passwd = dir.path().join("passwd");
        fs::write(
            &passwd,
            "root:x:0:0:root:/root:/bin/bash\nceph:x:64045:64045::/var/lib/ceph:/bin/false\n",
        )
        .unwrap();

        assert_eq!(lookup_uid(&passwd, "root").unwrap(), 0);
        assert_eq!(lookup_uid(&passwd, "ceph").unwrap(), 64045);
        assert_eq!(lookup_uid(&passwd, "1000").unwrap(), 1000);
        assert!(lookup_uid(&passwd, "nobody-here").is_err());
        assert!(lookup_gid(&dir.path().join("group"), "ceph").is_err());
    }

    #[test]
    fn test_root_resolves_without_account_files() {
        let dir = TempDir::new().unwrap();
        assert_eq!(lookup_uid(&dir.path().join("passwd"), "root").unwrap(), 0);
        assert_eq!(lookup_gid(&dir.path().join("group"), "root").unwrap(), 0);
    }
}
