//! Output file helpers shared by the renderers.

use crate::types::NetrenderError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Write `contents` to `root/rel`, creating parent directories and replacing
/// any existing file.
pub fn write_file(root: &Path, rel: &str, contents: &str) -> Result<PathBuf, NetrenderError> {
    let path = root.join(rel);
    let write_err = |e: std::io::Error| NetrenderError::WriteError(format!("{}: {}", path.display(), e));

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }
    std::fs::write(&path, contents).map_err(write_err)?;
    tracing::debug!("Wrote {}", path.display());
    Ok(path)
}

/// Like [`write_file`], readable by the owner only.
pub fn write_private_file(
    root: &Path,
    rel: &str,
    contents: &str,
) -> Result<PathBuf, NetrenderError> {
    let path = write_file(root, rel, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| NetrenderError::WriteError(format!("{}: {}", path.display(), e)))?;
    }
    Ok(path)
}

/// Remove `root/rel` if it exists.
pub fn remove_file(root: &Path, rel: &str) -> Result<bool, NetrenderError> {
    let path = root.join(rel);
    match std::fs::remove_file(&path) {
        Ok(()) => {
            tracing::debug!("Removed {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(NetrenderError::IoError(format!("{}: {}", path.display(), e))),
    }
}

/// Remove every file in `root/dir` whose name starts with `prefix` and ends
/// with `suffix`. A missing directory is not an error.
///
/// Returns the number of files removed.
pub fn unlink_matching(
    root: &Path,
    dir: &str,
    prefix: &str,
    suffix: &str,
) -> Result<usize, NetrenderError> {
    let dir = root.join(dir);
    let io = |e: std::io::Error| NetrenderError::IoError(format!("{}: {}", dir.display(), e));

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(io(e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(io)?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name.starts_with(prefix) && name.ends_with(suffix) && !path.is_dir() {
            std::fs::remove_file(&path)
                .map_err(|e| NetrenderError::IoError(format!("{}: {}", path.display(), e)))?;
            tracing::debug!("Removed {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_creates_parents_and_overwrites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_file(dir.path(), "a/b/c.conf", "one").expect("write");
        write_file(dir.path(), "a/b/c.conf", "two").expect("rewrite");
        assert_eq!(std::fs::read_to_string(path).expect("read"), "two");
    }

    #[test]
    fn unlink_only_matching() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_file(dir.path(), "out/10-netplan-eth0.network", "").expect("write");
        write_file(dir.path(), "out/10-netplan-eth0.netdev", "").expect("write");
        write_file(dir.path(), "out/20-other.network", "").expect("write");

        let removed = unlink_matching(dir.path(), "out", "10-netplan-", "").expect("unlink");
        assert_eq!(removed, 2);
        assert!(dir.path().join("out/20-other.network").exists());
    }

    #[test]
    fn unlink_missing_dir_is_ok() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(unlink_matching(dir.path(), "nope", "x", "").expect("unlink"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn private_file_mode() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_private_file(dir.path(), "secret.conf", "psk").expect("write");
        let mode = std::fs::metadata(path).expect("meta").permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
