//! Cross-platform filesystem primitives that `std::fs` does not cover.
//!
//! On Linux, [`exchange`] swaps two names with `renameat2(RENAME_EXCHANGE)`.
//! Where that call is unavailable the swap is done with three renames through
//! a temporary sibling name and rolled back if a later step fails, so each
//! name always refers to one complete file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

/// Atomically swaps the files at `a` and `b`.
pub fn exchange(a: &Path, b: &Path) -> io::Result<()> {
    if let Some(result) = exchange_native(a, b) {
        return result;
    }
    exchange_by_rename(a, b, |from, to| std::fs::rename(from, to))
}

#[cfg(target_os = "linux")]
fn exchange_native(a: &Path, b: &Path) -> Option<io::Result<()>> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    const RENAME_EXCHANGE: libc::c_uint = 1 << 1;

    let (ca, cb) = match (CString::new(a.as_os_str().as_bytes()), CString::new(b.as_os_str().as_bytes())) {
        (Ok(ca), Ok(cb)) => (ca, cb),
        _ => return Some(Err(io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))),
    };
    // SAFETY: both pointers come from live CStrings and the call does not retain them.
    let rc = unsafe {
        libc::syscall(libc::SYS_renameat2, libc::AT_FDCWD, ca.as_ptr(), libc::AT_FDCWD, cb.as_ptr(), RENAME_EXCHANGE)
    };
    if rc == 0 {
        return Some(Ok(()));
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ENOSYS) | Some(libc::EINVAL) | Some(libc::EOPNOTSUPP) => {
            debug!(error = %err, "renameat2 exchange unavailable; falling back to renames");
            None
        }
        _ => Some(Err(err)),
    }
}

#[cfg(not(target_os = "linux"))]
fn exchange_native(_a: &Path, _b: &Path) -> Option<io::Result<()>> {
    None
}

/// Three-rename swap with rollback. `rename` is the primitive used for every step.
pub(crate) fn exchange_by_rename<R>(a: &Path, b: &Path, mut rename: R) -> io::Result<()>
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    if !b.exists() {
        return Err(io::Error::new(io::ErrorKind::NotFound, format!("'{}' does not exist", b.display())));
    }
    let tmp = swap_name(a);
    rename(a, &tmp)?;
    if let Err(e) = rename(b, a) {
        restore(&mut rename, &tmp, a);
        return Err(e);
    }
    if let Err(e) = rename(&tmp, b) {
        restore(&mut rename, a, b);
        restore(&mut rename, &tmp, a);
        return Err(e);
    }
    Ok(())
}

fn restore<R>(rename: &mut R, from: &Path, to: &Path)
where
    R: FnMut(&Path, &Path) -> io::Result<()>,
{
    if let Err(e) = rename(from, to) {
        warn!(from = %from.display(), to = %to.display(), error = %e, "rollback of exchange failed");
    }
}

fn swap_name(a: &Path) -> PathBuf {
    let leaf = a.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    a.with_file_name(format!(".{leaf}.xchg-{}", std::process::id()))
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
pub fn free_space(path: &Path) -> io::Result<u64> {
    let target = nearest_existing(path).canonicalize()?;
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let best = disks
        .list()
        .iter()
        .filter(|d| target.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());
    match best {
        Some(disk) => Ok(disk.available_space()),
        None => statvfs_available(&target),
    }
}

#[cfg(unix)]
fn statvfs_available(path: &Path) -> io::Result<u64> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c = CString::new(path.as_os_str().as_bytes())?;
    // SAFETY: `statvfs` is plain data and the call only writes into it.
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(c.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(st.f_bavail as u64 * st.f_frsize as u64)
}

#[cfg(not(unix))]
fn statvfs_available(path: &Path) -> io::Result<u64> {
    Err(io::Error::new(io::ErrorKind::NotFound, format!("no disk backs '{}'", path.display())))
}

fn nearest_existing(path: &Path) -> &Path {
    path.ancestors().find(|p| p.exists()).unwrap_or(Path::new("."))
}

pub fn modified(path: &Path) -> io::Result<SystemTime> {
    std::fs::metadata(path)?.modified()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn exchange_swaps_contents() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"alpha").unwrap();
        fs::write(&b, b"bravo!").unwrap();
        exchange(&a, &b).unwrap();
        assert_eq!(fs::read(&a).unwrap(), b"bravo!");
        assert_eq!(fs::read(&b).unwrap(), b"alpha");
    }

    #[test]
    fn rename_swap_rolls_back_on_failure() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        fs::write(&a, b"alpha").unwrap();
        fs::write(&b, b"bravo").unwrap();

        for fail_at in [1, 2] {
            let mut calls = 0;
            let err = exchange_by_rename(&a, &b, |from, to| {
                calls += 1;
                if calls == fail_at + 1 {
                    return Err(io::Error::new(io::ErrorKind::Other, "injected"));
                }
                fs::rename(from, to)
            });
            assert!(err.is_err());
            assert_eq!(fs::read(&a).unwrap(), b"alpha");
            assert_eq!(fs::read(&b).unwrap(), b"bravo");
            assert!(!swap_name(&a).exists());
        }

        exchange_by_rename(&a, &b, |from, to| fs::rename(from, to)).unwrap();
        assert_eq!(fs::read(&a).unwrap(), b"bravo");
        assert_eq!(fs::read(&b).unwrap(), b"alpha");
    }

    #[test]
    fn exchange_with_missing_side_fails_cleanly() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.txt");
        fs::write(&a, b"alpha").unwrap();
        assert!(exchange(&a, &dir.path().join("missing")).is_err());
        assert_eq!(fs::read(&a).unwrap(), b"alpha");
    }

    #[test]
    fn free_space_of_temp_dir() {
        let dir = tempdir().unwrap();
        assert!(free_space(&dir.path().join("not-yet-created")).is_ok());
    }
}
