use std::path::{Path, PathBuf};

use crate::error::FtpError;
use crate::response::Code;

/// Resolves `requested` relative to `current_dir` and accepts it only if the
/// canonicalized result is at or under the canonicalized `user_root`.
///
/// Both `.`/`..` components and symlinks are resolved before the prefix
/// check runs, so a string-level check on the unresolved path would not be
/// sufficient (a symlinked `..` could otherwise point outside the jail).
/// `requested` must name an existing directory; this is only used by CWD.
pub fn resolve_directory(current_dir: &Path, user_root: &Path, requested: &str) -> Result<PathBuf, FtpError> {
    let candidate = current_dir.join(requested);

    let canonical_root = user_root.canonicalize().map_err(|_| {
        FtpError::protocol(Code::FileUnavailable, "No such file or directory.")
    })?;

    let canonical = candidate.canonicalize().map_err(|_| {
        FtpError::protocol(Code::FileUnavailable, "No such file or directory.")
    })?;

    if !canonical.is_dir() {
        return Err(FtpError::protocol(
            Code::FileUnavailable,
            "No such file or directory.",
        ));
    }

    if !canonical.starts_with(&canonical_root) {
        return Err(FtpError::protocol(
            Code::FileUnavailable,
            "No such file or directory.",
        ));
    }

    Ok(canonical)
}

/// Validates a STOR/RETR filename argument and joins it onto the session's
/// (already-canonical, already-jailed) current directory.
///
/// The filename itself is never canonicalized: for STOR the destination file
/// does not exist yet, so `canonicalize` would fail outright. Jailing is
/// instead enforced by rejecting any `/` in the argument — the file can only
/// ever land directly inside `current_dir`.
pub fn file_path_in_current_dir(current_dir: &Path, filename: &str) -> Result<PathBuf, FtpError> {
    if filename.is_empty() || filename.contains('/') {
        return Err(FtpError::protocol(
            Code::FileUnavailable,
            "File name not allowed.",
        ));
    }
    if filename == "." || filename == ".." {
        return Err(FtpError::protocol(
            Code::FileUnavailable,
            "File name not allowed.",
        ));
    }
    Ok(current_dir.join(filename))
}

/// Strips `users_root` off an already-jailed absolute path for display in a
/// `257`/`200` reply, e.g. `/srv/users/alice/docs` -> `alice/docs`.
pub fn relative_to_users_root(users_root: &Path, path: &Path) -> String {
    path.strip_prefix(users_root)
        .unwrap_or(path)
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn tempdir(name: &str) -> PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "ftp-sandbox-test-{}-{}-{}",
            std::process::id(),
            name,
            n
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn resolves_subdirectory_within_jail() {
        let root = tempdir("root");
        fs::create_dir_all(root.join("docs")).unwrap();

        let resolved = resolve_directory(&root, &root, "docs").unwrap();
        assert_eq!(resolved, root.canonicalize().unwrap().join("docs"));
    }

    #[test]
    fn rejects_escape_via_dotdot() {
        let base = tempdir("base");
        let alice = base.join("alice");
        let bob = base.join("bob");
        fs::create_dir_all(&alice).unwrap();
        fs::create_dir_all(&bob).unwrap();

        let err = resolve_directory(&alice, &alice, "../bob").unwrap_err();
        match err {
            FtpError::Protocol { code, .. } => assert_eq!(code, Code::FileUnavailable),
            _ => panic!("expected protocol error"),
        }
    }

    #[test]
    fn rejects_escape_via_symlink() {
        let base = tempdir("symlink-base");
        let alice = base.join("alice");
        let outside = base.join("outside");
        fs::create_dir_all(&alice).unwrap();
        fs::create_dir_all(&outside).unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&outside, alice.join("escape")).unwrap();
            let err = resolve_directory(&alice, &alice, "escape").unwrap_err();
            match err {
                FtpError::Protocol { code, .. } => assert_eq!(code, Code::FileUnavailable),
                _ => panic!("expected protocol error"),
            }
        }
    }

    #[test]
    fn filename_with_slash_is_rejected() {
        let root = tempdir("filename");
        assert!(file_path_in_current_dir(&root, "a/b").is_err());
        assert!(file_path_in_current_dir(&root, "..").is_err());
        assert!(file_path_in_current_dir(&root, "hello.bin").is_ok());
    }
}
