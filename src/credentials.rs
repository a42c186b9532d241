use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use log::{debug, warn};

pub type Users = BTreeMap<String, String>;

/// Username/password pairs loaded once from `<base_root>/users.txt`.
///
/// Lookups are by exact username; a user absent from the file cannot
/// authenticate, no matter the password supplied.
pub struct CredentialStore {
    users: Users,
    users_root: PathBuf,
}

impl CredentialStore {
    /// Loads `users.txt` under `base_root` and ensures every listed user has a
    /// storage directory under `base_root/users/`.
    ///
    /// Blank lines and lines that do not split into exactly `username SP
    /// password` are skipped silently, matching the reference format (no
    /// escaping, no comments).
    pub fn load(base_root: &Path) -> io::Result<Self> {
        let users_file = base_root.join("users.txt");
        let file = fs::File::open(&users_file).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("cannot read credentials file {:?}: {}", users_file, e),
            )
        })?;

        let mut users = Users::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            let mut parts = line.split(' ').filter(|s| !s.is_empty());
            let (Some(username), Some(password)) = (parts.next(), parts.next()) else {
                if !line.trim().is_empty() {
                    warn!("skipping malformed credentials line: {:?}", line);
                }
                continue;
            };
            if parts.next().is_some() {
                warn!("skipping malformed credentials line: {:?}", line);
                continue;
            }
            users.insert(username.to_owned(), password.to_owned());
        }

        let users_root = base_root.join("users");
        fs::create_dir_all(&users_root)?;
        for username in users.keys() {
            let dir = users_root.join(username);
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                debug!("created storage directory for user {:?}", username);
            }
        }
        // Canonicalized once here so every later comparison against a
        // session's (also canonicalized) current_dir is apples-to-apples,
        // even if base_root itself sits behind a symlink.
        let users_root = users_root.canonicalize()?;

        Ok(Self { users, users_root })
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users.get(username).map(String::as_str) == Some(password)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn users_root(&self) -> &Path {
        &self.users_root
    }

    pub fn user_root(&self, username: &str) -> PathBuf {
        self.users_root.join(username)
    }
}
