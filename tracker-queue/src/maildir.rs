use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tracker_common::internal;
use ulid::Ulid;

use crate::error::QueueError;

/// A maildir style queue directory.
///
/// Messages are written to `tmp/` and renamed into `new/`, so anything in
/// `new/` is complete. Messages that failed for good end up in `failed/`
/// (rejected) or `broken/` (gave up retrying). Names starting with a dot are
/// never considered messages.
#[derive(Debug, Clone)]
pub struct Maildir {
    root: PathBuf,
}

impl Maildir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tmp(&self) -> PathBuf {
        self.root.join("tmp")
    }

    pub fn new_dir(&self) -> PathBuf {
        self.root.join("new")
    }

    pub fn cur(&self) -> PathBuf {
        self.root.join("cur")
    }

    pub fn failed(&self) -> PathBuf {
        self.root.join("failed")
    }

    pub fn broken(&self) -> PathBuf {
        self.root.join("broken")
    }

    /// Create every subdirectory.
    ///
    /// # Errors
    /// If a directory cannot be created, or the root exists but is not a
    /// directory.
    pub fn init(&self) -> Result<(), QueueError> {
        if self.root.try_exists()? && !self.root.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("Expected {} to be a directory", self.root.display()),
            )
            .into());
        }

        for dir in [self.tmp(), self.new_dir(), self.cur(), self.failed(), self.broken()] {
            fs::create_dir_all(&dir)?;
        }

        internal!(level = DEBUG, "Maildir ready at {}", self.root.display());
        Ok(())
    }

    /// Atomically add a message to `new/`, returning its path.
    ///
    /// # Errors
    /// If the message cannot be written or renamed.
    pub fn deliver(&self, data: &[u8]) -> Result<PathBuf, QueueError> {
        let name = Ulid::new().to_string();
        let staged = self.tmp().join(&name);
        let target = self.new_dir().join(&name);

        fs::write(&staged, data)?;
        fs::rename(&staged, &target)?;

        internal!(level = DEBUG, "Delivered {name} into {}", self.new_dir().display());
        Ok(target)
    }

    /// Messages in `new/`, ordered by name.
    ///
    /// # Errors
    /// If `new/` cannot be read.
    pub fn list_new(&self) -> Result<Vec<(String, PathBuf)>, QueueError> {
        let mut found = Vec::new();

        for entry in fs::read_dir(self.new_dir())? {
            let entry = entry?;
            let Some(name) = message_name(&entry.path()) else {
                continue;
            };
            if entry.file_type()?.is_file() {
                found.push((name, entry.path()));
            }
        }

        found.sort();
        Ok(found)
    }

    /// Whether `path` names a message directly inside `new/`.
    pub fn is_new_message(&self, path: &Path) -> bool {
        path.parent() == Some(self.new_dir().as_path()) && message_name(path).is_some()
    }

    /// # Errors
    /// If the file cannot be renamed.
    pub fn move_to_failed(&self, path: &Path) -> Result<PathBuf, QueueError> {
        Self::move_into(path, &self.failed())
    }

    /// # Errors
    /// If the file cannot be renamed.
    pub fn move_to_broken(&self, path: &Path) -> Result<PathBuf, QueueError> {
        Self::move_into(path, &self.broken())
    }

    /// Remove a processed message. A file that is already gone is fine.
    ///
    /// # Errors
    /// If the file exists but cannot be removed.
    pub fn remove(path: &Path) -> Result<(), QueueError> {
        match fs::remove_file(path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn move_into(path: &Path, dir: &Path) -> Result<PathBuf, QueueError> {
        let name = path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} has no file name", path.display()),
            )
        })?;
        let target = dir.join(name);

        fs::rename(path, &target)?;
        Ok(target)
    }
}

/// File name of `path` if it may be a message.
fn message_name(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    (!name.starts_with('.')).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn deliver_lands_in_new() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::new(dir.path());
        maildir.init().unwrap();

        let first = maildir.deliver(b"first").unwrap();
        let second = maildir.deliver(b"second").unwrap();
        fs::write(maildir.new_dir().join(".hidden"), b"ignored").unwrap();

        let listed: Vec<_> = maildir
            .list_new()
            .unwrap()
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first));
        assert!(listed.contains(&second));
        assert_eq!(fs::read(&first).unwrap(), b"first");
        assert_eq!(fs::read_dir(maildir.tmp()).unwrap().count(), 0);
        assert!(maildir.is_new_message(&first));
        assert!(!maildir.is_new_message(&maildir.new_dir().join(".hidden")));
    }

    #[test]
    fn moves_keep_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let maildir = Maildir::new(dir.path());
        maildir.init().unwrap();

        let path = maildir.deliver(b"x").unwrap();
        let moved = maildir.move_to_broken(&path).unwrap();

        assert_eq!(moved.file_name(), path.file_name());
        assert!(!path.exists());
        assert!(moved.starts_with(maildir.broken()));

        Maildir::remove(&path).unwrap();
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"").unwrap();

        assert!(Maildir::new(&file).init().is_err());
    }
}
