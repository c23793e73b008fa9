//! `KEY=VALUE` secrets file under the global config directory.
//!
//! Edits keep comments and unrelated lines intact. Values from the process
//! environment always win over the file when resolving API keys.

use crate::config::global_config_dir;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

const SECRETS_FILE_NAME: &str = "secrets";

/// Secrets file bound to one path.
#[derive(Debug, Clone)]
pub struct SecretsStore {
    path: PathBuf,
}

impl SecretsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at `<config dir>/codemate/secrets`, if a config dir exists.
    pub fn default_location() -> Option<Self> {
        global_config_dir().map(|dir| Self::new(dir.join(SECRETS_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse the file. A missing file yields an empty map.
    pub fn load(&self) -> io::Result<BTreeMap<String, String>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e),
        };
        let mut secrets = BTreeMap::new();
        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            match trimmed.split_once('=') {
                Some((key, value)) => {
                    secrets.insert(key.trim().to_string(), value.to_string());
                }
                None => warn!(path = %self.path.display(), "ignoring malformed secrets line"),
            }
        }
        Ok(secrets)
    }

    /// Set `key`, replacing its line in place or appending a new one.
    pub fn add(&self, key: &str, value: &str) -> io::Result<()> {
        validate_key(key)?;
        let prefix = format!("{key}=");
        let mut replaced = false;
        let mut lines: Vec<String> = self
            .read_lines()?
            .into_iter()
            .map(|line| {
                if line.starts_with(&prefix) {
                    replaced = true;
                    format!("{key}={value}")
                } else {
                    line
                }
            })
            .collect();
        if !replaced {
            lines.push(format!("{key}={value}"));
        }
        self.write_lines(&lines)
    }

    /// Drop the line for `key`. Returns whether it was present.
    pub fn remove(&self, key: &str) -> io::Result<bool> {
        let prefix = format!("{key}=");
        let lines = self.read_lines()?;
        let before = lines.len();
        let kept: Vec<String> = lines.into_iter().filter(|l| !l.starts_with(&prefix)).collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.write_lines(&kept)?;
        Ok(true)
    }

    /// Truncate the file, comments included.
    pub fn clear(&self) -> io::Result<()> {
        self.ensure_parent()?;
        fs::write(&self.path, "")
    }

    fn read_lines(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(text) => Ok(text.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn write_lines(&self, lines: &[String]) -> io::Result<()> {
        self.ensure_parent()?;
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        fs::write(&self.path, text)
    }

    fn ensure_parent(&self) -> io::Result<()> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => fs::create_dir_all(parent),
            None => Ok(()),
        }
    }
}

fn validate_key(key: &str) -> io::Result<()> {
    if key.is_empty() || key.contains(['=', '\n']) || key.trim() != key {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid secret key {key:?}"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport::TestTempDir;

    fn store(dir: &TestTempDir) -> SecretsStore {
        SecretsStore::new(dir.child("nested/secrets"))
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = TestTempDir::new("secrets");
        assert!(store(&dir).load().unwrap().is_empty());
    }

    // Verifies in-place replacement keeps comments and ordering.
    #[test]
    fn add_replaces_in_place_and_keeps_comments() {
        let dir = TestTempDir::new("secrets");
        let path = dir.write_text("nested/secrets", "# keys\nA=1\nB=2\n");
        let store = SecretsStore::new(&path);
        store.add("A", "updated").unwrap();
        store.add("C", "3").unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "# keys\nA=updated\nB=2\nC=3\n"
        );
        let loaded = store.load().unwrap();
        assert_eq!(loaded.get("A").map(String::as_str), Some("updated"));
        assert_eq!(loaded.len(), 3);
    }

    #[test]
    fn values_may_contain_equals() {
        let dir = TestTempDir::new("secrets");
        let store = store(&dir);
        store.add("TOKEN", "a=b=c").unwrap();
        assert_eq!(store.load().unwrap()["TOKEN"], "a=b=c");
    }

    #[test]
    fn remove_and_clear() {
        let dir = TestTempDir::new("secrets");
        let store = store(&dir);
        store.add("A", "1").unwrap();
        store.add("AB", "2").unwrap();
        assert!(store.remove("A").unwrap());
        assert!(!store.remove("A").unwrap());
        assert_eq!(store.load().unwrap().keys().collect::<Vec<_>>(), vec!["AB"]);
        store.clear().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn malformed_keys_are_rejected() {
        let dir = TestTempDir::new("secrets");
        assert!(store(&dir).add("A=B", "x").is_err());
        assert!(store(&dir).add("", "x").is_err());
    }
}
