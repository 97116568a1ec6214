use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read content map `{}`: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed content map entry at line {line}: {entry:?}")]
    Malformed { line: usize, entry: String },
}

/// Content resolver interface, mapping a requested path to the local file serving it.
pub trait ContentResolver: Send + Sync + 'static {
    /// Open the file behind `path`, or `None` when there is nothing to serve for it.
    fn resolve(&self, path: &str) -> Option<File>;
}

/// A static request path to local file mapping, usually loaded from a content mapping file.
///
/// A content mapping file holds one `<request path> <local file>` entry per line, blank lines and `#` comments aside:
///
/// ```text
///     # request path         local file
///     /courses/intro.html    files/intro.html
///     /img/logo.png          /srv/static/logo.png
/// ```
///
/// Relative local files are taken relative to the directory of the mapping file.
#[derive(Debug, Default, Clone)]
pub struct ContentMap {
    entries: HashMap<String, PathBuf>,
}

impl ContentMap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut map = Self::parse(&content)?;

        if let Some(base) = path.parent() {
            for file in map.entries.values_mut() {
                if file.is_relative() {
                    *file = base.join(&*file);
                }
            }
        }

        tracing::debug!("Loaded {} content entries from `{}`", map.len(), path.display());

        Ok(map)
    }

    /// Parse the content of a mapping file, leaving local file paths untouched.
    pub fn parse(content: &str) -> Result<Self, Error> {
        let mut entries = HashMap::new();

        for (i, line) in content.lines().enumerate() {
            let entry = line.trim();

            if entry.is_empty() || entry.starts_with('#') {
                continue;
            }

            match entry.split_once(char::is_whitespace) {
                Some((key, file)) if !file.trim().is_empty() => {
                    entries.insert(key.to_owned(), PathBuf::from(file.trim()));
                }
                _ => {
                    return Err(Error::Malformed {
                        line: i + 1,
                        entry: entry.to_owned(),
                    })
                }
            }
        }

        Ok(Self { entries })
    }

    #[inline]
    pub fn insert(&mut self, key: impl Into<String>, file: impl Into<PathBuf>) {
        self.entries.insert(key.into(), file.into());
    }

    #[inline]
    pub fn get(&self, key: &str) -> Option<&Path> {
        self.entries.get(key).map(PathBuf::as_path)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, P: Into<PathBuf>> FromIterator<(K, P)> for ContentMap {
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(key, file)| (key.into(), file.into())).collect(),
        }
    }
}

impl ContentResolver for ContentMap {
    fn resolve(&self, path: &str) -> Option<File> {
        let file = self.get(path)?;

        File::open(file)
            .inspect_err(|err| tracing::warn!("Cannot open `{}` mapped by {path}: {err}", file.display()))
            .ok()
    }
}
