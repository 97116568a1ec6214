use std::path::Path;

use parking_lot::Mutex;

use super::Error;

/// Maximum length of a request path, in bytes.
pub const MAX_PATH_LEN: usize = 512;

/// Request paths loaded from a workload file, one per non-blank line.
///
/// Iterating over a workload never ends: paths are handed out in file order, starting over once the last one is reached.
#[derive(Debug, Clone)]
pub struct Workload {
    paths: Vec<String>,
    cursor: usize,
}

impl Workload {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| Error::Workload {
            path: path.to_path_buf(),
            source,
        })?;

        let workload = Self::from_iter(content.lines().map(str::trim).filter(|line| !line.is_empty()));

        if workload.is_empty() {
            return Err(Error::EmptyWorkload { path: path.to_path_buf() });
        }

        tracing::debug!("Loaded {} request paths from `{}`", workload.len(), path.display());

        Ok(workload)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Workload {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
            cursor: 0,
        }
    }
}

impl Iterator for Workload {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let path = self.paths.get(self.cursor)?.clone();
        self.cursor = (self.cursor + 1) % self.paths.len();

        Some(path)
    }
}

/// A source of request paths shared by all the download workers.
///
/// The lock is held across both reading the next path and advancing the underlying iterator, so concurrent callers
/// never get the same item twice nor skip one.
#[derive(Debug)]
pub struct PathSource<I> {
    inner: Mutex<I>,
}

impl<I: Iterator<Item = String>> PathSource<I> {
    pub fn new(iter: I) -> Self {
        Self { inner: Mutex::new(iter) }
    }

    /// Next request path, or `None` once the source is exhausted.
    ///
    /// A path longer than [`MAX_PATH_LEN`] is an error, never skipped.
    pub fn next_path(&self) -> Result<Option<String>, Error> {
        let path = self.inner.lock().next();

        match path {
            Some(path) if path.len() > MAX_PATH_LEN => Err(Error::PathTooLong { len: path.len() }),
            path => Ok(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn test_workload_cycles() {
        let workload = Workload::from_iter(["/a.txt", "/b.bin", "/missing"]);

        assert_eq!(
            workload.take(7).collect::<Vec<_>>(),
            ["/a.txt", "/b.bin", "/missing", "/a.txt", "/b.bin", "/missing", "/a.txt"]
        );
    }

    #[test]
    fn test_load_workload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.txt");
        std::fs::write(&path, "/a.txt\n\n  /b.bin  \n").unwrap();

        let workload = Workload::load(&path).unwrap();

        assert_eq!(workload.len(), 2);
        assert_eq!(workload.take(3).collect::<Vec<_>>(), ["/a.txt", "/b.bin", "/a.txt"]);
    }

    #[test]
    fn test_load_empty_workload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.txt");
        std::fs::write(&path, "\n  \n").unwrap();

        assert!(matches!(Workload::load(&path), Err(Error::EmptyWorkload { .. })));
        assert!(matches!(Workload::load(dir.path().join("nope.txt")), Err(Error::Workload { .. })));
    }

    #[test]
    fn test_path_too_long() {
        let source = PathSource::new(["/ok".to_owned(), format!("/{}", "x".repeat(MAX_PATH_LEN))].into_iter());

        assert_eq!(source.next_path().unwrap().as_deref(), Some("/ok"));
        assert!(matches!(source.next_path(), Err(Error::PathTooLong { len: 513 })));
        assert_eq!(source.next_path().unwrap(), None);
    }

    #[test]
    fn test_concurrent_callers_get_distinct_paths() {
        const PATHS: usize = 10_000;

        let source = Arc::new(PathSource::new((0..PATHS).map(|i| format!("/file-{i}"))));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let source = Arc::clone(&source);
                thread::spawn(move || std::iter::from_fn(|| source.next_path().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let paths: Vec<_> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();
        let distinct: HashSet<_> = paths.iter().collect();

        assert_eq!(paths.len(), PATHS);
        assert_eq!(distinct.len(), PATHS);
    }
}
