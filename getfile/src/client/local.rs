use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::Error;

/// Generates unique local file paths for downloaded request paths.
///
/// A request path `/dir/file.txt` is stored as `<root>/dir/file.txt-NNNNNN`, where `NNNNNN` comes from a process-wide
/// counter, so that downloading the same path again (from any worker) never overwrites a previous download.
#[derive(Debug, Clone)]
pub struct LocalPathAllocator {
    root: PathBuf,
}

impl LocalPathAllocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a new local path for `request_path`.
    ///
    /// Only the normal components of the request path are kept, so the result always lies below the root directory.
    pub fn allocate(&self, request_path: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut name = Path::new(request_path)
            .components()
            .filter(|component| matches!(component, Component::Normal(_)))
            .collect::<PathBuf>()
            .into_os_string();
        name.push(format!("-{id:06}"));

        self.root.join(name)
    }

    /// Create `local_path` for writing, along with any missing parent directory.
    pub fn create(&self, local_path: &Path) -> Result<File, Error> {
        if let Some(parent) = local_path.parent() {
            // already existing directories, possibly created concurrently by another worker, are fine
            fs::create_dir_all(parent).map_err(|source| Error::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        File::create(local_path).map_err(|source| Error::CreateFile {
            path: local_path.to_path_buf(),
            source,
        })
    }
}

impl Default for LocalPathAllocator {
    fn default() -> Self {
        Self::new(".")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn counter_suffix(path: &Path) -> &str {
        let name = path.file_name().unwrap().to_str().unwrap();
        let (_, suffix) = name.rsplit_once('-').unwrap();
        suffix
    }

    #[test]
    fn test_allocate_layout() {
        let allocator = LocalPathAllocator::new("downloads");
        let path = allocator.allocate("/courses/ud923/file.html");

        assert_eq!(allocator.root(), Path::new("downloads"));
        assert!(path.starts_with("downloads/courses/ud923"));

        let suffix = counter_suffix(&path);
        assert_eq!(suffix.len(), 6);
        assert!(suffix.bytes().all(|b| b.is_ascii_digit()));
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with("file.html-"));
    }

    #[test]
    fn test_allocate_counter_increases() {
        let allocator = LocalPathAllocator::default();

        let ids: Vec<u64> = (0..100)
            .map(|_| counter_suffix(&allocator.allocate("/a.txt")).parse().unwrap())
            .collect();

        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_allocate_stays_below_root() {
        let allocator = LocalPathAllocator::new("downloads");
        let path = allocator.allocate("/../../etc/passwd");

        assert!(path.starts_with("downloads/etc"));
        assert!(!path.components().any(|component| component == Component::ParentDir));
    }

    #[test]
    fn test_allocate_is_unique_across_threads() {
        let allocator = Arc::new(LocalPathAllocator::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let allocator = Arc::clone(&allocator);
                thread::spawn(move || (0..500).map(|_| allocator.allocate("/same.txt")).collect::<Vec<_>>())
            })
            .collect();

        let paths: HashSet<_> = handles.into_iter().flat_map(|handle| handle.join().unwrap()).collect();

        assert_eq!(paths.len(), 8 * 500);
    }

    #[test]
    fn test_create_with_parents() {
        let dir = tempfile::tempdir().unwrap();
        let allocator = LocalPathAllocator::new(dir.path());

        let path = allocator.allocate("/a/b/c.txt");
        allocator.create(&path).unwrap();
        // sibling in the same, now existing, directory
        let sibling = allocator.allocate("/a/b/d.txt");
        allocator.create(&sibling).unwrap();

        assert!(path.is_file());
        assert!(sibling.is_file());
    }

    #[test]
    fn test_create_fails_on_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a"), "not a directory").unwrap();
        let allocator = LocalPathAllocator::new(dir.path());

        let path = allocator.allocate("/a/b.txt");

        assert!(matches!(allocator.create(&path), Err(Error::CreateDir { .. })));
    }
}
