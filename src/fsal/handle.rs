// File Handle Registry
//
// File handles are opaque identifiers used by NFS to reference files and
// directories. The registry maps handles to (backend, path) pairs, keeps the
// reverse mapping for deduplication, and bounds its size with an LRU. Export
// roots are pinned outside the LRU and live as long as the registry.

use lru::LruCache;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::io;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

use super::Backend;

/// File handle type (opaque bytes)
pub type FileHandle = Vec<u8>;

/// Length of every handle this registry issues
pub const HANDLE_LEN: usize = 32;

/// Why a handle could not be resolved
#[derive(Debug, Error)]
pub enum HandleError {
    #[error("unknown file handle")]
    Unknown,
    #[error("file handle target {0:?} no longer exists")]
    Gone(PathBuf),
}

#[derive(Clone)]
struct Entry {
    backend: Arc<Backend>,
    path: PathBuf,
}

struct Inner {
    handles: LruCache<FileHandle, Entry>,
    roots: HashMap<FileHandle, Entry>,
    paths: HashMap<(u64, PathBuf), FileHandle>,
    next_id: u64,
}

impl Inner {
    fn lookup(&mut self, handle: &FileHandle) -> Option<Entry> {
        match self.roots.get(handle) {
            Some(entry) => Some(entry.clone()),
            None => self.handles.get(handle).cloned(),
        }
    }


    fn forget(&mut self, handle: &FileHandle) {
        if let Some(entry) = self.handles.pop(handle) {
            self.paths.remove(&(entry.backend.id(), entry.path));
        }
    }
}

/// Bounded, thread-safe handle registry
///
/// Both indexes live behind one mutex so every operation sees them agree.
/// Backend calls are never made while the lock is held.
pub struct HandleRegistry {
    inner: Mutex<Inner>,
    instance: u64,
}

impl HandleRegistry {
    /// Create a registry holding at most `capacity` live handles
    ///
    /// `instance` is embedded into every handle so handles from a previous
    /// server run never collide with fresh ones.
    pub fn new(capacity: usize, instance: u64) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                handles: LruCache::new(capacity),
                roots: HashMap::new(),
                paths: HashMap::new(),
                next_id: 1,
            }),
            instance,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the handle for a path, allocating one if needed
    ///
    /// Issuing the same (backend, path) twice yields the same handle as long
    /// as it has not been evicted. A new handle may evict the least recently
    /// used one.
    pub fn issue(&self, backend: &Arc<Backend>, path: &Path) -> FileHandle {
        let key = (backend.id(), path.to_path_buf());
        let mut inner = self.lock();

        if let Some(handle) = inner.paths.get(&key).cloned() {
            // Promote
            let _ = inner.handles.get(&handle);
            return handle;
        }

        let handle = self.mint(&mut inner, backend, path);
        let entry = Entry {
            backend: Arc::clone(backend),
            path: key.1.clone(),
        };
        if let Some((evicted, old)) = inner.handles.push(handle.clone(), entry) {
            if evicted != handle {
                inner.paths.remove(&(old.backend.id(), old.path.clone()));
                debug!("Evicted file handle for {:?}", old.path);
            }
        }
        inner.paths.insert(key, handle.clone());

        debug!("Issued file handle for {:?}", path);
        handle
    }

    /// Get the pinned handle for a backend's export root
    ///
    /// Root handles never enter the LRU, so they stay valid for the life of
    /// the registry however many other handles are issued. Once pinned,
    /// `issue` for the root path returns the same handle.
    pub fn pin_root(&self, backend: &Arc<Backend>) -> FileHandle {
        let key = (backend.id(), PathBuf::new());
        let mut inner = self.lock();

        if let Some(handle) = inner.paths.get(&key).cloned() {
            if inner.roots.contains_key(&handle) {
                return handle;
            }
            // Issued earlier as an ordinary handle: move it out of the LRU
            if let Some(entry) = inner.handles.pop(&handle) {
                inner.roots.insert(handle.clone(), entry);
                return handle;
            }
        }

        let handle = self.mint(&mut inner, backend, &key.1);
        let entry = Entry {
            backend: Arc::clone(backend),
            path: PathBuf::new(),
        };
        inner.roots.insert(handle.clone(), entry);
        inner.paths.insert(key, handle.clone());

        debug!("Pinned root handle for backend {}", backend.name());
        handle
    }

    fn mint(&self, inner: &mut Inner, backend: &Backend, path: &Path) -> FileHandle {
        let id = inner.next_id;
        inner.next_id += 1;

        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);

        let mut handle = vec![0u8; HANDLE_LEN];
        handle[0..8].copy_from_slice(&id.to_be_bytes());
        handle[8..16].copy_from_slice(&hasher.finish().to_be_bytes());
        handle[16..24].copy_from_slice(&backend.id().to_be_bytes());
        handle[24..32].copy_from_slice(&self.instance.to_be_bytes());
        handle
    }

    /// Resolve a handle to its backend and path
    ///
    /// The target is checked for existence with a stat. A handle whose target
    /// has disappeared is dropped and reported as gone.
    pub fn resolve(&self, handle: &[u8]) -> Result<(Arc<Backend>, PathBuf), HandleError> {
        let key = handle.to_vec();
        let entry = self.lock().lookup(&key).ok_or(HandleError::Unknown)?;

        match entry.backend.stat(&entry.path) {
            Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
                let mut inner = self.lock();
                // Only drop it if nobody re-pointed the handle meanwhile
                let unchanged = inner
                    .handles
                    .peek(&key)
                    .is_some_and(|current| current.path == entry.path);
                if unchanged {
                    inner.forget(&key);
                }
                debug!("File handle target {:?} is gone", entry.path);
                Err(HandleError::Gone(entry.path))
            }
            // Other stat failures are left to the caller's own checks
            _ => Ok((entry.backend, entry.path)),
        }
    }

    /// Drop the handle for a path and everything below it
    ///
    /// Called after a path was removed or renamed away so its old handle
    /// can never silently follow a different object.
    pub fn invalidate_path(&self, backend: &Backend, path: &Path) {
        let mut inner = self.lock();
        let doomed: Vec<FileHandle> = inner
            .paths
            .iter()
            .filter(|((id, p), _)| *id == backend.id() && p.starts_with(path))
            .map(|(_, handle)| handle.clone())
            .collect();
        for handle in &doomed {
            inner.forget(handle);
        }
        if !doomed.is_empty() {
            debug!("Invalidated {} file handle(s) under {:?}", doomed.len(), path);
        }
    }

    /// Number of live handles in the LRU, pinned roots excluded
    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().handles.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsal::BackendConfig;
    use tempfile::TempDir;

    fn setup(capacity: usize) -> (HandleRegistry, Arc<Backend>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = BackendConfig::local(temp_dir.path()).create_backend().unwrap();
        (HandleRegistry::new(capacity, 0x1122_3344), backend, temp_dir)
    }

    #[test]
    fn test_issue_and_resolve() {
        let (registry, backend, temp_dir) = setup(16);
        std::fs::write(temp_dir.path().join("file.txt"), b"x").unwrap();

        let handle = registry.issue(&backend, Path::new("file.txt"));
        assert_eq!(handle.len(), HANDLE_LEN);
        assert_eq!(&handle[16..24], &backend.id().to_be_bytes());
        assert_eq!(&handle[24..32], &0x1122_3344u64.to_be_bytes());

        let (resolved, path) = registry.resolve(&handle).unwrap();
        assert!(resolved.same_as(&backend));
        assert_eq!(path, PathBuf::from("file.txt"));
    }

    #[test]
    fn test_issue_is_idempotent() {
        let (registry, backend, _temp_dir) = setup(16);

        let a = registry.issue(&backend, Path::new(""));
        let b = registry.issue(&backend, Path::new(""));
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unknown_handle_is_rejected() {
        let (registry, _backend, _temp_dir) = setup(16);
        assert!(matches!(registry.resolve(&[0u8; 32]), Err(HandleError::Unknown)));
        assert!(matches!(registry.resolve(&[]), Err(HandleError::Unknown)));
    }

    #[test]
    fn test_lru_eviction_respects_recency() {
        let (registry, backend, temp_dir) = setup(2);
        for name in ["a", "b", "c"] {
            std::fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let a = registry.issue(&backend, Path::new("a"));
        let b = registry.issue(&backend, Path::new("b"));
        registry.resolve(&a).unwrap();
        let c = registry.issue(&backend, Path::new("c"));

        assert_eq!(registry.len(), 2);
        assert!(matches!(registry.resolve(&b), Err(HandleError::Unknown)));
        assert!(registry.resolve(&a).is_ok());
        assert!(registry.resolve(&c).is_ok());

        // The evicted path gets a fresh handle, not the old one
        let b2 = registry.issue(&backend, Path::new("b"));
        assert_ne!(b, b2);
    }

    #[test]
    fn test_deleted_target_is_stale() {
        let (registry, backend, temp_dir) = setup(16);
        std::fs::write(temp_dir.path().join("gone.txt"), b"").unwrap();

        let handle = registry.issue(&backend, Path::new("gone.txt"));
        std::fs::remove_file(temp_dir.path().join("gone.txt")).unwrap();

        assert!(matches!(registry.resolve(&handle), Err(HandleError::Gone(_))));
        assert!(registry.is_empty());
        assert!(matches!(registry.resolve(&handle), Err(HandleError::Unknown)));
    }

    #[test]
    fn test_invalidate_path_drops_subtree() {
        let (registry, backend, temp_dir) = setup(16);
        std::fs::create_dir(temp_dir.path().join("dir")).unwrap();
        std::fs::write(temp_dir.path().join("dir/inner"), b"").unwrap();
        std::fs::write(temp_dir.path().join("other"), b"").unwrap();

        let dir = registry.issue(&backend, Path::new("dir"));
        let inner = registry.issue(&backend, Path::new("dir/inner"));
        let other = registry.issue(&backend, Path::new("other"));

        registry.invalidate_path(&backend, Path::new("dir"));

        assert!(registry.resolve(&dir).is_err());
        assert!(registry.resolve(&inner).is_err());
        assert!(registry.resolve(&other).is_ok());
    }

    #[test]
    fn test_backends_get_distinct_handles() {
        let (registry, first, _temp_a) = setup(16);
        let temp_b = TempDir::new().unwrap();
        let second = BackendConfig::local(temp_b.path()).create_backend().unwrap();

        let a = registry.issue(&first, Path::new(""));
        let b = registry.issue(&second, Path::new(""));
        assert_ne!(a, b);

        let (resolved, _) = registry.resolve(&b).unwrap();
        assert!(resolved.same_as(&second));
    }

    #[test]
    fn test_pinned_root_survives_eviction() {
        let (registry, backend, temp_dir) = setup(2);
        for name in ["a", "b", "c"] {
            std::fs::write(temp_dir.path().join(name), b"").unwrap();
        }

        let root = registry.pin_root(&backend);
        for name in ["a", "b", "c"] {
            registry.issue(&backend, Path::new(name));
        }

        assert_eq!(registry.len(), 2);
        let (resolved, path) = registry.resolve(&root).unwrap();
        assert!(resolved.same_as(&backend));
        assert_eq!(path, PathBuf::new());

        // Lookups that land on the root hand back the pinned handle
        assert_eq!(registry.issue(&backend, Path::new("")), root);
        assert_eq!(registry.pin_root(&backend), root);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_pin_root_adopts_issued_handle() {
        let (registry, backend, temp_dir) = setup(1);
        std::fs::write(temp_dir.path().join("a"), b"").unwrap();

        let issued = registry.issue(&backend, Path::new(""));
        let root = registry.pin_root(&backend);
        assert_eq!(issued, root);
        assert!(registry.is_empty());

        registry.issue(&backend, Path::new("a"));
        assert!(registry.resolve(&root).is_ok());
    }

    #[test]
    fn test_invalidate_keeps_pinned_root() {
        let (registry, backend, _temp_dir) = setup(4);
        let root = registry.pin_root(&backend);

        registry.invalidate_path(&backend, Path::new(""));
        assert!(registry.resolve(&root).is_ok());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let registry = HandleRegistry::new(0, 1);
        assert_eq!(registry.capacity(), 1);
    }

    #[test]
    fn test_concurrent_issue_agrees() {
        let (registry, backend, _temp_dir) = setup(64);

        let handles: Vec<FileHandle> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| registry.issue(&backend, Path::new("shared"))))
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        assert!(handles.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(registry.len(), 1);
    }
}
