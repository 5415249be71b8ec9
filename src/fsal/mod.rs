// Filesystem Abstraction Layer (FSAL)
//
// A backend is a mandatory base (`Filesystem`: open for reading + stat) plus
// a set of independently optional capabilities. Handlers probe for the
// capability they need at call time.

pub mod capability;
pub mod handle;
pub mod local;

use anyhow::{Context, Result};
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

use crate::protocol::v3::nfs::{ACCESS3_EXECUTE, ACCESS3_LOOKUP, ACCESS3_READ};

pub use capability::{
    Capabilities, ChmodFs, ChownFs, ChtimesFs, CreateFs, MkdirAllFs, OpenFileFs, OpenFlags,
    ReadDirFs, ReadlinkFs, RemoveAllFs, RemoveFs, RenameFs, SymlinkFs, WritableFile, WriteFileFs,
};
pub use handle::{FileHandle, HandleError, HandleRegistry};
pub use local::LocalFilesystem;

/// File attributes
///
/// A snapshot of one `stat` call. Maps to the NFSv3 fattr3 structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAttributes {
    /// File type
    pub ftype: FileType,
    /// File mode (permissions)
    pub mode: u32,
    /// Number of hard links
    pub nlink: u32,
    /// User ID
    pub uid: u32,
    /// Group ID
    pub gid: u32,
    /// File size in bytes
    pub size: u64,
    /// Disk space used (in bytes)
    pub used: u64,
    /// Device ID (major, minor) for special files
    pub rdev: (u32, u32),
    /// Filesystem ID
    pub fsid: u64,
    /// File ID (inode number)
    pub fileid: u64,
    /// Last access time
    pub atime: FileTime,
    /// Last modification time
    pub mtime: FileTime,
    /// Last status change time
    pub ctime: FileTime,
}

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile = 1,
    Directory = 2,
    BlockDevice = 3,
    CharDevice = 4,
    SymbolicLink = 5,
    Socket = 6,
    NamedPipe = 7,
}

/// File time (seconds, nanoseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileTime {
    pub seconds: u64,
    pub nseconds: u32,
}

/// Directory entry
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// File ID (inode number)
    pub fileid: u64,
    /// Entry name
    pub name: String,
    /// File type
    pub file_type: FileType,
}

/// File opened for reading through the base trait
pub trait ReadFile: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadFile for T {}

/// Base filesystem trait
///
/// Every backend implements this. Paths are relative to the backend root;
/// the empty path is the root itself.
pub trait Filesystem: Send + Sync {
    /// Open a path for reading
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>>;

    /// Get attributes without following a trailing symlink
    fn stat(&self, path: &Path) -> io::Result<FileAttributes>;
}

static NEXT_BACKEND_ID: AtomicU64 = AtomicU64::new(1);

/// A storage backend as seen by the protocol engine
pub struct Backend {
    id: u64,
    name: String,
    fs: Arc<dyn Filesystem>,
    caps: Capabilities,
}

impl Backend {
    /// Start building a backend around its mandatory base
    pub fn builder(name: impl Into<String>, fs: Arc<dyn Filesystem>) -> BackendBuilder {
        BackendBuilder {
            name: name.into(),
            fs,
            caps: Capabilities::default(),
        }
    }

    /// Process-unique identity, used to tell backends apart
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>> {
        self.fs.open(path)
    }

    pub fn stat(&self, path: &Path) -> io::Result<FileAttributes> {
        self.fs.stat(path)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    /// Whether the backend as a whole accepts writes
    pub fn is_writable(&self) -> bool {
        self.caps.write_file.is_some()
    }

    /// Reduce an ACCESS mask to what this backend can honour
    ///
    /// Without the generic write capability only READ, LOOKUP and EXECUTE
    /// survive, whatever the per-file permission bits say.
    pub fn access_mask(&self, requested: u32) -> u32 {
        if self.is_writable() {
            requested
        } else {
            requested & (ACCESS3_READ | ACCESS3_LOOKUP | ACCESS3_EXECUTE)
        }
    }

    /// Whether two backend references point at the same backend
    pub fn same_as(&self, other: &Backend) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capabilities", &self.caps)
            .finish()
    }
}

/// Populates a backend's capabilities at construction time
pub struct BackendBuilder {
    name: String,
    fs: Arc<dyn Filesystem>,
    caps: Capabilities,
}

impl BackendBuilder {
    pub fn with_read_dir(mut self, cap: Arc<dyn ReadDirFs>) -> Self {
        self.caps.read_dir = Some(cap);
        self
    }

    pub fn with_mkdir_all(mut self, cap: Arc<dyn MkdirAllFs>) -> Self {
        self.caps.mkdir_all = Some(cap);
        self
    }

    pub fn with_create(mut self, cap: Arc<dyn CreateFs>) -> Self {
        self.caps.create = Some(cap);
        self
    }

    pub fn with_open_file(mut self, cap: Arc<dyn OpenFileFs>) -> Self {
        self.caps.open_file = Some(cap);
        self
    }

    pub fn with_chmod(mut self, cap: Arc<dyn ChmodFs>) -> Self {
        self.caps.chmod = Some(cap);
        self
    }

    pub fn with_chown(mut self, cap: Arc<dyn ChownFs>) -> Self {
        self.caps.chown = Some(cap);
        self
    }

    pub fn with_chtimes(mut self, cap: Arc<dyn ChtimesFs>) -> Self {
        self.caps.chtimes = Some(cap);
        self
    }

    pub fn with_readlink(mut self, cap: Arc<dyn ReadlinkFs>) -> Self {
        self.caps.readlink = Some(cap);
        self
    }

    pub fn with_symlink(mut self, cap: Arc<dyn SymlinkFs>) -> Self {
        self.caps.symlink = Some(cap);
        self
    }

    pub fn with_remove(mut self, cap: Arc<dyn RemoveFs>) -> Self {
        self.caps.remove = Some(cap);
        self
    }

    pub fn with_remove_all(mut self, cap: Arc<dyn RemoveAllFs>) -> Self {
        self.caps.remove_all = Some(cap);
        self
    }

    pub fn with_rename(mut self, cap: Arc<dyn RenameFs>) -> Self {
        self.caps.rename = Some(cap);
        self
    }

    pub fn with_write_file(mut self, cap: Arc<dyn WriteFileFs>) -> Self {
        self.caps.write_file = Some(cap);
        self
    }

    pub fn build(self) -> Arc<Backend> {
        Arc::new(Backend {
            id: NEXT_BACKEND_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            fs: self.fs,
            caps: self.caps,
        })
    }
}

/// Configuration for one exported directory
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Root directory of the export
    pub root: PathBuf,
    /// Expose only the read-side capabilities
    pub read_only: bool,
}

impl BackendConfig {
    /// Create a local filesystem backend configuration
    pub fn local<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Create the backend described by this configuration
    pub fn create_backend(&self) -> Result<Arc<Backend>> {
        let fs = Arc::new(
            LocalFilesystem::new(&self.root)
                .with_context(|| format!("Failed to open export {:?}", self.root))?,
        );
        let name = fs.root_path().display().to_string();

        let mut builder = Backend::builder(name, fs.clone())
            .with_read_dir(fs.clone())
            .with_readlink(fs.clone());

        if !self.read_only {
            builder = builder
                .with_mkdir_all(fs.clone())
                .with_create(fs.clone())
                .with_open_file(fs.clone())
                .with_chmod(fs.clone())
                .with_chown(fs.clone())
                .with_chtimes(fs.clone())
                .with_symlink(fs.clone())
                .with_remove(fs.clone())
                .with_remove_all(fs.clone())
                .with_rename(fs.clone())
                .with_write_file(fs);
        }

        let backend = builder.build();
        info!(
            "Backend {} ({}): capabilities {:?}",
            backend.id(),
            backend.name(),
            backend.capabilities()
        );
        Ok(backend)
    }
}
