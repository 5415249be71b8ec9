// Optional Backend Capabilities
//
// Every feature beyond open+stat is its own trait. A backend advertises a
// capability by having the corresponding field populated in `Capabilities`;
// handlers probe the field and never assume it is there.

use std::fmt;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use super::DirEntry;

/// File opened through `OpenFileFs` or `CreateFs`
pub trait WritableFile: Read + Write + Seek + Send {
    /// Flush data and metadata to stable storage
    fn sync_all(&self) -> io::Result<()>;
}

impl WritableFile for std::fs::File {
    fn sync_all(&self) -> io::Result<()> {
        std::fs::File::sync_all(self)
    }
}

/// Flags for `OpenFileFs::open_file`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
}

impl OpenFlags {
    pub const READ_WRITE: OpenFlags = OpenFlags {
        read: true,
        write: true,
        create: false,
        truncate: false,
        append: false,
    };
}

pub trait ReadDirFs: Send + Sync {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>>;
}

pub trait MkdirAllFs: Send + Sync {
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()>;
}

pub trait CreateFs: Send + Sync {
    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>>;
}

pub trait OpenFileFs: Send + Sync {
    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<Box<dyn WritableFile>>;
}

pub trait ChmodFs: Send + Sync {
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()>;
}

pub trait ChownFs: Send + Sync {
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;

    /// Like `chown` but does not follow a trailing symlink
    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()>;
}

pub trait ChtimesFs: Send + Sync {
    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> io::Result<()>;
}

pub trait ReadlinkFs: Send + Sync {
    fn readlink(&self, path: &Path) -> io::Result<PathBuf>;
}

pub trait SymlinkFs: Send + Sync {
    /// Create `link` pointing at `target`; `target` is stored verbatim
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;
}

pub trait RemoveFs: Send + Sync {
    /// Remove a file or an empty directory
    fn remove(&self, path: &Path) -> io::Result<()>;
}

pub trait RemoveAllFs: Send + Sync {
    fn remove_all(&self, path: &Path) -> io::Result<()>;
}

pub trait RenameFs: Send + Sync {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Generic write capability
///
/// Its presence is what marks a backend as writable as a whole.
pub trait WriteFileFs: Send + Sync {
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()>;
}

/// Optional capabilities of a backend, fixed at construction
#[derive(Clone, Default)]
pub struct Capabilities {
    pub read_dir: Option<Arc<dyn ReadDirFs>>,
    pub mkdir_all: Option<Arc<dyn MkdirAllFs>>,
    pub create: Option<Arc<dyn CreateFs>>,
    pub open_file: Option<Arc<dyn OpenFileFs>>,
    pub chmod: Option<Arc<dyn ChmodFs>>,
    pub chown: Option<Arc<dyn ChownFs>>,
    pub chtimes: Option<Arc<dyn ChtimesFs>>,
    pub readlink: Option<Arc<dyn ReadlinkFs>>,
    pub symlink: Option<Arc<dyn SymlinkFs>>,
    pub remove: Option<Arc<dyn RemoveFs>>,
    pub remove_all: Option<Arc<dyn RemoveAllFs>>,
    pub rename: Option<Arc<dyn RenameFs>>,
    pub write_file: Option<Arc<dyn WriteFileFs>>,
}

impl Capabilities {
    /// Names of the capabilities that are present
    pub fn names(&self) -> Vec<&'static str> {
        let probes = [
            ("read_dir", self.read_dir.is_some()),
            ("mkdir_all", self.mkdir_all.is_some()),
            ("create", self.create.is_some()),
            ("open_file", self.open_file.is_some()),
            ("chmod", self.chmod.is_some()),
            ("chown", self.chown.is_some()),
            ("chtimes", self.chtimes.is_some()),
            ("readlink", self.readlink.is_some()),
            ("symlink", self.symlink.is_some()),
            ("remove", self.remove.is_some()),
            ("remove_all", self.remove_all.is_some()),
            ("rename", self.rename.is_some()),
            ("write_file", self.write_file.is_some()),
        ];
        probes
            .into_iter()
            .filter_map(|(name, present)| present.then_some(name))
            .collect()
    }
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
