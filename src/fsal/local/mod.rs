// Local Filesystem Backend
//
// Exposes a local directory through the base trait and every capability
// trait. Whether the capabilities are actually offered is decided when the
// Backend is built (see BackendConfig).

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

use super::capability::{
    ChmodFs, ChownFs, ChtimesFs, CreateFs, MkdirAllFs, OpenFileFs, OpenFlags, ReadDirFs,
    ReadlinkFs, RemoveAllFs, RemoveFs, RenameFs, SymlinkFs, WritableFile, WriteFileFs,
};
use super::{DirEntry, FileAttributes, FileTime, FileType, Filesystem, ReadFile};

/// Local filesystem implementation
pub struct LocalFilesystem {
    /// Root directory for exports
    root_path: PathBuf,
}

impl LocalFilesystem {
    /// Create a new local filesystem backend
    ///
    /// # Arguments
    /// * `root_path` - Root directory to export (e.g., "/export")
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let root_path = root_path.as_ref().canonicalize().context(format!(
            "Failed to canonicalize root path: {:?}",
            root_path.as_ref()
        ))?;

        let metadata = fs::metadata(&root_path)
            .context(format!("Failed to stat root path: {:?}", root_path))?;

        if !metadata.is_dir() {
            return Err(anyhow!("Root path is not a directory: {:?}", root_path));
        }

        debug!("LocalFilesystem created with root: {:?}", root_path);

        Ok(Self { root_path })
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Map a backend-relative path onto the host filesystem
    ///
    /// Only plain components are accepted, so a path can never climb out of
    /// the export root lexically (e.g. "../../../etc/passwd").
    fn full_path(&self, path: &Path) -> io::Result<PathBuf> {
        let mut full = self.root_path.clone();
        for component in path.components() {
            match component {
                Component::Normal(name) => full.push(name),
                Component::CurDir => {}
                _ => {
                    warn!("Path traversal attempt: {:?} under {:?}", path, self.root_path);
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("path escapes export root: {:?}", path),
                    ));
                }
            }
        }
        Ok(full)
    }

    /// Convert std::fs::Metadata to FileAttributes
    fn metadata_to_attr(metadata: &fs::Metadata) -> FileAttributes {
        let file_type = metadata.file_type();
        let ftype = if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_symlink() {
            FileType::SymbolicLink
        } else if file_type.is_block_device() {
            FileType::BlockDevice
        } else if file_type.is_char_device() {
            FileType::CharDevice
        } else if file_type.is_socket() {
            FileType::Socket
        } else if file_type.is_fifo() {
            FileType::NamedPipe
        } else {
            FileType::RegularFile
        };

        FileAttributes {
            ftype,
            mode: metadata.permissions().mode(),
            nlink: metadata.nlink() as u32,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.len(),
            used: metadata.blocks() * 512, // st_blocks is in 512-byte units
            rdev: split_rdev(metadata.rdev()),
            fsid: metadata.dev(),
            fileid: metadata.ino(),
            atime: file_time(metadata.atime(), metadata.atime_nsec()),
            mtime: file_time(metadata.mtime(), metadata.mtime_nsec()),
            ctime: file_time(metadata.ctime(), metadata.ctime_nsec()),
        }
    }
}

/// Split a Linux dev_t into (major, minor)
fn split_rdev(rdev: u64) -> (u32, u32) {
    let major = ((rdev >> 8) & 0xfff) | ((rdev >> 32) & !0xfff);
    let minor = (rdev & 0xff) | ((rdev >> 12) & !0xff);
    (major as u32, minor as u32)
}

fn file_time(seconds: i64, nseconds: i64) -> FileTime {
    FileTime {
        seconds: seconds.max(0) as u64,
        nseconds: nseconds.clamp(0, 999_999_999) as u32,
    }
}

impl Filesystem for LocalFilesystem {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadFile>> {
        let full_path = self.full_path(path)?;
        let file = fs::File::open(&full_path)?;
        Ok(Box::new(file))
    }

    fn stat(&self, path: &Path) -> io::Result<FileAttributes> {
        let full_path = self.full_path(path)?;
        let metadata = fs::symlink_metadata(&full_path)?;
        Ok(Self::metadata_to_attr(&metadata))
    }
}

impl ReadDirFs for LocalFilesystem {
    fn read_dir(&self, path: &Path) -> io::Result<Vec<DirEntry>> {
        let dir_path = self.full_path(path)?;

        let mut entries = Vec::new();
        for entry in fs::read_dir(&dir_path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(DirEntry {
                fileid: metadata.ino(),
                name: entry.file_name().to_string_lossy().to_string(),
                file_type: Self::metadata_to_attr(&metadata).ftype,
            });
        }

        debug!("READDIR: {:?} -> {} entries", dir_path, entries.len());
        Ok(entries)
    }
}

impl MkdirAllFs for LocalFilesystem {
    fn mkdir_all(&self, path: &Path, mode: u32) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        fs::DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(&full_path)?;
        debug!("MKDIR: {:?} mode={:o}", full_path, mode);
        Ok(())
    }
}

impl CreateFs for LocalFilesystem {
    fn create(&self, path: &Path) -> io::Result<Box<dyn WritableFile>> {
        let full_path = self.full_path(path)?;
        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)?;
        debug!("CREATE: {:?}", full_path);
        Ok(Box::new(file))
    }
}

impl OpenFileFs for LocalFilesystem {
    fn open_file(&self, path: &Path, flags: OpenFlags, mode: u32) -> io::Result<Box<dyn WritableFile>> {
        let full_path = self.full_path(path)?;
        let file = fs::OpenOptions::new()
            .read(flags.read)
            .write(flags.write)
            .create(flags.create)
            .truncate(flags.truncate)
            .append(flags.append)
            .mode(mode)
            .open(&full_path)?;
        Ok(Box::new(file))
    }
}

impl ChmodFs for LocalFilesystem {
    fn chmod(&self, path: &Path, mode: u32) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        fs::set_permissions(&full_path, fs::Permissions::from_mode(mode))?;
        debug!("CHMOD: {:?} mode={:o}", full_path, mode);
        Ok(())
    }
}

impl ChownFs for LocalFilesystem {
    fn chown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        std::os::unix::fs::chown(&full_path, uid, gid)?;
        debug!("CHOWN: {:?} uid={:?} gid={:?}", full_path, uid, gid);
        Ok(())
    }

    fn lchown(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        std::os::unix::fs::lchown(&full_path, uid, gid)?;
        debug!("LCHOWN: {:?} uid={:?} gid={:?}", full_path, uid, gid);
        Ok(())
    }
}

impl ChtimesFs for LocalFilesystem {
    fn chtimes(&self, path: &Path, atime: SystemTime, mtime: SystemTime) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        let file = fs::File::open(&full_path)?;
        file.set_times(
            fs::FileTimes::new()
                .set_accessed(atime)
                .set_modified(mtime),
        )?;
        debug!("CHTIMES: {:?}", full_path);
        Ok(())
    }
}

impl ReadlinkFs for LocalFilesystem {
    fn readlink(&self, path: &Path) -> io::Result<PathBuf> {
        let full_path = self.full_path(path)?;
        let target = fs::read_link(&full_path)?;
        debug!("READLINK: {:?} -> {:?}", full_path, target);
        Ok(target)
    }
}

impl SymlinkFs for LocalFilesystem {
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        let link_path = self.full_path(link)?;
        std::os::unix::fs::symlink(target, &link_path)?;
        debug!("SYMLINK: {:?} -> {:?}", link_path, target);
        Ok(())
    }
}

impl RemoveFs for LocalFilesystem {
    fn remove(&self, path: &Path) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        if full_path == self.root_path {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove export root",
            ));
        }
        let metadata = fs::symlink_metadata(&full_path)?;
        if metadata.is_dir() {
            fs::remove_dir(&full_path)?;
        } else {
            fs::remove_file(&full_path)?;
        }
        debug!("REMOVE: {:?}", full_path);
        Ok(())
    }
}

impl RemoveAllFs for LocalFilesystem {
    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let full_path = self.full_path(path)?;
        if full_path == self.root_path {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "refusing to remove export root",
            ));
        }
        match fs::symlink_metadata(&full_path) {
            Ok(metadata) if metadata.is_dir() => fs::remove_dir_all(&full_path)?,
            Ok(_) => fs::remove_file(&full_path)?,
            // Nothing to remove
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        }
        debug!("REMOVE_ALL: {:?}", full_path);
        Ok(())
    }
}

impl RenameFs for LocalFilesystem {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let from_full_path = self.full_path(from)?;
        let to_full_path = self.full_path(to)?;
        fs::rename(&from_full_path, &to_full_path)?;
        debug!("RENAME: {:?} -> {:?}", from_full_path, to_full_path);
        Ok(())
    }
}

impl WriteFileFs for LocalFilesystem {
    fn write_file(&self, path: &Path, data: &[u8], mode: u32) -> io::Result<()> {
        use std::io::Write;

        let full_path = self.full_path(path)?;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&full_path)?;
        file.write_all(data)?;
        debug!("WRITE_FILE: {:?} {} bytes", full_path, data.len());
        Ok(())
    }
}
