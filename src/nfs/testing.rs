// Shared fixtures for procedure handler tests

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use xdr_codec::Pack;

use super::NfsContext;
use crate::fsal::{Backend, BackendConfig, FileHandle, HandleRegistry, LocalFilesystem};

pub const INSTANCE_ID: u64 = 0x0102_0304_0506_0708;

/// A scratch export with its backend and a handler context
pub struct Fixture {
    pub temp_dir: TempDir,
    pub backend: Arc<Backend>,
    pub ctx: NfsContext,
}

impl Fixture {
    pub fn new() -> Self {
        Self::configured(false)
    }

    pub fn read_only() -> Self {
        Self::configured(true)
    }

    fn configured(read_only: bool) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let backend = BackendConfig::local(temp_dir.path())
            .read_only(read_only)
            .create_backend()
            .unwrap();
        Self::with_backend(temp_dir, backend)
    }

    /// Writable backend offering nothing but the generic write capability
    pub fn write_only() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let fs = Arc::new(LocalFilesystem::new(temp_dir.path()).unwrap());
        let backend = Backend::builder("write-only", fs.clone())
            .with_write_file(fs)
            .build();
        Self::with_backend(temp_dir, backend)
    }

    pub fn with_backend(temp_dir: TempDir, backend: Arc<Backend>) -> Self {
        let handles = Arc::new(HandleRegistry::new(64, INSTANCE_ID));
        handles.pin_root(&backend);
        Self {
            temp_dir,
            backend,
            ctx: NfsContext::new(handles, INSTANCE_ID),
        }
    }

    pub fn handle(&self, rel: &str) -> FileHandle {
        self.ctx.handles.issue(&self.backend, Path::new(rel))
    }

    pub fn path(&self, rel: impl AsRef<Path>) -> PathBuf {
        self.temp_dir.path().join(rel)
    }
}

pub fn pack<T: Pack<Vec<u8>>>(args: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    args.pack(&mut buf).unwrap();
    buf
}

/// Cursor over an encoded result body
pub struct ReplyReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ReplyReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn u32(&mut self) -> u32 {
        let bytes: [u8; 4] = self.buf[self.pos..self.pos + 4].try_into().unwrap();
        self.pos += 4;
        u32::from_be_bytes(bytes)
    }

    pub fn u64(&mut self) -> u64 {
        let bytes: [u8; 8] = self.buf[self.pos..self.pos + 8].try_into().unwrap();
        self.pos += 8;
        u64::from_be_bytes(bytes)
    }

    pub fn bytes(&mut self, n: usize) -> &'a [u8] {
        let buf = self.buf;
        let slice = &buf[self.pos..self.pos + n];
        self.pos += n;
        slice
    }

    /// Variable-length opaque, padding included
    pub fn opaque(&mut self) -> &'a [u8] {
        let len = self.u32() as usize;
        let data = self.bytes(len);
        self.pos += (4 - len % 4) % 4;
        data
    }

    /// fattr3, returning (type, size)
    pub fn fattr3(&mut self) -> (u32, u64) {
        let ftype = self.u32();
        self.pos += 16; // mode, nlink, uid, gid
        let size = self.u64();
        self.pos += 84 - 28;
        (ftype, size)
    }

    /// post_op_attr, returning the size when attributes follow
    pub fn post_op_attr(&mut self) -> Option<u64> {
        (self.u32() == 1).then(|| self.fattr3().1)
    }

    /// wcc_data, returning (pre size, post size)
    pub fn wcc(&mut self) -> (Option<u64>, Option<u64>) {
        let before = (self.u32() == 1).then(|| {
            let size = self.u64();
            self.pos += 16; // mtime, ctime
            size
        });
        (before, self.post_op_attr())
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
