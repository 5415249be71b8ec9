// NFS Protocol Middleware
//
// NFSv3 wire types (RFC 1813) and serialization helpers. Only the types the
// implemented procedures need are modelled here.

#![allow(non_camel_case_types)]

use bytes::BytesMut;
use std::ffi::OsStr;
use std::fmt;
use std::io::{Cursor, Read, Write};
use std::os::unix::ffi::OsStrExt;
use xdr_codec::{Pack, Unpack};

use crate::fsal;
use crate::protocol::XdrResult;

/// NFS program number
pub const NFS_PROGRAM: u32 = 100003;

/// NFS protocol version served
pub const NFS_V3: u32 = 3;

/// Maximum size of an NFSv3 file handle
pub const NFS3_FHSIZE: usize = 64;

/// Size of the write verifier returned by WRITE
pub const NFS3_WRITEVERFSIZE: usize = 8;

// Access mode bits (RFC 1813 section 3.3.4)
pub const ACCESS3_READ: u32 = 0x0001;
pub const ACCESS3_LOOKUP: u32 = 0x0002;
pub const ACCESS3_MODIFY: u32 = 0x0004;
pub const ACCESS3_EXTEND: u32 = 0x0008;
pub const ACCESS3_DELETE: u32 = 0x0010;
pub const ACCESS3_EXECUTE: u32 = 0x0020;

/// NFSv3 status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum nfsstat3 {
    NFS3_OK = 0,
    NFS3ERR_PERM = 1,
    NFS3ERR_NOENT = 2,
    NFS3ERR_IO = 5,
    NFS3ERR_NXIO = 6,
    NFS3ERR_ACCES = 13,
    NFS3ERR_EXIST = 17,
    NFS3ERR_XDEV = 18,
    NFS3ERR_NODEV = 19,
    NFS3ERR_NOTDIR = 20,
    NFS3ERR_ISDIR = 21,
    NFS3ERR_INVAL = 22,
    NFS3ERR_FBIG = 27,
    NFS3ERR_NOSPC = 28,
    NFS3ERR_ROFS = 30,
    NFS3ERR_MLINK = 31,
    NFS3ERR_NAMETOOLONG = 63,
    NFS3ERR_NOTEMPTY = 66,
    NFS3ERR_DQUOT = 69,
    NFS3ERR_STALE = 70,
    NFS3ERR_REMOTE = 71,
    NFS3ERR_BADHANDLE = 10001,
    NFS3ERR_NOT_SYNC = 10002,
    NFS3ERR_BAD_COOKIE = 10003,
    NFS3ERR_NOTSUPP = 10004,
    NFS3ERR_TOOSMALL = 10005,
    NFS3ERR_SERVERFAULT = 10006,
    NFS3ERR_BADTYPE = 10007,
    NFS3ERR_JUKEBOX = 10008,
}

impl fmt::Display for nfsstat3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, *self as u32)
    }
}

impl<Out: Write> Pack<Out> for nfsstat3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        (*self as u32).pack(out)
    }
}

/// File type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ftype3 {
    NF3REG = 1,
    NF3DIR = 2,
    NF3BLK = 3,
    NF3CHR = 4,
    NF3LNK = 5,
    NF3SOCK = 6,
    NF3FIFO = 7,
}

/// Durability requested for (and reported by) WRITE
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum stable_how {
    UNSTABLE = 0,
    DATA_SYNC = 1,
    FILE_SYNC = 2,
}

impl TryFrom<u32> for stable_how {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(stable_how::UNSTABLE),
            1 => Ok(stable_how::DATA_SYNC),
            2 => Ok(stable_how::FILE_SYNC),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct nfstime3 {
    pub seconds: u32,
    pub nseconds: u32,
}

/// Full file attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct fattr3 {
    pub type_: ftype3,
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub used: u64,
    pub rdev: u64,
    pub fsid: u64,
    pub fileid: u64,
    pub atime: nfstime3,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}

/// Subset of attributes carried as pre-operation WCC data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct wcc_attr {
    pub size: u64,
    pub mtime: nfstime3,
    pub ctime: nfstime3,
}

/// Weak cache consistency data: pre_op_attr + post_op_attr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct wcc_data {
    pub before: Option<wcc_attr>,
    pub after: Option<fattr3>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct fhandle3(pub Vec<u8>);

/// A directory entry name: raw bytes, not necessarily UTF-8
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct filename3(pub Vec<u8>);

impl filename3 {
    pub fn as_os_str(&self) -> &OsStr {
        OsStr::from_bytes(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct diropargs3 {
    pub dir: fhandle3,
    pub name: filename3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GETATTR3args {
    pub object: fhandle3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LOOKUP3args {
    pub what: diropargs3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ACCESS3args {
    pub object: fhandle3,
    pub access: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct READLINK3args {
    pub symlink: fhandle3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct READ3args {
    pub file: fhandle3,
    pub offset: u64,
    pub count: u32,
}

/// WRITE arguments
///
/// `stable` is kept as the raw discriminant so an unknown level can be
/// reported as NFS3ERR_INVAL instead of failing the whole decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WRITE3args {
    pub file: fhandle3,
    pub offset: u64,
    pub count: u32,
    pub stable: u32,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct REMOVE3args {
    pub object: diropargs3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RENAME3args {
    pub from: diropargs3,
    pub to: diropargs3,
}

// ===== XDR encoding =====

impl<Out: Write> Pack<Out> for nfstime3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.seconds.pack(out)? + self.nseconds.pack(out)?)
    }
}

impl<Out: Write> Pack<Out> for fattr3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok((self.type_ as u32).pack(out)?
            + self.mode.pack(out)?
            + self.nlink.pack(out)?
            + self.uid.pack(out)?
            + self.gid.pack(out)?
            + self.size.pack(out)?
            + self.used.pack(out)?
            + self.rdev.pack(out)?
            + self.fsid.pack(out)?
            + self.fileid.pack(out)?
            + self.atime.pack(out)?
            + self.mtime.pack(out)?
            + self.ctime.pack(out)?)
    }
}

impl<Out: Write> Pack<Out> for wcc_attr {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.size.pack(out)? + self.mtime.pack(out)? + self.ctime.pack(out)?)
    }
}

/// Pack a post_op_attr (attributes_follow flag + optional fattr3)
pub fn pack_post_op_attr<Out: Write>(attr: Option<&fattr3>, out: &mut Out) -> xdr_codec::Result<usize> {
    match attr {
        Some(attr) => Ok(true.pack(out)? + attr.pack(out)?),
        None => false.pack(out),
    }
}

impl<Out: Write> Pack<Out> for wcc_data {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        let before = match &self.before {
            Some(attr) => true.pack(out)? + attr.pack(out)?,
            None => false.pack(out)?,
        };
        Ok(before + pack_post_op_attr(self.after.as_ref(), out)?)
    }
}

impl<Out: Write> Pack<Out> for fhandle3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        xdr_codec::pack_opaque_flex(&self.0, Some(NFS3_FHSIZE), out)
    }
}

impl<Out: Write> Pack<Out> for filename3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        xdr_codec::pack_opaque_flex(&self.0, None, out)
    }
}

impl<Out: Write> Pack<Out> for diropargs3 {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.dir.pack(out)? + self.name.pack(out)?)
    }
}

impl<Out: Write> Pack<Out> for GETATTR3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        self.object.pack(out)
    }
}

impl<Out: Write> Pack<Out> for LOOKUP3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        self.what.pack(out)
    }
}

impl<Out: Write> Pack<Out> for ACCESS3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.object.pack(out)? + self.access.pack(out)?)
    }
}

impl<Out: Write> Pack<Out> for READLINK3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        self.symlink.pack(out)
    }
}

impl<Out: Write> Pack<Out> for READ3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.file.pack(out)? + self.offset.pack(out)? + self.count.pack(out)?)
    }
}

impl<Out: Write> Pack<Out> for WRITE3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.file.pack(out)?
            + self.offset.pack(out)?
            + self.count.pack(out)?
            + self.stable.pack(out)?
            + xdr_codec::pack_opaque_flex(&self.data, None, out)?)
    }
}

impl<Out: Write> Pack<Out> for REMOVE3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        self.object.pack(out)
    }
}

impl<Out: Write> Pack<Out> for RENAME3args {
    fn pack(&self, out: &mut Out) -> xdr_codec::Result<usize> {
        Ok(self.from.pack(out)? + self.to.pack(out)?)
    }
}

// ===== XDR decoding =====

impl<In: Read> Unpack<In> for fhandle3 {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (bytes, sz) = xdr_codec::unpack_opaque_flex(input, Some(NFS3_FHSIZE))?;
        Ok((fhandle3(bytes), sz))
    }
}

impl<In: Read> Unpack<In> for filename3 {
    // Length is checked by the handlers so an oversized name maps to
    // NFS3ERR_NAMETOOLONG rather than a decode failure.
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (name, sz) = xdr_codec::unpack_opaque_flex(input, None)?;
        Ok((filename3(name), sz))
    }
}

impl<In: Read> Unpack<In> for diropargs3 {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (dir, dsz) = fhandle3::unpack(input)?;
        let (name, nsz) = filename3::unpack(input)?;
        Ok((diropargs3 { dir, name }, dsz + nsz))
    }
}

impl<In: Read> Unpack<In> for GETATTR3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (object, sz) = fhandle3::unpack(input)?;
        Ok((GETATTR3args { object }, sz))
    }
}

impl<In: Read> Unpack<In> for LOOKUP3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (what, sz) = diropargs3::unpack(input)?;
        Ok((LOOKUP3args { what }, sz))
    }
}

impl<In: Read> Unpack<In> for ACCESS3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (object, osz) = fhandle3::unpack(input)?;
        let (access, asz) = u32::unpack(input)?;
        Ok((ACCESS3args { object, access }, osz + asz))
    }
}

impl<In: Read> Unpack<In> for READLINK3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (symlink, sz) = fhandle3::unpack(input)?;
        Ok((READLINK3args { symlink }, sz))
    }
}

impl<In: Read> Unpack<In> for READ3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (file, fsz) = fhandle3::unpack(input)?;
        let (offset, osz) = u64::unpack(input)?;
        let (count, csz) = u32::unpack(input)?;
        Ok((READ3args { file, offset, count }, fsz + osz + csz))
    }
}

impl<In: Read> Unpack<In> for WRITE3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (file, fsz) = fhandle3::unpack(input)?;
        let (offset, osz) = u64::unpack(input)?;
        let (count, csz) = u32::unpack(input)?;
        let (stable, ssz) = u32::unpack(input)?;
        let (data, dsz) = xdr_codec::unpack_opaque_flex(input, None)?;
        let args = WRITE3args {
            file,
            offset,
            count,
            stable,
            data,
        };
        Ok((args, fsz + osz + csz + ssz + dsz))
    }
}

impl<In: Read> Unpack<In> for REMOVE3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (object, sz) = diropargs3::unpack(input)?;
        Ok((REMOVE3args { object }, sz))
    }
}

impl<In: Read> Unpack<In> for RENAME3args {
    fn unpack(input: &mut In) -> xdr_codec::Result<(Self, usize)> {
        let (from, fsz) = diropargs3::unpack(input)?;
        let (to, tsz) = diropargs3::unpack(input)?;
        Ok((RENAME3args { from, to }, fsz + tsz))
    }
}

/// Wrapper for NFS messages providing serialization helpers
pub struct NfsMessage;

impl NfsMessage {
    /// Deserialize procedure arguments from the bytes following the RPC header
    pub fn deserialize<'a, T>(data: &'a [u8]) -> XdrResult<T>
    where
        T: Unpack<Cursor<&'a [u8]>>,
    {
        let mut cursor = Cursor::new(data);
        let (args, _bytes_read) = T::unpack(&mut cursor)?;
        Ok(args)
    }

    /// Start a result body with its status code
    pub fn begin_reply(status: nfsstat3) -> XdrResult<Vec<u8>> {
        let mut buf = Vec::new();
        status.pack(&mut buf)?;
        Ok(buf)
    }

    /// Failure result: status followed by a fixed, procedure-specific body
    pub fn create_error_response(status: nfsstat3, body: &[u8]) -> BytesMut {
        let mut buf = BytesMut::with_capacity(4 + body.len());
        buf.extend_from_slice(&(status as u32).to_be_bytes());
        buf.extend_from_slice(body);
        buf
    }

    /// Convert FSAL FileAttributes to NFS fattr3
    pub fn fsal_to_fattr3(attrs: &fsal::FileAttributes) -> fattr3 {
        let ftype = match attrs.ftype {
            fsal::FileType::RegularFile => ftype3::NF3REG,
            fsal::FileType::Directory => ftype3::NF3DIR,
            fsal::FileType::BlockDevice => ftype3::NF3BLK,
            fsal::FileType::CharDevice => ftype3::NF3CHR,
            fsal::FileType::SymbolicLink => ftype3::NF3LNK,
            fsal::FileType::Socket => ftype3::NF3SOCK,
            fsal::FileType::NamedPipe => ftype3::NF3FIFO,
        };

        // specdata3 is two u32s: major then minor
        let rdev = ((attrs.rdev.0 as u64) << 32) | (attrs.rdev.1 as u64);

        fattr3 {
            type_: ftype,
            mode: attrs.mode & 0o7777,
            nlink: attrs.nlink,
            uid: attrs.uid,
            gid: attrs.gid,
            size: attrs.size,
            used: attrs.used,
            rdev,
            fsid: attrs.fsid,
            fileid: attrs.fileid,
            atime: to_nfstime(attrs.atime),
            mtime: to_nfstime(attrs.mtime),
            ctime: to_nfstime(attrs.ctime),
        }
    }

    /// Reduce FSAL FileAttributes to the pre-operation WCC subset
    pub fn fsal_to_wcc_attr(attrs: &fsal::FileAttributes) -> wcc_attr {
        wcc_attr {
            size: attrs.size,
            mtime: to_nfstime(attrs.mtime),
            ctime: to_nfstime(attrs.ctime),
        }
    }
}

fn to_nfstime(t: fsal::FileTime) -> nfstime3 {
    nfstime3 {
        // nfstime3 seconds end in 2106; clamp rather than wrap
        seconds: u32::try_from(t.seconds).unwrap_or(u32::MAX),
        nseconds: t.nseconds,
    }
}
