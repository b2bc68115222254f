//! Send-stream encoder for integration tests
//!
//! Builds byte-exact v1 streams: magic header, version, then
//! length-prefixed command records with their attribute lists, the same
//! layout `btrfs send` writes.

use btrfs_diff::{AttrType, CommandType};

pub struct StreamBuilder {
    bytes: Vec<u8>,
}

#[allow(dead_code)]
impl StreamBuilder {
    /// Start a stream: magic, NUL, version 1
    pub fn new() -> Self {
        let mut bytes = b"btrfs-stream\0".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        Self { bytes }
    }

    /// Start a stream with an arbitrary version
    pub fn with_version(version: u32) -> Self {
        let mut bytes = b"btrfs-stream\0".to_vec();
        bytes.extend_from_slice(&version.to_le_bytes());
        Self { bytes }
    }

    /// Append a raw command record (crc is written as zero; it is never
    /// verified)
    pub fn command(mut self, cmd: u16, attrs: &[u8]) -> Self {
        self.bytes.extend_from_slice(&(attrs.len() as u32).to_le_bytes());
        self.bytes.extend_from_slice(&cmd.to_le_bytes());
        self.bytes.extend_from_slice(&0u32.to_le_bytes());
        self.bytes.extend_from_slice(attrs);
        self
    }

    pub fn snapshot(self, path: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr(AttrType::Uuid, &[0xab; 16]));
        attrs.extend(attr_u64(AttrType::Ctransid, 100));
        attrs.extend(attr(AttrType::CloneUuid, &[0xcd; 16]));
        attrs.extend(attr_u64(AttrType::CloneCtransid, 99));
        self.command(CommandType::Snapshot as u16, &attrs)
    }

    pub fn subvol(self, path: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr(AttrType::Uuid, &[0xab; 16]));
        attrs.extend(attr_u64(AttrType::Ctransid, 100));
        self.command(CommandType::Subvol as u16, &attrs)
    }

    pub fn mkfile(self, path: &str) -> Self {
        self.command(CommandType::Mkfile as u16, &attr_str(AttrType::Path, path))
    }

    pub fn mkdir(self, path: &str) -> Self {
        self.command(CommandType::Mkdir as u16, &attr_str(AttrType::Path, path))
    }

    pub fn mkfifo(self, path: &str) -> Self {
        self.command(CommandType::Mkfifo as u16, &attr_str(AttrType::Path, path))
    }

    pub fn mksock(self, path: &str) -> Self {
        self.command(CommandType::Mksock as u16, &attr_str(AttrType::Path, path))
    }

    pub fn mknod(self, path: &str) -> Self {
        self.command(CommandType::Mknod as u16, &attr_str(AttrType::Path, path))
    }

    pub fn symlink(self, path: &str, ino: u64, target: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::Ino, ino));
        attrs.extend(attr_str(AttrType::PathLink, target));
        self.command(CommandType::Symlink as u16, &attrs)
    }

    pub fn rename(self, from: &str, to: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, from);
        attrs.extend(attr_str(AttrType::PathTo, to));
        self.command(CommandType::Rename as u16, &attrs)
    }

    pub fn link(self, path: &str, target: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_str(AttrType::PathLink, target));
        self.command(CommandType::Link as u16, &attrs)
    }

    pub fn unlink(self, path: &str) -> Self {
        self.command(CommandType::Unlink as u16, &attr_str(AttrType::Path, path))
    }

    pub fn rmdir(self, path: &str) -> Self {
        self.command(CommandType::Rmdir as u16, &attr_str(AttrType::Path, path))
    }

    pub fn write(self, path: &str, offset: u64, data: &[u8]) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::FileOffset, offset));
        attrs.extend(attr(AttrType::Data, data));
        self.command(CommandType::Write as u16, &attrs)
    }

    pub fn update_extent(self, path: &str, offset: u64, size: u64) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::FileOffset, offset));
        attrs.extend(attr_u64(AttrType::Size, size));
        self.command(CommandType::UpdateExtent as u16, &attrs)
    }

    pub fn truncate(self, path: &str, size: u64) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::Size, size));
        self.command(CommandType::Truncate as u16, &attrs)
    }

    pub fn chmod(self, path: &str, mode: u64) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::Mode, mode));
        self.command(CommandType::Chmod as u16, &attrs)
    }

    pub fn chown(self, path: &str, uid: u64, gid: u64) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_u64(AttrType::Uid, uid));
        attrs.extend(attr_u64(AttrType::Gid, gid));
        self.command(CommandType::Chown as u16, &attrs)
    }

    pub fn set_xattr(self, path: &str, name: &str, data: &[u8]) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_str(AttrType::XattrName, name));
        attrs.extend(attr(AttrType::XattrData, data));
        self.command(CommandType::SetXattr as u16, &attrs)
    }

    pub fn remove_xattr(self, path: &str, name: &str) -> Self {
        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr_str(AttrType::XattrName, name));
        self.command(CommandType::RemoveXattr as u16, &attrs)
    }

    pub fn utimes(self, path: &str) -> Self {
        let mut stamp = Vec::new();
        stamp.extend_from_slice(&1_700_000_000u64.to_le_bytes());
        stamp.extend_from_slice(&0u32.to_le_bytes());

        let mut attrs = attr_str(AttrType::Path, path);
        attrs.extend(attr(AttrType::Atime, &stamp));
        attrs.extend(attr(AttrType::Mtime, &stamp));
        attrs.extend(attr(AttrType::Ctime, &stamp));
        self.command(CommandType::Utimes as u16, &attrs)
    }

    pub fn clone_op(self, path: &str) -> Self {
        self.command(CommandType::Clone as u16, &attr_str(AttrType::Path, path))
    }

    pub fn unspec(self) -> Self {
        self.command(CommandType::Unspec as u16, &[])
    }

    /// Terminate the stream with an END command
    pub fn end(self) -> Vec<u8> {
        self.command(CommandType::End as u16, &[]).bytes
    }

    /// The accumulated bytes without a terminating END
    pub fn without_end(self) -> Vec<u8> {
        self.bytes
    }
}

pub fn attr(attr_type: AttrType, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(attr_type as u16).to_le_bytes());
    out.extend_from_slice(&(value.len() as u16).to_le_bytes());
    out.extend_from_slice(value);
    out
}

pub fn attr_str(attr_type: AttrType, value: &str) -> Vec<u8> {
    attr(attr_type, value.as_bytes())
}

pub fn attr_u64(attr_type: AttrType, value: u64) -> Vec<u8> {
    attr(attr_type, &value.to_le_bytes())
}
