/*!
 * Send-stream wire vocabulary and command decoding
 *
 * A command record on the wire is `u32 size (LE)`, `u16 type (LE)`,
 * `u32 crc32c (LE, consumed but not verified)`, then `size` bytes of
 * attributes. Each attribute is `u16 type (LE)`, `u16 length (LE)`,
 * `length` value bytes. Ids match the kernel's v1 send enumeration, with
 * the v2/v3 command ids known so they can be skipped.
 */

use std::io::Read;

use chrono::{DateTime, Utc};
use strum::{Display, FromRepr};
use tracing::debug;

use crate::error::{BtrfsDiffError, Result};
use crate::reader::ByteReader;
use crate::types::ByteData;
use crate::utils::hex_string;

/// NUL-terminated magic that opens every send stream
pub const SEND_STREAM_MAGIC: &str = "btrfs-stream";

/// The only protocol version handled semantically
pub const SEND_STREAM_VERSION: u32 = 1;

/// Command type ids as emitted by the kernel
#[derive(Debug, Display, FromRepr, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum CommandType {
    Unspec = 0,
    Subvol = 1,
    Snapshot = 2,
    Mkfile = 3,
    Mkdir = 4,
    Mknod = 5,
    Mkfifo = 6,
    Mksock = 7,
    Symlink = 8,
    Rename = 9,
    Link = 10,
    Unlink = 11,
    Rmdir = 12,
    SetXattr = 13,
    RemoveXattr = 14,
    Write = 15,
    Clone = 16,
    Truncate = 17,
    Chmod = 18,
    Chown = 19,
    Utimes = 20,
    End = 21,
    UpdateExtent = 22,
    // Version 2
    Fallocate = 23,
    Fileattr = 24,
    EncodedWrite = 25,
    // Version 3
    EnableVerity = 26,
}

/// Logical operation class a command maps to
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum OpClass {
    Unspec,
    Ignore,
    Create,
    Modify,
    Delete,
    Rename,
    End,
}

impl CommandType {
    /// Static command → operation class table
    ///
    /// `Utimes` is classified `Ignore`: send streams refresh timestamps on
    /// nearly every touched directory, and surfacing those would drown the
    /// real changes. The v2/v3 commands are consumed without effect.
    pub fn op_class(self) -> OpClass {
        use CommandType::*;
        match self {
            Unspec => OpClass::Unspec,
            Subvol | Snapshot | Mkfile | Mkdir | Mknod | Mkfifo | Mksock | Symlink => {
                OpClass::Create
            }
            Rename | Link => OpClass::Rename,
            Unlink | Rmdir => OpClass::Delete,
            Write | Clone | Truncate | Chmod | Chown | SetXattr | RemoveXattr | UpdateExtent => {
                OpClass::Modify
            }
            Utimes | Fallocate | Fileattr | EncodedWrite | EnableVerity => OpClass::Ignore,
            End => OpClass::End,
        }
    }
}

/// Attribute type ids of the v1 protocol
#[derive(Debug, Display, FromRepr, Clone, Copy, PartialEq, Eq)]
#[strum(serialize_all = "snake_case")]
#[repr(u16)]
pub enum AttrType {
    Unspec = 0,
    Uuid = 1,
    Ctransid = 2,
    Ino = 3,
    Size = 4,
    Mode = 5,
    Uid = 6,
    Gid = 7,
    Rdev = 8,
    Ctime = 9,
    Mtime = 10,
    Atime = 11,
    Otime = 12,
    XattrName = 13,
    XattrData = 14,
    Path = 15,
    PathTo = 16,
    PathLink = 17,
    FileOffset = 18,
    Data = 19,
    CloneUuid = 20,
    CloneCtransid = 21,
    ClonePath = 22,
    CloneOffset = 23,
    CloneLen = 24,
}

/// One decoded command record with its undecoded attribute payload
///
/// Attributes are consumed strictly in the order the processor asks for
/// them; a mismatch between the next attribute on the wire and the
/// requested one is an `UnexpectedAttribute` error.
pub struct Command {
    cmd_type: CommandType,
    data: Vec<u8>,
    pos: usize,
}

impl Command {
    /// Decode the next command record from the stream
    pub fn read<R: Read>(reader: &mut ByteReader<R>) -> Result<Command> {
        let size = reader.read_u32()?;
        let raw_type = reader.read_u16()?;
        let cmd_type = CommandType::from_repr(raw_type)
            .ok_or(BtrfsDiffError::InvalidCommandType(raw_type))?;
        // crc32c over the record, consumed but not verified
        let _crc = reader.read_u32()?;
        let data = reader.read_bytes(size as usize)?;
        Ok(Self {
            cmd_type,
            data,
            pos: 0,
        })
    }

    pub fn cmd_type(&self) -> CommandType {
        self.cmd_type
    }

    pub fn op_class(&self) -> OpClass {
        self.cmd_type.op_class()
    }

    /// Consume the next attribute, which must be of the expected type
    fn param(&mut self, expected: AttrType) -> Result<&[u8]> {
        let remaining = &self.data[self.pos..];
        if remaining.len() < 4 {
            return Err(BtrfsDiffError::TruncatedAttribute {
                attr: expected.to_string(),
                reason: "no more attributes in command payload".to_string(),
            });
        }
        let raw_type = u16::from_le_bytes([remaining[0], remaining[1]]);
        if raw_type != expected as u16 {
            let got = AttrType::from_repr(raw_type)
                .map(|a| a.to_string())
                .unwrap_or_else(|| format!("type {}", raw_type));
            return Err(BtrfsDiffError::UnexpectedAttribute {
                expected: expected.to_string(),
                got,
            });
        }
        let length = u16::from_le_bytes([remaining[2], remaining[3]]) as usize;
        if length + 4 > remaining.len() {
            return Err(BtrfsDiffError::TruncatedAttribute {
                attr: expected.to_string(),
                reason: format!(
                    "length was {} but only {} left",
                    length,
                    remaining.len() - 4
                ),
            });
        }
        let start = self.pos + 4;
        self.pos = start + length;
        Ok(&self.data[start..start + length])
    }

    fn fixed(&mut self, expected: AttrType, need: usize) -> Result<&[u8]> {
        let value = self.param(expected)?;
        if value.len() < need {
            return Err(BtrfsDiffError::TruncatedAttribute {
                attr: expected.to_string(),
                reason: format!("value was {} bytes, expected {}", value.len(), need),
            });
        }
        Ok(value)
    }

    /// Little-endian u64 attribute (sizes, offsets, ids, modes)
    pub fn u64_param(&mut self, attr: AttrType) -> Result<u64> {
        let b = self.fixed(attr, 8)?;
        let v = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        debug!("param {} [len={}]: {}", attr, b.len(), v);
        Ok(v)
    }

    /// Timestamp attribute: u64 seconds (LE) then u32 nanoseconds (LE)
    pub fn time_param(&mut self, attr: AttrType) -> Result<DateTime<Utc>> {
        let b = self.fixed(attr, 12)?;
        let sec = u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]);
        let nsec = u32::from_le_bytes([b[8], b[9], b[10], b[11]]);
        let ts = DateTime::<Utc>::from_timestamp(sec as i64, nsec)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        debug!("param {} [len={}]: {}", attr, b.len(), ts);
        Ok(ts)
    }

    /// UUID attribute, rendered as lowercase hex
    pub fn uuid_param(&mut self, attr: AttrType) -> Result<String> {
        let b = self.param(attr)?;
        let v = hex_string(b);
        debug!("param {} [len={}]: {}", attr, b.len(), v);
        Ok(v)
    }

    /// Path attribute: UTF-8 with any leading slashes stripped
    ///
    /// Applies to `path`, `path_to` and `clone_path`. Symlink and
    /// hard-link targets go through [`Command::link_param`] instead, which
    /// preserves the bytes exactly (targets may be relative).
    pub fn path_param(&mut self, attr: AttrType) -> Result<String> {
        let b = self.param(attr)?;
        let len = b.len();
        let v = String::from_utf8_lossy(b)
            .trim_start_matches('/')
            .to_string();
        debug!("param {} [len={}]: {}", attr, len, v);
        Ok(v)
    }

    /// Link-target attribute: UTF-8, untouched
    pub fn link_param(&mut self) -> Result<String> {
        let b = self.param(AttrType::PathLink)?;
        let v = String::from_utf8_lossy(b).into_owned();
        debug!("param {} [len={}]: {}", AttrType::PathLink, b.len(), v);
        Ok(v)
    }

    /// Plain string attribute (xattr names)
    pub fn string_param(&mut self, attr: AttrType) -> Result<String> {
        let b = self.param(attr)?;
        let v = String::from_utf8_lossy(b).into_owned();
        debug!("param {} [len={}]: {}", attr, b.len(), v);
        Ok(v)
    }

    /// Opaque bytes attribute (file data, xattr values)
    pub fn bytes_param(&mut self, attr: AttrType) -> Result<ByteData> {
        let b = self.param(attr)?;
        let v = ByteData::new(b.to_vec());
        debug!("param {} [len={}]: {}", attr, v.bytes.len(), v);
        Ok(v)
    }
}

#[cfg(test)]
impl Command {
    /// Build an in-memory command without going through the wire
    pub(crate) fn synthetic(cmd_type: CommandType, data: Vec<u8>) -> Self {
        Self {
            cmd_type,
            data,
            pos: 0,
        }
    }
}
