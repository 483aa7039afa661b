// src/transaction/journal.rs

//! Sequence files: the durable form of a [`Sequence`]
//!
//! A sequence file carries one sequence across the boundary between installer
//! phases, which may run in different processes. The encoding is private to
//! this crate and needs no schema beyond the bytes themselves:
//!
//! ```text
//! header  : "TSEQ" | version u16 LE | reserved u16 LE
//! record* : tag u8 | ticks u32 LE | payload_len u32 LE | payload
//! trailer : "TEND" | record_count u32 LE | crc32 u32 LE (over everything before it)
//! ```
//!
//! The trailer lets `load` tell a complete file from a half-written one. Files
//! are written to a temporary sibling and renamed into place, so a reader
//! never sees a partial file at the final path.

use crate::operation::{Operation, OperationKind, Sequence};
use crate::{Error, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Leading magic of every sequence file
pub const SEQUENCE_MAGIC: &[u8; 4] = b"TSEQ";
/// Magic that opens the trailer
pub const TRAILER_MAGIC: &[u8; 4] = b"TEND";
/// Current encoding version. Reader and writer must be the same release.
pub const FORMAT_VERSION: u16 = 1;

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 12;

const TAG_ROLLBACK_ENABLE: u8 = 1;
const TAG_ADAPTER_CREATE: u8 = 2;
const TAG_ADAPTER_DELETE_BY_NAME: u8 = 3;
const TAG_FILE_DELETE: u8 = 4;

const PAYLOAD_TRUE: &[u8] = &[1];
const PAYLOAD_FALSE: &[u8] = &[0];

/// Encode a sequence into its file bytes
pub fn encode(seq: &Sequence) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(HEADER_LEN + TRAILER_LEN + seq.len() * 32);
    buf.extend_from_slice(SEQUENCE_MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());

    for op in seq.iter() {
        let (tag, payload): (u8, &[u8]) = match &op.kind {
            OperationKind::RollbackEnable(true) => (TAG_ROLLBACK_ENABLE, PAYLOAD_TRUE),
            OperationKind::RollbackEnable(false) => (TAG_ROLLBACK_ENABLE, PAYLOAD_FALSE),
            OperationKind::AdapterCreate(name) => (TAG_ADAPTER_CREATE, name.as_bytes()),
            OperationKind::AdapterDeleteByName(name) => {
                (TAG_ADAPTER_DELETE_BY_NAME, name.as_bytes())
            }
            OperationKind::FileDelete(path) => {
                let path = path.to_str().ok_or_else(|| {
                    Error::IoError(format!(
                        "Path is not valid UTF-8: {}",
                        path.display()
                    ))
                })?;
                (TAG_FILE_DELETE, path.as_bytes())
            }
        };
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            Error::IoError(format!("Operation payload too large: {} bytes", payload.len()))
        })?;

        buf.push(tag);
        buf.extend_from_slice(&op.ticks.to_le_bytes());
        buf.extend_from_slice(&payload_len.to_le_bytes());
        buf.extend_from_slice(payload);
    }

    let count = u32::try_from(seq.len())
        .map_err(|_| Error::IoError(format!("Sequence too long: {} operations", seq.len())))?;
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(TRAILER_MAGIC);
    buf.extend_from_slice(&count.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decode file bytes; any defect rejects the whole file
pub fn decode(bytes: &[u8]) -> Result<Sequence> {
    if bytes.len() < HEADER_LEN + TRAILER_LEN {
        return Err(Error::IoError(format!(
            "Sequence file truncated: {} bytes",
            bytes.len()
        )));
    }

    let (body, trailer) = bytes.split_at(bytes.len() - TRAILER_LEN);
    if &trailer[0..4] != TRAILER_MAGIC {
        return Err(Error::IoError(
            "Sequence file incomplete: trailer missing".to_string(),
        ));
    }
    let expected_count = read_u32(&trailer[4..8]);
    let expected_crc = read_u32(&trailer[8..12]);
    let actual_crc = crc32fast::hash(body);
    if expected_crc != actual_crc {
        return Err(Error::IoError(format!(
            "Sequence file checksum mismatch: expected {:08x}, got {:08x}",
            expected_crc, actual_crc
        )));
    }

    let mut reader = ByteReader::new(body);
    if reader.take(4)? != SEQUENCE_MAGIC {
        return Err(Error::IoError("Not a sequence file: bad magic".to_string()));
    }
    let version = reader.u16()?;
    if version != FORMAT_VERSION {
        return Err(Error::IoError(format!(
            "Unsupported sequence file version {} (expected {})",
            version, FORMAT_VERSION
        )));
    }
    reader.u16()?;

    let mut seq = Sequence::new();
    while !reader.is_empty() {
        let offset = reader.pos;
        let tag = reader.u8()?;
        let ticks = reader.u32()?;
        let payload_len = reader.u32()? as usize;
        let payload = reader.take(payload_len)?;

        let kind = match tag {
            TAG_ROLLBACK_ENABLE => match payload {
                [0] => OperationKind::RollbackEnable(false),
                [1] => OperationKind::RollbackEnable(true),
                _ => {
                    return Err(Error::IoError(format!(
                        "Invalid rollback-enable payload at offset {}",
                        offset
                    )));
                }
            },
            TAG_ADAPTER_CREATE => OperationKind::AdapterCreate(utf8(payload, offset)?),
            TAG_ADAPTER_DELETE_BY_NAME => {
                OperationKind::AdapterDeleteByName(utf8(payload, offset)?)
            }
            TAG_FILE_DELETE => OperationKind::FileDelete(PathBuf::from(utf8(payload, offset)?)),
            other => {
                return Err(Error::IoError(format!(
                    "Unknown operation tag {} at offset {}",
                    other, offset
                )));
            }
        };
        seq.append(Operation { kind, ticks });
    }

    if seq.len() != expected_count as usize {
        return Err(Error::IoError(format!(
            "Sequence file record count mismatch: expected {}, found {}",
            expected_count,
            seq.len()
        )));
    }

    Ok(seq)
}

/// Write a sequence to a sink
pub fn save<W: Write>(seq: &Sequence, sink: &mut W) -> Result<()> {
    let bytes = encode(seq)?;
    sink.write_all(&bytes)?;
    sink.flush()?;
    Ok(())
}

/// Read a sequence from a source
pub fn load<R: Read>(source: &mut R) -> Result<Sequence> {
    let mut bytes = Vec::new();
    source.read_to_end(&mut bytes)?;
    decode(&bytes)
}

/// Atomically replace `path` with the encoded sequence
///
/// The bytes go to a temporary file in the same directory, which is synced
/// and renamed over `path`. On failure the temporary file is removed and
/// `path` is left as it was.
pub fn save_to_path(seq: &Sequence, path: &Path) -> Result<()> {
    let dir = parent_dir(path);
    let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Error::IoError(format!(
            "Failed to create temporary file in {}: {}",
            dir.display(),
            e
        ))
    })?;
    save(seq, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| {
        Error::IoError(format!(
            "Failed to write sequence file {}: {}",
            path.display(),
            e.error
        ))
    })?;
    Ok(())
}

/// Write a sequence to a new, uniquely named file in `dir`
///
/// The file name starts with `prefix` and ends in `.tmp`. Returns the path of
/// the kept file.
pub fn create_sequence_file(seq: &Sequence, dir: &Path, prefix: &str) -> Result<PathBuf> {
    let mut temp = tempfile::Builder::new()
        .prefix(prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| {
            Error::IoError(format!(
                "Failed to create sequence file in {}: {}",
                dir.display(),
                e
            ))
        })?;
    save(seq, temp.as_file_mut())?;
    temp.as_file().sync_all()?;
    let (_file, path) = temp.keep().map_err(|e| {
        Error::IoError(format!("Failed to keep sequence file: {}", e.error))
    })?;
    Ok(path)
}

/// Load a sequence from a file path
pub fn load_from_path(path: &Path) -> Result<Sequence> {
    let mut file = File::open(path).map_err(|e| {
        Error::IoError(format!(
            "Failed to open sequence file {}: {}",
            path.display(),
            e
        ))
    })?;
    load(&mut file).map_err(|e| match e {
        Error::IoError(msg) => Error::IoError(format!("{}: {}", path.display(), msg)),
        other => other,
    })
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn utf8(payload: &[u8], offset: usize) -> Result<String> {
    String::from_utf8(payload.to_vec()).map_err(|_| {
        Error::IoError(format!("Invalid UTF-8 payload at offset {}", offset))
    })
}

/// Bounds-checked little-endian reader over a byte slice
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                Error::IoError(format!("Sequence file truncated at offset {}", self.pos))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(read_u32(self.take(4)?))
    }
}
