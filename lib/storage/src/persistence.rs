// On-disk format of the report index.
//
// One file holds a bincode header followed by a bincode body. The header
// carries a SHA-256 of the body so torn or tampered files are rejected on
// load. Files are replaced through write-to-temp-then-rename.
use atomicwrites::{AtomicFile, OverwriteBehavior};
use kpiscope_core::{Error, Metadata, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;

pub const INDEX_FILE: &str = "index.kps";
pub const MAGIC: [u8; 4] = *b"KPS1";
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexMetric {
    InnerProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub metric: IndexMetric,
    pub dim: u32,
    pub count: u64,
    pub checksum: [u8; 32],
}

#[derive(Serialize)]
struct BodyRef<'a> {
    vectors: &'a [f32],
    metadata: &'a [Metadata],
}

#[derive(Deserialize)]
struct Body {
    vectors: Vec<f32>,
    metadata: Vec<Metadata>,
}

/// Index contents as read back from disk
#[derive(Debug)]
pub struct IndexSnapshot {
    pub dim: usize,
    pub vectors: Vec<f32>,
    pub metadata: Vec<Metadata>,
}

fn serialization(e: bincode::Error) -> Error {
    Error::Serialization(e.to_string())
}

/// Atomically replace `path` with the given index contents.
pub fn write_index(path: &Path, dim: usize, vectors: &[f32], metadata: &[Metadata]) -> Result<()> {
    if dim == 0 || vectors.len() != metadata.len() * dim {
        return Err(Error::Persistence(format!(
            "refusing to write {} floats for {} records of dimension {}",
            vectors.len(),
            metadata.len(),
            dim
        )));
    }

    let body = bincode::serialize(&BodyRef { vectors, metadata }).map_err(serialization)?;
    let header = IndexHeader {
        magic: MAGIC,
        version: FORMAT_VERSION,
        metric: IndexMetric::InnerProduct,
        dim: dim as u32,
        count: metadata.len() as u64,
        checksum: Sha256::digest(&body).into(),
    };
    let header_bytes = bincode::serialize(&header).map_err(serialization)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|file| {
            file.write_all(&header_bytes)?;
            file.write_all(&body)?;
            file.sync_all()
        })
        .map_err(|e| Error::Persistence(format!("failed to write {}: {}", path.display(), e)))
}

/// Read and verify an index file.
pub fn read_index(path: &Path) -> Result<IndexSnapshot> {
    let bytes = fs::read(path)?;
    let mut cursor = std::io::Cursor::new(bytes.as_slice());

    let header: IndexHeader = bincode::deserialize_from(&mut cursor)
        .map_err(|e| Error::Corrupted(format!("unreadable header: {}", e)))?;
    if header.magic != MAGIC {
        return Err(Error::Corrupted("bad magic".to_string()));
    }
    if header.version != FORMAT_VERSION {
        return Err(Error::Corrupted(format!(
            "unsupported format version {}",
            header.version
        )));
    }

    let body_bytes = &bytes[cursor.position() as usize..];
    let actual: [u8; 32] = Sha256::digest(body_bytes).into();
    if actual != header.checksum {
        return Err(Error::Corrupted("checksum mismatch".to_string()));
    }

    let body: Body = bincode::deserialize(body_bytes)
        .map_err(|e| Error::Corrupted(format!("unreadable body: {}", e)))?;

    let dim = header.dim as usize;
    let count = header.count as usize;
    if dim == 0 {
        return Err(Error::Corrupted("zero dimension".to_string()));
    }
    if body.metadata.len() != count {
        return Err(Error::Corrupted(format!(
            "header says {} records, metadata log has {}",
            count,
            body.metadata.len()
        )));
    }
    if body.vectors.len() != count * dim {
        return Err(Error::Corrupted(format!(
            "expected {} floats, found {}",
            count * dim,
            body.vectors.len()
        )));
    }

    Ok(IndexSnapshot {
        dim,
        vectors: body.vectors,
        metadata: body.metadata,
    })
}
