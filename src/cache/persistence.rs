/*!
 * On-disk format of the AST cache.
 *
 * A versioned JSON container, optionally brotli-compressed. Files with an
 * unknown version are rejected with [`CacheError::UnsupportedVersion`] so the
 * caller can start from an empty cache.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;

use crate::errors::CacheError;
use crate::python::Module;

pub const FORMAT_VERSION: u32 = 1;

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Debug, Deserialize)]
pub struct PersistedEntry {
    pub code: Module,
    /// Creation time in seconds since the Unix epoch
    pub timestamp: f64,
    pub size_bytes: usize,
    pub access_count: u64,
}

#[derive(Debug, Deserialize)]
pub struct PersistedCache {
    pub version: u32,
    pub entries: HashMap<String, PersistedEntry>,
    #[serde(default)]
    pub stats: PersistedStats,
}

/// Borrowed view used when writing, so trees are not cloned
#[derive(Serialize)]
pub struct EntryRef<'a> {
    pub code: &'a Module,
    pub timestamp: f64,
    pub size_bytes: usize,
    pub access_count: u64,
}

#[derive(Serialize)]
pub struct SnapshotRef<'a> {
    pub version: u32,
    pub entries: HashMap<&'a str, EntryRef<'a>>,
    pub stats: PersistedStats,
}

/// Writes the snapshot atomically: a temp file in the same directory is renamed over `path`
pub fn write_snapshot(path: &Path, snapshot: &SnapshotRef<'_>, compress: bool) -> Result<(), CacheError> {
    let json = serde_json::to_vec(snapshot)?;
    let bytes = if compress { compress_bytes(&json)? } else { json };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&dir)?;
    let mut file = tempfile::NamedTempFile::new_in(&dir)?;
    file.write_all(&bytes)?;
    file.flush()?;
    file.persist(path).map_err(|e| CacheError::Io(e.error))?;
    Ok(())
}

/// Reads a snapshot; `Ok(None)` when the file does not exist
pub fn read_snapshot(path: &Path) -> Result<Option<PersistedCache>, CacheError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = std::fs::read(path)?;
    let json = if raw.first() == Some(&b'{') { raw } else { decompress_bytes(&raw)? };

    let value: serde_json::Value = serde_json::from_slice(&json)?;
    let version = value.get("version").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    if version != FORMAT_VERSION {
        return Err(CacheError::UnsupportedVersion(version));
    }
    let cache: PersistedCache = serde_json::from_value(value)?;
    Ok(Some(cache))
}

fn compress_bytes(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::new();
    {
        let mut writer = brotli::CompressorWriter::new(&mut out, BROTLI_BUFFER, BROTLI_QUALITY, BROTLI_WINDOW);
        writer.write_all(data).map_err(|e| CacheError::Compression(e.to_string()))?;
        writer.flush().map_err(|e| CacheError::Compression(e.to_string()))?;
    }
    Ok(out)
}

fn decompress_bytes(data: &[u8]) -> Result<Vec<u8>, CacheError> {
    let mut out = Vec::new();
    brotli::Decompressor::new(data, BROTLI_BUFFER)
        .read_to_end(&mut out)
        .map_err(|e| CacheError::Compression(e.to_string()))?;
    Ok(out)
}
