//! Binary on-disk cache for a built reverse index, tied to the
//! snapshot it was built from by a size + fingerprint check. Any
//! mismatch or I/O error is treated as a cache miss: the caller
//! rebuilds from scratch and overwrites the stale file.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::id::ObjectId;
use crate::index::ReverseIndex;

const MAGIC: u32 = 0x5254_5249; // "RTRI"
const VERSION: u32 = 1;
const FINGERPRINT_PREFIX_BYTES: u64 = 64 * 1024;

/// Outcome of attempting to load a cache file.
pub enum CacheLoadResult {
    Hit(ReverseIndex),
    Miss,
}

/// The cache path for a given snapshot: the snapshot path with `.ri`
/// appended.
pub fn cache_path_for(snapshot_path: &Path) -> PathBuf {
    let mut os = snapshot_path.as_os_str().to_owned();
    os.push(".ri");
    PathBuf::from(os)
}

/// SHA-256 over the first 64 KiB of the file (or the whole file, if
/// shorter).
fn fingerprint(path: &Path) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buf = vec![0u8; FINGERPRINT_PREFIX_BYTES as usize];
    let mut total_read = 0usize;
    loop {
        match file.read(&mut buf[total_read..]) {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
        if total_read == buf.len() {
            break;
        }
    }
    buf.truncate(total_read);
    let mut hasher = Sha256::new();
    hasher.update(&buf);
    Ok(hasher.finalize().to_vec())
}

/// Attempts to load a previously cached reverse index for
/// `snapshot_path`. Any failure to validate or decode is logged and
/// reported as a miss; it is never propagated as an error, since a
/// missing or corrupt cache is an expected, recoverable situation.
pub fn load(snapshot_path: &Path) -> CacheLoadResult {
    let cache_path = cache_path_for(snapshot_path);
    match try_load(snapshot_path, &cache_path) {
        Ok(Some(index)) => CacheLoadResult::Hit(index),
        Ok(None) => CacheLoadResult::Miss,
        Err(e) => {
            warn!(error = %e, cache_path = %cache_path.display(), "reverse index cache unreadable, rebuilding");
            CacheLoadResult::Miss
        }
    }
}

fn try_load(snapshot_path: &Path, cache_path: &Path) -> io::Result<Option<ReverseIndex>> {
    if !cache_path.exists() {
        return Ok(None);
    }

    let snapshot_size = std::fs::metadata(snapshot_path)?.len();
    let current_fingerprint = fingerprint(snapshot_path)?;

    let raw = std::fs::read(cache_path)?;
    let mut cursor = io::Cursor::new(raw.as_slice());

    let magic = cursor.read_u32::<LittleEndian>()?;
    let version = cursor.read_u32::<LittleEndian>()?;
    if magic != MAGIC || version != VERSION {
        warn!("reverse index cache header mismatch, rebuilding");
        return Ok(None);
    }

    let cached_snapshot_size = cursor.read_u64::<LittleEndian>()?;
    let fingerprint_len = cursor.read_u32::<LittleEndian>()? as usize;
    let mut cached_fingerprint = vec![0u8; fingerprint_len];
    cursor.read_exact(&mut cached_fingerprint)?;

    if cached_snapshot_size != snapshot_size || cached_fingerprint != current_fingerprint {
        warn!("reverse index cache stale, rebuilding");
        return Ok(None);
    }

    let entry_count = cursor.read_u32::<LittleEndian>()? as usize;

    let compressed = &raw[cursor.position() as usize..];
    let decompressed = zstd::stream::decode_all(compressed)?;
    let mut body = io::Cursor::new(decompressed.as_slice());

    let mut entries = Vec::with_capacity(entry_count);
    for _ in 0..entry_count {
        let child = body.read_u64::<LittleEndian>()?;
        let parent_count = body.read_u32::<LittleEndian>()? as usize;
        let mut parents = Vec::with_capacity(parent_count);
        for _ in 0..parent_count {
            parents.push(ObjectId::new(body.read_u64::<LittleEndian>()?));
        }
        entries.push((ObjectId::new(child), parents));
    }

    if entries.len() != entry_count {
        return Ok(None);
    }

    info!(cache_path = %cache_path.display(), entry_count, "loaded reverse index from cache");
    Ok(Some(ReverseIndex::from_entries(entries)))
}

/// Serializes `index` to `cache_path_for(snapshot_path)`, overwriting
/// any existing file. Failures here are non-fatal to the caller (the
/// analysis already has its index in memory); they are logged and
/// swallowed.
pub fn store(snapshot_path: &Path, index: &ReverseIndex) {
    let cache_path = cache_path_for(snapshot_path);
    if let Err(e) = try_store(snapshot_path, &cache_path, index) {
        warn!(error = %e, cache_path = %cache_path.display(), "failed to write reverse index cache");
    }
}

fn try_store(snapshot_path: &Path, cache_path: &Path, index: &ReverseIndex) -> io::Result<()> {
    let snapshot_size = std::fs::metadata(snapshot_path)?.len();
    let current_fingerprint = fingerprint(snapshot_path)?;

    let mut body = Vec::new();
    let mut entry_count: u32 = 0;
    for (child, parents) in index.iter() {
        body.write_u64::<LittleEndian>(child.raw())?;
        body.write_u32::<LittleEndian>(parents.len() as u32)?;
        for parent in parents {
            body.write_u64::<LittleEndian>(parent.raw())?;
        }
        entry_count += 1;
    }
    let compressed = zstd::stream::encode_all(body.as_slice(), 0)?;

    let mut header = Vec::new();
    header.write_u32::<LittleEndian>(MAGIC)?;
    header.write_u32::<LittleEndian>(VERSION)?;
    header.write_u64::<LittleEndian>(snapshot_size)?;
    header.write_u32::<LittleEndian>(current_fingerprint.len() as u32)?;
    header.extend_from_slice(&current_fingerprint);
    header.write_u32::<LittleEndian>(entry_count)?;

    let tmp_path = cache_path.with_extension("ri.tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(&header)?;
        file.write_all(&compressed)?;
    }
    std::fs::rename(&tmp_path, cache_path)?;
    info!(cache_path = %cache_path.display(), entry_count, "wrote reverse index cache");
    Ok(())
}
