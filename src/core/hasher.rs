//! BLAKE3 digests for packaged code assets and description entries.
//!
//! All digests are rendered as `blake3:{hex}`.

use serde::Serialize;
use std::io::Read;
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

fn render(hash: blake3::Hash) -> String {
    format!("blake3:{}", hash.to_hex())
}

/// Digest a string.
pub fn hash_string(s: &str) -> String {
    render(blake3::hash(s.as_bytes()))
}

/// Digest a file's contents, streaming.
pub fn hash_file(path: &Path) -> Result<String, String> {
    let mut file =
        std::fs::File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let mut hasher = blake3::Hasher::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = file
            .read(&mut chunk)
            .map_err(|e| format!("read error {}: {}", path.display(), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }
    Ok(render(hasher.finalize()))
}

/// Digest a packaged code directory.
///
/// Files are visited in sorted order and their relative paths are mixed into
/// the digest, so renames change the result. Symlinks are skipped.
pub fn hash_directory(root: &Path) -> Result<String, String> {
    let mut files = Vec::new();
    collect_files(root, root, &mut files)?;

    let mut hasher = blake3::Hasher::new();
    for (rel, digest) in &files {
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    Ok(render(hasher.finalize()))
}

fn collect_files(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, String)>,
) -> Result<(), String> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| format!("cannot read dir {}: {}", dir.display(), e))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_type = entry
            .file_type()
            .map_err(|e| format!("stat error {}: {}", entry.path().display(), e))?;
        let path = entry.path();
        if file_type.is_dir() {
            collect_files(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path
                .strip_prefix(root)
                .map_err(|e| format!("path prefix error: {}", e))?
                .to_string_lossy()
                .replace('\\', "/");
            out.push((rel, hash_file(&path)?));
        }
    }
    Ok(())
}

/// Digest a serializable value through its JSON rendering.
///
/// Map ordering comes from the value itself (IndexMap keeps insertion order),
/// so equal descriptions always produce equal digests.
pub fn hash_serialized<T: Serialize>(value: &T) -> Result<String, String> {
    let json = serde_json::to_string(value).map_err(|e| format!("serialize error: {}", e))?;
    Ok(hash_string(&json))
}

/// Combine component digests into one.
pub fn composite_hash(components: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for c in components {
        hasher.update(c.as_bytes());
        hasher.update(b"\0");
    }
    render(hasher.finalize())
}
