//! Packed asset files and the virtual filesystem over them.
//!
//! A pack begins with the magic `GNP`, a little-endian u32 entry count,
//! one NUL-terminated logical path per entry, then per-entry
//! `(offset, compressed size, uncompressed size)` u32 triples, followed by
//! the concatenated compressed blobs. Blobs are raw-DEFLATE compressed.
//!
//! When a pack is mounted its entries shadow the OS filesystem; unlisted
//! paths fall through to ordinary file reads.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use rustc_hash::FxHashMap;

use crate::errors::{EmberError, Result};

const PACK_MAGIC: &[u8; 3] = b"GNP";

#[derive(Clone, Debug)]
struct PakEntry {
    pack_index: usize,
    offset: u32,
    size: u32,
    uncompressed_size: u32,
}

/// Reads logical paths from mounted packs, falling back to the OS
/// filesystem.
#[derive(Default)]
pub struct PackageFileSystem {
    entries: FxHashMap<String, PakEntry>,
    mounted_packs: Vec<PathBuf>,
}

impl PackageFileSystem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries across all mounted packs.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    /// Unmounts everything.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.mounted_packs.clear();
    }

    /// Mounts a pack file, adding its entries to the lookup table.
    pub fn mount_pak(&mut self, pak_file: impl AsRef<Path>) -> Result<()> {
        let pak_file = pak_file.as_ref();
        let mut reader = std::fs::File::open(pak_file)?;

        let mut magic = [0u8; 3];
        reader.read_exact(&mut magic)?;
        if &magic != PACK_MAGIC {
            return Err(EmberError::AssetParse(format!(
                "not a pack file: {}",
                pak_file.display()
            )));
        }

        let pack_index = self.mounted_packs.len();
        let entry_count = read_u32(&mut reader)? as usize;

        let mut names = Vec::with_capacity(entry_count);
        for _ in 0..entry_count {
            names.push(read_nul_terminated(&mut reader)?);
        }

        for name in names {
            let offset = read_u32(&mut reader)?;
            let size = read_u32(&mut reader)?;
            let uncompressed_size = read_u32(&mut reader)?;
            self.entries.insert(
                name,
                PakEntry {
                    pack_index,
                    offset,
                    size,
                    uncompressed_size,
                },
            );
        }

        self.mounted_packs.push(pak_file.to_path_buf());
        log::info!(
            "mounted pack {} with {entry_count} entries",
            pak_file.display()
        );
        Ok(())
    }

    /// Loads a logical path, preferring mounted packs.
    pub fn load_file(&self, entry: &str) -> Result<Vec<u8>> {
        let Some(pak_entry) = self.entries.get(entry) else {
            // Fall through to the OS filesystem.
            return Ok(std::fs::read(entry)?);
        };

        let mut reader = std::fs::File::open(&self.mounted_packs[pak_entry.pack_index])?;
        let _ = reader.seek(SeekFrom::Start(u64::from(pak_entry.offset)))?;

        let mut compressed = vec![0u8; pak_entry.size as usize];
        reader.read_exact(&mut compressed)?;

        let mut data = Vec::with_capacity(pak_entry.uncompressed_size as usize);
        let _ = DeflateDecoder::new(compressed.as_slice()).read_to_end(&mut data)?;
        if data.len() != pak_entry.uncompressed_size as usize {
            return Err(EmberError::AssetParse(format!(
                "pack entry '{entry}' decompressed to {} bytes, expected {}",
                data.len(),
                pak_entry.uncompressed_size
            )));
        }
        Ok(data)
    }

    /// Packs every file under `src_dir` into `pak_file`, with logical paths
    /// relative to `root_path`.
    pub fn pak_all(
        pak_file: impl AsRef<Path>,
        src_dir: impl AsRef<Path>,
        root_path: impl AsRef<Path>,
    ) -> Result<()> {
        let root_path = root_path.as_ref();

        let mut files = Vec::new();
        collect_files(src_dir.as_ref(), &mut files)?;
        files.sort();

        let mut blobs = Vec::with_capacity(files.len());
        for path in &files {
            let raw = std::fs::read(path)?;
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
            encoder.write_all(&raw)?;
            let compressed = encoder.finish()?;

            let logical = path
                .strip_prefix(root_path)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            log::debug!("entry: {logical} <- {}", path.display());
            blobs.push((logical, raw.len() as u32, compressed));
        }

        let mut writer = std::fs::File::create(pak_file.as_ref())?;
        writer.write_all(PACK_MAGIC)?;
        writer.write_all(&(blobs.len() as u32).to_le_bytes())?;

        for (name, _, _) in &blobs {
            writer.write_all(name.as_bytes())?;
            writer.write_all(&[0])?;
        }

        let table_size = blobs.len() as u32 * 4 * 3;
        let mut offset = writer.stream_position()? as u32 + table_size;
        for (_, uncompressed, compressed) in &blobs {
            writer.write_all(&offset.to_le_bytes())?;
            writer.write_all(&(compressed.len() as u32).to_le_bytes())?;
            writer.write_all(&uncompressed.to_le_bytes())?;
            offset += compressed.len() as u32;
        }

        for (_, _, compressed) in &blobs {
            writer.write_all(compressed)?;
        }

        Ok(())
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

fn read_u32(reader: &mut impl Read) -> Result<u32> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

fn read_nul_terminated(reader: &mut impl Read) -> Result<String> {
    let mut bytes = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        reader.read_exact(&mut byte)?;
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
    }
    String::from_utf8(bytes).map_err(|e| EmberError::AssetParse(e.to_string()))
}
