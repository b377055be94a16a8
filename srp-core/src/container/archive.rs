use crate::codec;
use crate::container::metadata::Metadata;
use crate::error::{PanelError, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const ENTRY_METADATA: &str = "metadata";
pub const ENTRY_VARIANTS: &str = "variants";
pub const ENTRY_IDS: &str = "IDs";
pub const ENTRY_ORIGINAL_IDS: &str = "original_IDs";
pub const ENTRY_SAMPLE_IDS: &str = "sample_ids";
pub const ENTRY_CHUNKS: &str = "chunks";
pub const HAPLOTYPE_PREFIX: &str = "haplotypes/";

pub fn haplotype_entry(chunk_id: u64) -> String {
    format!("{HAPLOTYPE_PREFIX}{chunk_id}")
}

/// Read side of the archive. Entries are addressed by name; each read opens
/// a fresh handle, so concurrent readers of distinct entries are safe.
#[derive(Debug, Clone)]
pub struct ArchiveFile {
    path: PathBuf,
}

impl ArchiveFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_zip(&self) -> Result<ZipArchive<File>> {
        let f = File::open(&self.path)?;
        ZipArchive::new(f)
            .map_err(|e| PanelError::CorruptArchive(format!("{}: {e}", self.path.display())))
    }

    /// Read and decompress a required entry.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.read_optional(name)?.ok_or_else(|| {
            PanelError::CorruptArchive(format!(
                "missing entry '{name}' in {}",
                self.path.display()
            ))
        })
    }

    /// Read and decompress an entry that older archives may lack.
    pub fn read_optional(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let mut zip = self.open_zip()?;
        let mut raw = Vec::new();
        match zip.by_name(name) {
            Ok(mut entry) => {
                entry.read_to_end(&mut raw)?;
            }
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(e) => {
                return Err(PanelError::CorruptArchive(format!("entry '{name}': {e}")));
            }
        }
        codec::decompress(&raw)
            .map(Some)
            .map_err(|_| PanelError::CorruptArchive(format!("entry '{name}' is not a zstd frame")))
    }
}

fn stored() -> FileOptions {
    // Payloads are already zstd frames; the container just stores them.
    FileOptions::default().compression_method(CompressionMethod::Stored)
}

fn put(zip: &mut ZipWriter<File>, name: &str, payload: &[u8]) -> Result<()> {
    zip.start_file(name, stored())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    zip.write_all(payload)?;
    Ok(())
}

fn joined(lines: &[String]) -> String {
    lines.join("\n")
}

/// Split a newline-joined entry back into its lines.
pub fn split_lines(bytes: &[u8]) -> Vec<String> {
    if bytes.is_empty() {
        return Vec::new();
    }
    String::from_utf8_lossy(bytes)
        .split('\n')
        .map(str::to_string)
        .collect()
}

/// Create a fresh archive holding only skeleton entries.
pub fn create_empty(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let f = File::create_new(path)?;
    let mut zip = ZipWriter::new(f);
    put(
        &mut zip,
        ENTRY_METADATA,
        &codec::compress(&Metadata::new_created().to_json()?, codec::LEVEL)?,
    )?;
    put(&mut zip, ENTRY_VARIANTS, &codec::compress(&[], codec::LEVEL)?)?;
    put(&mut zip, ENTRY_SAMPLE_IDS, &codec::compress(&[], codec::LEVEL)?)?;
    put(&mut zip, ENTRY_CHUNKS, &codec::compress(&[], codec::LEVEL)?)?;
    zip.finish()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

/// Everything a full archive rewrite needs besides the staged chunk blobs.
pub struct ArchiveContents<'a> {
    pub metadata: &'a Metadata,
    pub variants: &'a [u8],
    pub ids: &'a [String],
    pub original_ids: &'a [String],
    pub chunks: &'a [u8],
    pub sample_ids: &'a [String],
}

/// Rewrite the archive in one pass: small entries first, then one
/// pre-compressed haplotype blob per chunk from the staging directory.
pub fn write_archive(path: &Path, contents: &ArchiveContents<'_>, hap_dir: &Path) -> Result<()> {
    let f = File::create(path)?;
    let mut zip = ZipWriter::new(f);
    put(
        &mut zip,
        ENTRY_METADATA,
        &codec::compress(&contents.metadata.to_json()?, codec::LEVEL)?,
    )?;
    put(
        &mut zip,
        ENTRY_VARIANTS,
        &codec::compress(contents.variants, codec::LEVEL)?,
    )?;
    put(
        &mut zip,
        ENTRY_IDS,
        &codec::compress(joined(contents.ids).as_bytes(), codec::LEVEL)?,
    )?;
    put(
        &mut zip,
        ENTRY_ORIGINAL_IDS,
        &codec::compress(joined(contents.original_ids).as_bytes(), codec::LEVEL)?,
    )?;
    put(
        &mut zip,
        ENTRY_CHUNKS,
        &codec::compress(contents.chunks, codec::LEVEL)?,
    )?;
    put(
        &mut zip,
        ENTRY_SAMPLE_IDS,
        &codec::compress(joined(contents.sample_ids).as_bytes(), codec::LEVEL)?,
    )?;
    for chunk_id in 0..contents.metadata.n_chunks {
        let blob = fs::read(hap_dir.join(chunk_id.to_string()))?;
        put(&mut zip, &haplotype_entry(chunk_id), &blob)?;
    }
    zip.finish()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_archive_skeleton() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.srp");
        create_empty(&path).unwrap();

        let archive = ArchiveFile::new(&path);
        let meta = Metadata::from_json(&archive.read(ENTRY_METADATA).unwrap()).unwrap();
        assert!(!meta.created_at.is_empty());
        assert!(archive.read(ENTRY_VARIANTS).unwrap().is_empty());
        assert!(archive.read(ENTRY_CHUNKS).unwrap().is_empty());
        // IDs were never written for empty archives
        assert!(archive.read_optional(ENTRY_IDS).unwrap().is_none());
        assert!(matches!(
            archive.read(ENTRY_IDS),
            Err(PanelError::CorruptArchive(_))
        ));
    }

    #[test]
    fn create_refuses_to_clobber() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.srp");
        create_empty(&path).unwrap();
        assert!(create_empty(&path).is_err());
    }

    #[test]
    fn rewrite_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.srp");
        let staging = TempDir::new().unwrap();
        fs::write(
            staging.path().join("0"),
            codec::compress(b"chunk-zero", codec::LEVEL).unwrap(),
        )
        .unwrap();

        let mut meta = Metadata::new_created();
        meta.n_chunks = 1;
        let ids = vec!["a".to_string(), "b".to_string()];
        write_archive(
            &path,
            &ArchiveContents {
                metadata: &meta,
                variants: b"vvvv",
                ids: &ids,
                original_ids: &ids,
                chunks: b"cc",
                sample_ids: &[],
            },
            staging.path(),
        )
        .unwrap();

        let archive = ArchiveFile::new(&path);
        assert_eq!(archive.read(ENTRY_VARIANTS).unwrap(), b"vvvv");
        assert_eq!(
            split_lines(&archive.read(ENTRY_IDS).unwrap()),
            vec!["a", "b"]
        );
        assert!(split_lines(&archive.read(ENTRY_SAMPLE_IDS).unwrap()).is_empty());
        assert_eq!(archive.read(&haplotype_entry(0)).unwrap(), b"chunk-zero");
    }

    #[test]
    fn non_zip_bytes_are_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("panel.srp");
        fs::write(&path, b"this is no zip archive").unwrap();
        assert!(matches!(
            ArchiveFile::new(&path).read(ENTRY_METADATA),
            Err(PanelError::CorruptArchive(_))
        ));
    }
}
