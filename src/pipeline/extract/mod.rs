//! Archive extraction
//!
//! Turns every `.gz` report archive in the working directory into a `.json`
//! file of the same base name. Backends are tried in priority order; the
//! first one that reports itself available does all the work for the run.

#[cfg(feature = "gzip-lib")]
pub mod gzip_lib;
pub mod seven_zip;

use crate::error::{ReportError, Result};
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Nested gzip layers unwrapped before giving up on an archive
pub const MAX_LAYERS: usize = 4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// A way of decompressing one report archive
pub trait DecompressBackend {
    fn name(&self) -> &'static str;

    fn is_available(&self) -> bool;

    /// Decompress `archive` into `out_dir`, returning the canonical `.json` path
    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<PathBuf>;
}

/// Backends in priority order: 7-Zip first, then the in-process decoder
pub fn default_backends(seven_zip: Option<PathBuf>) -> Vec<Box<dyn DecompressBackend>> {
    let mut backends: Vec<Box<dyn DecompressBackend>> =
        vec![Box::new(seven_zip::SevenZipBackend::new(seven_zip))];

    #[cfg(feature = "gzip-lib")]
    backends.push(Box::new(gzip_lib::GzipLibBackend));

    backends
}

pub fn select_backend(backends: &[Box<dyn DecompressBackend>]) -> Option<&dyn DecompressBackend> {
    backends
        .iter()
        .map(|b| b.as_ref())
        .find(|b| {
            let available = b.is_available();
            tracing::debug!("Backend {}: available={}", b.name(), available);
            available
        })
}

/// `x.json.gz` -> `x.json`, `x.gz` -> `x.json`
pub fn canonical_json_name(archive: &Path) -> Option<String> {
    let name = archive.file_name()?.to_str()?;
    let stem = strip_suffix_ignore_case(name, ".gz")?;
    if stem.is_empty() {
        return None;
    }

    if strip_suffix_ignore_case(stem, ".json").is_some() {
        Some(stem.to_string())
    } else {
        Some(format!("{}.json", stem))
    }
}

pub(crate) fn strip_suffix_ignore_case<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let split = name.len().checked_sub(suffix.len())?;
    if !name.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = name.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// Regular files in `dir` whose name ends with `extension`, sorted by name
pub(crate) fn files_with_extension(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| strip_suffix_ignore_case(n, extension).is_some_and(|s| !s.is_empty()))
        })
        .collect();
    files.sort();
    Ok(files)
}

pub fn find_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    files_with_extension(dir, ".gz")
}

pub(crate) fn is_gzip(bytes: &[u8]) -> bool {
    bytes.starts_with(&GZIP_MAGIC)
}

pub(crate) fn file_is_gzip(path: &Path) -> Result<bool> {
    let mut header = [0u8; 2];
    let mut file = fs::File::open(path)?;
    let read = file.read(&mut header)?;
    Ok(read == 2 && is_gzip(&header))
}

pub(crate) fn target_path(archive: &Path, out_dir: &Path) -> Result<PathBuf> {
    canonical_json_name(archive)
        .map(|name| out_dir.join(name))
        .ok_or_else(|| ReportError::ExtractError {
            file: archive.to_path_buf(),
            reason: "file name is not a .gz archive name".into(),
        })
}

#[derive(Debug, Default)]
pub struct ExtractSummary {
    pub backend: Option<&'static str>,
    /// `(archive, json)` pairs that decompressed cleanly
    pub extracted: Vec<(PathBuf, PathBuf)>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Extract every archive with one backend, isolating per-file failures.
/// An archive whose `.json` name was already produced earlier in the batch
/// (`r.gz` after `r.json.gz`, say) is left on disk and recorded as failed.
pub fn extract_all(
    archives: &[PathBuf],
    out_dir: &Path,
    backend: &dyn DecompressBackend,
) -> ExtractSummary {
    let mut summary = ExtractSummary {
        backend: Some(backend.name()),
        ..Default::default()
    };
    let mut produced: HashSet<PathBuf> = HashSet::new();

    for archive in archives {
        if let Some(target) = target_path(archive, out_dir)
            .ok()
            .filter(|target| produced.contains(target))
        {
            let reason = format!(
                "{} was already produced from another archive",
                target.display()
            );
            tracing::warn!("Extraction of {} skipped: {}", archive.display(), reason);
            summary.failed.push((archive.clone(), reason));
            continue;
        }

        match backend.extract(archive, out_dir) {
            Ok(json) => {
                tracing::debug!("{} -> {}", archive.display(), json.display());
                produced.insert(json.clone());
                summary.extracted.push((archive.clone(), json));
            }
            Err(e) => {
                tracing::warn!("Extraction of {} failed: {}", archive.display(), e);
                summary.failed.push((archive.clone(), e.to_string()));
            }
        }
    }

    summary
}
