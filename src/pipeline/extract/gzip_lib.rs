use super::{DecompressBackend, MAX_LAYERS, is_gzip, target_path};
use crate::error::{ReportError, Result};
use flate2::read::MultiGzDecoder;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Largest decompressed layer accepted from one archive. TLS-RPT reports
/// are a few kilobytes; anything near this is not a report.
pub const MAX_DECOMPRESSED_BYTES: u64 = 64 * 1024 * 1024;

/// In-process gzip decoder
pub struct GzipLibBackend;

fn decode(bytes: &[u8], limit: u64) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::new();
    MultiGzDecoder::new(bytes)
        .take(limit.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| e.to_string())?;

    if out.len() as u64 > limit {
        return Err(format!("decompressed size exceeds {} bytes", limit));
    }
    Ok(out)
}

impl DecompressBackend for GzipLibBackend {
    fn name(&self) -> &'static str {
        "gzip library"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<PathBuf> {
        let target = target_path(archive, out_dir)?;
        let fail = |reason: String| ReportError::ExtractError {
            file: archive.to_path_buf(),
            reason,
        };

        let mut data = fs::read(archive)?;
        if !is_gzip(&data) {
            return Err(fail("not a gzip stream".into()));
        }

        let mut layers = 0;
        while is_gzip(&data) {
            if layers == MAX_LAYERS {
                return Err(fail(format!("more than {} nested gzip layers", MAX_LAYERS)));
            }
            data = decode(&data, MAX_DECOMPRESSED_BYTES).map_err(fail)?;
            layers += 1;
        }
        tracing::debug!("{}: {} gzip layer(s)", archive.display(), layers);

        let partial = target.with_extension("json.part");
        fs::write(&partial, &data)?;
        if let Err(e) = fs::rename(&partial, &target) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }

        Ok(target)
    }
}
