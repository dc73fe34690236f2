use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

/// Check that `dir` exists and accepts new files.
///
/// Creates a uniquely named probe file and removes it again. Never errors:
/// any failure along the way reads as "not writable".
pub fn is_writable(dir: &Path) -> bool {
    if !dir.is_dir() {
        tracing::debug!("{} is not a directory", dir.display());
        return false;
    }

    let probe = dir.join(format!(
        ".mtasts-probe-{}-{}",
        std::process::id(),
        chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ));

    let written = match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(mut file) => file.write_all(b"probe").and_then(|_| file.sync_all()),
        Err(e) => {
            tracing::debug!("Cannot create probe in {}: {}", dir.display(), e);
            return false;
        }
    };

    let removed = fs::remove_file(&probe);
    if let Err(e) = &removed {
        tracing::warn!("Failed to remove probe file {}: {}", probe.display(), e);
    }

    written.is_ok() && removed.is_ok()
}
