use super::{DecompressBackend, MAX_LAYERS, file_is_gzip, target_path};
use crate::error::{ReportError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

/// 7-Zip command-line backend
pub struct SevenZipBackend {
    configured: Option<PathBuf>,
    resolved: OnceLock<Option<PathBuf>>,
}

impl SevenZipBackend {
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            resolved: OnceLock::new(),
        }
    }

    /// Executables to probe, most specific first
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = self.configured.iter().cloned().collect();
        candidates.push(PathBuf::from("7z"));
        candidates.push(PathBuf::from("7za"));

        if cfg!(windows) {
            for var in ["ProgramFiles", "ProgramW6432", "ProgramFiles(x86)"] {
                if let Some(root) = std::env::var_os(var) {
                    let exe = PathBuf::from(root).join("7-Zip").join("7z.exe");
                    if !candidates.contains(&exe) {
                        candidates.push(exe);
                    }
                }
            }
        }

        candidates
    }

    /// First candidate that answers `7z i`, cached for the rest of the run
    pub fn executable(&self) -> Option<&Path> {
        self.resolved
            .get_or_init(|| {
                self.candidates().into_iter().find(|candidate| {
                    let ok = Command::new(candidate)
                        .arg("i")
                        .stdin(Stdio::null())
                        .stdout(Stdio::null())
                        .stderr(Stdio::null())
                        .status()
                        .map(|s| s.success())
                        .unwrap_or(false);
                    tracing::debug!("7-Zip probe {}: {}", candidate.display(), ok);
                    ok
                })
            })
            .as_deref()
    }

    fn run(&self, program: &Path, archive: &Path, dest: &Path) -> Result<()> {
        let output = Command::new(program)
            .arg("e")
            .arg("-y")
            .arg(format!("-o{}", dest.display()))
            .arg(archive)
            .stdin(Stdio::null())
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReportError::ExtractError {
                file: archive.to_path_buf(),
                reason: format!("7-Zip exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }

    /// Peel gzip layers inside `staging` until the member is no longer gzip
    fn unwrap_layers(&self, program: &Path, archive: &Path, staging: &Path) -> Result<PathBuf> {
        let mut current = archive.to_path_buf();

        for layer in 0..MAX_LAYERS {
            let layer_dir = staging.join(layer.to_string());
            fs::create_dir_all(&layer_dir)?;
            self.run(program, &current, &layer_dir)?;

            let member = single_member(&layer_dir).map_err(|reason| ReportError::ExtractError {
                file: archive.to_path_buf(),
                reason,
            })?;

            if !file_is_gzip(&member)? {
                return Ok(member);
            }
            tracing::debug!("{}: unwrapping nested layer {}", archive.display(), layer + 1);
            current = member;
        }

        Err(ReportError::ExtractError {
            file: archive.to_path_buf(),
            reason: format!("more than {} nested gzip layers", MAX_LAYERS),
        })
    }
}

fn single_member(dir: &Path) -> std::result::Result<PathBuf, String> {
    let mut members: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| e.to_string())?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();

    match members.len() {
        1 => Ok(members.remove(0)),
        0 => Err("archive is empty".into()),
        n => Err(format!("expected one member, found {}", n)),
    }
}

impl DecompressBackend for SevenZipBackend {
    fn name(&self) -> &'static str {
        "7-Zip"
    }

    fn is_available(&self) -> bool {
        self.executable().is_some()
    }

    fn extract(&self, archive: &Path, out_dir: &Path) -> Result<PathBuf> {
        let program = self
            .executable()
            .ok_or_else(|| ReportError::ExtractError {
                file: archive.to_path_buf(),
                reason: "7-Zip executable not found".into(),
            })?
            .to_path_buf();
        let target = target_path(archive, out_dir)?;

        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = out_dir.join(format!(".{}.staging", file_name));
        fs::create_dir_all(&staging)?;

        let result = self
            .unwrap_layers(&program, archive, &staging)
            .and_then(|member| Ok(fs::rename(member, &target)?));

        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::warn!("Failed to remove {}: {}", staging.display(), e);
        }

        result.map(|_| target)
    }
}
