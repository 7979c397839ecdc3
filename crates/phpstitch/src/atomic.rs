//! Write-then-rename output files
//!
//! Output is written to a uniquely named temporary file next to the target
//! and renamed over it only once complete. A failed build never leaves a
//! partial file at the target path, and an existing target stays untouched.

use std::{
    fs::File,
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;

use crate::error::{BuildStage, BundleError, Result};

#[derive(Debug)]
pub struct AtomicOutput {
    target: PathBuf,
    temp: NamedTempFile,
}

impl AtomicOutput {
    /// Create the temporary file in the target's directory
    pub fn create(target: &Path) -> Result<Self> {
        let dir = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let base = target
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                BundleError::configuration(format!(
                    "output path {} has no file name",
                    target.display()
                ))
            })?;

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{base}."))
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(|e| BundleError::write(BuildStage::Init, target, e))?;
        set_mode(temp.path(), 0o644).map_err(|e| BundleError::write(BuildStage::Init, target, e))?;

        log::debug!("Writing {} via {}", target.display(), temp.path().display());
        Ok(Self {
            target: target.to_path_buf(),
            temp,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn file(&mut self) -> &mut File {
        self.temp.as_file_mut()
    }

    /// Rename the temporary file onto the target
    pub fn commit(self, executable: bool) -> Result<PathBuf> {
        let Self { target, temp } = self;
        temp.as_file()
            .sync_all()
            .map_err(|e| BundleError::write(BuildStage::Promoting, &target, e))?;

        // a failed persist hands the file back; dropping it deletes it
        temp.persist(&target).map_err(|e| BundleError::Promotion {
            path: target.clone(),
            source: e.error,
        })?;

        if executable {
            set_mode(&target, 0o755).map_err(|source| BundleError::Promotion {
                path: target.clone(),
                source,
            })?;
        }
        Ok(target)
    }

    /// Delete the temporary file
    pub fn discard(self) {
        let temp_path = self.temp.path().to_path_buf();
        if let Err(e) = self.temp.close() {
            log::warn!(
                "Failed to remove temporary file {}: {e}",
                temp_path.display()
            );
        }
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}
