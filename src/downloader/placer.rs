// Artifact placement - where the finished file is saved

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use super::traits::ArtifactPlacer;

/// Append the first allowed extension when the chosen one is missing or not allowed
pub fn normalize_extension(path: &Path, allowed: &[&str]) -> PathBuf {
    let Some(preferred) = allowed.first() else {
        return path.to_path_buf();
    };

    let current = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match current {
        Some(ext) if allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)) => path.to_path_buf(),
        _ => {
            let mut name = path.as_os_str().to_os_string();
            name.push(".");
            name.push(preferred);
            PathBuf::from(name)
        }
    }
}

/// Non-interactive placement into a fixed directory
pub struct DirectoryPlacer {
    dir: PathBuf,
}

impl DirectoryPlacer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ArtifactPlacer for DirectoryPlacer {
    async fn choose_destination(
        &self,
        suggested_name: &str,
        allowed_extensions: &[&str],
    ) -> Option<PathBuf> {
        let path = normalize_extension(&self.dir.join(suggested_name), allowed_extensions);
        debug!("[Placer] Destination {}", path.display());
        Some(path)
    }
}

/// Always dismisses the prompt
pub struct DismissingPlacer;

#[async_trait]
impl ArtifactPlacer for DismissingPlacer {
    async fn choose_destination(&self, suggested_name: &str, _allowed: &[&str]) -> Option<PathBuf> {
        info!("[Placer] Dismissed save prompt for {}", suggested_name);
        None
    }
}

/// Native save dialog
///
/// The dialog cannot be closed from code. If the run is canceled while it is
/// open, the pipeline reports `Canceled` right away and the dialog stays on
/// screen until the user dismisses it; whatever is picked then is discarded.
#[cfg(feature = "dialog")]
pub struct DialogPlacer {
    start_dir: Option<PathBuf>,
}

#[cfg(feature = "dialog")]
impl DialogPlacer {
    pub fn new(start_dir: Option<PathBuf>) -> Self {
        Self { start_dir }
    }
}

#[cfg(feature = "dialog")]
#[async_trait]
impl ArtifactPlacer for DialogPlacer {
    async fn choose_destination(
        &self,
        suggested_name: &str,
        allowed_extensions: &[&str],
    ) -> Option<PathBuf> {
        let name = suggested_name.to_string();
        let extensions: Vec<String> = allowed_extensions.iter().map(|e| e.to_string()).collect();
        let start_dir = self.start_dir.clone();

        // The blocking dialog owns its own event loop for the duration
        let chosen = tokio::task::spawn_blocking(move || {
            let mut dialog = rfd::FileDialog::new()
                .set_title("Save download")
                .set_file_name(name)
                .add_filter("Media", &extensions);
            if let Some(dir) = start_dir {
                dialog = dialog.set_directory(dir);
            }
            dialog.save_file()
        })
        .await
        .ok()
        .flatten()?;

        let path = normalize_extension(&chosen, allowed_extensions);
        info!("[Placer] User chose {}", path.display());
        Some(path)
    }
}
