//! On-disk layout of generated manifests.
//!
//! ```text
//! <root>/
//!   infrastructure/docker-compose.yaml
//!   infrastructure/.grund.lock
//!   <service>/docker-compose.yaml
//! ```
//!
//! Manifests accumulate across runs: discovery picks up every unit directory
//! that holds a manifest, whichever run wrote it.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use grund_common::constants::{INFRASTRUCTURE_UNIT, LOCK_FILE_NAME, MANIFEST_FILE_NAME};
use grund_common::error::{GrundError, Result};

use super::model::ComposeFile;

/// Paths of the manifest tree under one root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLayout {
    root: PathBuf,
}

impl ManifestLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Manifest path of a unit.
    #[must_use]
    pub fn manifest_path(&self, unit: &str) -> PathBuf {
        self.root.join(unit).join(MANIFEST_FILE_NAME)
    }

    /// Manifest path of the shared infrastructure unit.
    #[must_use]
    pub fn infrastructure_path(&self) -> PathBuf {
        self.manifest_path(INFRASTRUCTURE_UNIT)
    }

    /// Lock file guarding the shared infrastructure manifest.
    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        self.root.join(INFRASTRUCTURE_UNIT).join(LOCK_FILE_NAME)
    }

    /// Blocks until this process holds the shared infrastructure lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock file cannot be created or locked.
    pub fn lock(&self) -> Result<ManifestLock> {
        let path = self.lock_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| GrundError::io(parent, e))?;
        }
        let file = File::create(&path).map_err(|e| GrundError::io(&path, e))?;
        file.lock_exclusive().map_err(|source| GrundError::Lock {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "acquired manifest lock");
        Ok(ManifestLock { file, path })
    }
}

/// Exclusive lock on the shared infrastructure manifest, released on drop.
#[derive(Debug)]
pub struct ManifestLock {
    file: File,
    path: PathBuf,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release manifest lock");
        }
    }
}

/// The manifests that exist on disk for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestSet {
    /// Shared infrastructure manifest, if any infrastructure was ever generated.
    pub infrastructure: Option<PathBuf>,
    /// Service manifests by service name.
    pub services: BTreeMap<String, PathBuf>,
}

impl ManifestSet {
    /// Scans `layout` for manifests left by earlier runs.
    ///
    /// A missing root yields an empty set.
    ///
    /// # Errors
    ///
    /// Returns an error if the root exists but cannot be listed.
    pub fn discover(layout: &ManifestLayout) -> Result<Self> {
        let mut set = Self::default();
        let root = layout.root();
        if !root.exists() {
            return Ok(set);
        }

        let entries = fs::read_dir(root).map_err(|e| GrundError::io(root, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| GrundError::io(root, e))?;
            let dir = entry.path();
            let manifest = dir.join(MANIFEST_FILE_NAME);
            if !dir.is_dir() || !manifest.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == INFRASTRUCTURE_UNIT {
                set.infrastructure = Some(manifest);
            } else {
                let _ = set.services.insert(name, manifest);
            }
        }

        tracing::debug!(
            root = %root.display(),
            infrastructure = set.infrastructure.is_some(),
            services = set.services.len(),
            "discovered manifests"
        );
        Ok(set)
    }

    /// Returns `true` if no manifest exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infrastructure.is_none() && self.services.is_empty()
    }

    /// All manifest paths, shared infrastructure first, then services by name.
    #[must_use]
    pub fn files(&self) -> Vec<&Path> {
        self.infrastructure
            .iter()
            .chain(self.services.values())
            .map(PathBuf::as_path)
            .collect()
    }
}

/// Reads and parses a manifest; a missing file is `None`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn read_manifest(path: &Path) -> Result<Option<ComposeFile>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|e| GrundError::io(path, e))?;
    ComposeFile::from_yaml(path, &content).map(Some)
}

/// Writes a manifest atomically, skipping the write if nothing changed.
///
/// Returns whether the file was written.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot
/// be written or renamed into place.
pub fn write_manifest(path: &Path, manifest: &ComposeFile) -> Result<bool> {
    let content = manifest.to_yaml()?;
    if fs::read_to_string(path).is_ok_and(|existing| existing == content) {
        tracing::debug!(path = %path.display(), "manifest unchanged");
        return Ok(false);
    }

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir).map_err(|e| GrundError::io(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| GrundError::io(dir, e))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| GrundError::io(tmp.path(), e))?;
    let _ = tmp
        .persist(path)
        .map_err(|e| GrundError::io(path, e.error))?;

    tracing::info!(path = %path.display(), "wrote manifest");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use grund_common::constants::GENERATED_MARKER;

    use super::*;
    use crate::manifest::model::ComposeService;

    fn manifest(unit: &str) -> ComposeFile {
        let mut file = ComposeFile::default();
        let _ = file.services.insert(
            unit.into(),
            ComposeService {
                image: Some(format!("{unit}:latest")),
                ..ComposeService::default()
            },
        );
        file
    }

    #[test]
    fn discover_missing_root_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ManifestLayout::new(dir.path().join("absent"));
        let set = ManifestSet::discover(&layout).expect("discover");
        assert!(set.is_empty());
    }

    #[test]
    fn discover_finds_infrastructure_and_services() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ManifestLayout::new(dir.path());
        let _ = write_manifest(&layout.infrastructure_path(), &manifest("postgres")).expect("w");
        let _ = write_manifest(&layout.manifest_path("api"), &manifest("api")).expect("w");
        fs::create_dir_all(dir.path().join("empty")).expect("mkdir");

        let set = ManifestSet::discover(&layout).expect("discover");
        assert_eq!(set.infrastructure, Some(layout.infrastructure_path()));
        assert_eq!(set.services.keys().collect::<Vec<_>>(), vec!["api"]);
        assert_eq!(set.files().len(), 2);
        assert_eq!(set.files()[0], layout.infrastructure_path());
    }

    #[test]
    fn write_then_read_preserves_content_and_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api").join(MANIFEST_FILE_NAME);
        assert!(write_manifest(&path, &manifest("api")).expect("write"));

        let raw = fs::read_to_string(&path).expect("read");
        assert!(raw.starts_with(GENERATED_MARKER));
        let back = read_manifest(&path).expect("read").expect("present");
        assert_eq!(back, manifest("api"));
    }

    #[test]
    fn unchanged_manifest_is_not_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api").join(MANIFEST_FILE_NAME);
        assert!(write_manifest(&path, &manifest("api")).expect("write"));
        assert!(!write_manifest(&path, &manifest("api")).expect("write"));
        assert!(write_manifest(&path, &manifest("other")).expect("write"));
    }

    #[test]
    fn read_missing_manifest_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(
            read_manifest(&dir.path().join("nope.yaml"))
                .expect("read")
                .is_none()
        );
    }

    #[test]
    fn lock_can_be_reacquired_after_drop() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ManifestLayout::new(dir.path());
        let first = layout.lock().expect("lock");
        drop(first);
        let _second = layout.lock().expect("relock");
        assert!(layout.lock_path().exists());
    }

    #[test]
    fn held_lock_excludes_other_handles_until_dropped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let layout = ManifestLayout::new(dir.path());
        let guard = layout.lock().expect("lock");

        let other = File::open(layout.lock_path()).expect("open lock file");
        assert!(FileExt::try_lock_exclusive(&other).is_err());

        drop(guard);
        FileExt::try_lock_exclusive(&other).expect("lock after release");
        FileExt::unlock(&other).expect("unlock");
    }
}
