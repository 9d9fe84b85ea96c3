use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::HostError;

/// Makes throwaway copies of the module binary so the host never maps the
/// canonical file. The build can then overwrite the canonical file at any
/// time, even on platforms that lock mapped binaries.
///
/// Copies are named `<stem>-hot-<seq>.<ext>` with a sequence that only grows,
/// so a name is never reused while the process lives.
#[derive(Debug)]
pub struct ShadowCopyManager {
    canonical: PathBuf,
    shadow_dir: PathBuf,
    copy_sequence: usize,
    outstanding: Vec<PathBuf>,
    mapped: HashSet<PathBuf>,
    #[cfg(target_os = "macos")]
    codesigner: crate::codesign::CodeSigner,
}

impl ShadowCopyManager {
    /// `canonical` is the path the build writes to. A relative path that does
    /// not exist from the current directory is looked up in its parents,
    /// which helps when the host was started from inside the project.
    /// Copies land in `shadow_dir`, or next to the canonical binary.
    pub fn new(canonical: impl AsRef<Path>, shadow_dir: Option<PathBuf>) -> Result<Self, HostError> {
        let canonical = find_file_or_dir_in_parent_directories(canonical.as_ref());
        let shadow_dir = match shadow_dir {
            Some(dir) => dir,
            None => canonical
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        };
        if !shadow_dir.is_dir() {
            return Err(HostError::Config(format!(
                "shadow directory {shadow_dir:?} does not exist"
            )));
        }
        log::debug!("canonical module binary at {canonical:?}, shadow copies in {shadow_dir:?}");

        Ok(Self {
            canonical,
            shadow_dir,
            copy_sequence: 0,
            outstanding: Vec::new(),
            mapped: HashSet::new(),
            #[cfg(target_os = "macos")]
            codesigner: crate::codesign::CodeSigner::new(),
        })
    }

    pub fn canonical_path(&self) -> &Path {
        &self.canonical
    }

    /// Sequence number of the most recent copy, 0 before the first one.
    pub fn copy_sequence(&self) -> usize {
        self.copy_sequence
    }

    /// Copies that have been made and not yet discarded.
    pub fn outstanding(&self) -> &[PathBuf] {
        &self.outstanding
    }

    pub fn is_mapped(&self, path: &Path) -> bool {
        self.mapped.contains(path)
    }

    /// Copies the canonical binary to a fresh, never used path.
    pub fn make_shadow_copy(&mut self) -> Result<PathBuf, HostError> {
        self.copy_sequence += 1;
        let target = shadow_path(&self.canonical, &self.shadow_dir, self.copy_sequence);

        log::debug!("copying {:?} -> {target:?}", self.canonical);
        fs::copy(&self.canonical, &target).map_err(|source| HostError::CopyFailed {
            from: self.canonical.clone(),
            to: target.clone(),
            source,
        })?;

        #[cfg(target_os = "macos")]
        self.codesigner.sign(&target);

        self.outstanding.push(target.clone());
        Ok(target)
    }

    /// Records that a live handle maps `path`.
    pub fn mark_mapped(&mut self, path: &Path) {
        self.mapped.insert(path.to_path_buf());
    }

    /// Records that the handle mapping `path` has been unloaded.
    pub fn mark_unmapped(&mut self, path: &Path) {
        self.mapped.remove(path);
    }

    /// Deletes a shadow copy. Deleting a copy that is still mapped is a bug in
    /// the caller and reported as [`HostError::DeleteFailed`].
    pub fn discard(&mut self, path: &Path) -> Result<(), HostError> {
        if self.mapped.contains(path) {
            return Err(HostError::DeleteFailed {
                path: path.to_path_buf(),
                reason: "still mapped by a loaded module".to_string(),
            });
        }

        if path.exists() {
            log::trace!("removing {path:?}");
            fs::remove_file(path).map_err(|err| HostError::DeleteFailed {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
        }
        self.outstanding.retain(|p| p != path);
        Ok(())
    }

    /// Discards every outstanding copy that is not mapped. Used for cleanup
    /// after a failed reload; errors are logged, not returned.
    pub fn discard_unmapped(&mut self) {
        let unmapped: Vec<PathBuf> = self
            .outstanding
            .iter()
            .filter(|p| !self.mapped.contains(*p))
            .cloned()
            .collect();
        for path in unmapped {
            if let Err(err) = self.discard(&path) {
                log::warn!("{err}");
            }
        }
    }
}

/// Removes copies that are left over.
impl Drop for ShadowCopyManager {
    fn drop(&mut self) {
        self.discard_unmapped();
    }
}

fn shadow_path(canonical: &Path, shadow_dir: &Path, sequence: usize) -> PathBuf {
    let stem = canonical
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "module".to_string());
    match canonical.extension() {
        Some(ext) => shadow_dir.join(format!("{stem}-hot-{sequence}.{}", ext.to_string_lossy())),
        None => shadow_dir.join(format!("{stem}-hot-{sequence}")),
    }
}

/// Platform file name of the shared library built for crate `lib_name` in
/// `lib_dir`, e.g. `target/debug/libdemo_module.so`.
pub fn canonical_library_path(lib_dir: impl AsRef<Path>, lib_name: impl AsRef<str>) -> PathBuf {
    #[cfg(target_os = "macos")]
    let (prefix, ext) = ("lib", "dylib");
    #[cfg(target_os = "windows")]
    let (prefix, ext) = ("", "dll");
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let (prefix, ext) = ("lib", "so");

    let lib_name = lib_name.as_ref().replace('-', "_");
    lib_dir
        .as_ref()
        .join(format!("{prefix}{lib_name}"))
        .with_extension(ext)
}

/// Walks up from the current directory to find a relative path such as
/// `target/debug/libdemo_module.so`. Returns the input unchanged when nothing
/// is found; copying will then report the missing file.
fn find_file_or_dir_in_parent_directories(file: &Path) -> PathBuf {
    if file.exists() || !file.is_relative() {
        return file.to_path_buf();
    }
    if let Ok(cwd) = std::env::current_dir() {
        let mut parent_dir = Some(cwd.as_path());
        while let Some(dir) = parent_dir {
            if dir.join(file).exists() {
                return dir.join(file);
            }
            parent_dir = dir.parent();
        }
    }
    file.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_in(dir: &Path) -> PathBuf {
        let path = dir.join("libmodule.so");
        fs::write(&path, b"version 1").unwrap();
        path
    }

    #[test]
    fn test_copies_get_unique_increasing_names() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = canonical_in(dir.path());
        let mut shadow = ShadowCopyManager::new(&canonical, None).unwrap();
        assert_eq!(shadow.copy_sequence(), 0);

        let first = shadow.make_shadow_copy().unwrap();
        let second = shadow.make_shadow_copy().unwrap();
        assert_eq!(first, dir.path().join("libmodule-hot-1.so"));
        assert_eq!(second, dir.path().join("libmodule-hot-2.so"));
        assert_eq!(shadow.copy_sequence(), 2);
        assert_eq!(fs::read(&first).unwrap(), b"version 1");

        // discarding does not free the name for reuse
        shadow.discard(&second).unwrap();
        let third = shadow.make_shadow_copy().unwrap();
        assert_eq!(third, dir.path().join("libmodule-hot-3.so"));
    }

    #[test]
    fn test_canonical_can_be_overwritten_while_copy_exists() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = canonical_in(dir.path());
        let mut shadow = ShadowCopyManager::new(&canonical, None).unwrap();
        let copy = shadow.make_shadow_copy().unwrap();

        fs::write(&canonical, b"version 2").unwrap();
        assert_eq!(fs::read(&copy).unwrap(), b"version 1");
        let copy = shadow.make_shadow_copy().unwrap();
        assert_eq!(fs::read(&copy).unwrap(), b"version 2");
    }

    #[test]
    fn test_missing_canonical_is_copy_failed() {
        let dir = tempfile::tempdir().unwrap();
        let mut shadow = ShadowCopyManager::new(dir.path().join("libnothing.so"), None).unwrap();
        let err = shadow.make_shadow_copy().unwrap_err();
        assert!(matches!(err, HostError::CopyFailed { .. }));
        assert!(shadow.outstanding().is_empty());
    }

    #[test]
    fn test_discard_refuses_mapped_copy() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = canonical_in(dir.path());
        let mut shadow = ShadowCopyManager::new(&canonical, None).unwrap();
        let copy = shadow.make_shadow_copy().unwrap();

        shadow.mark_mapped(&copy);
        let err = shadow.discard(&copy).unwrap_err();
        assert!(matches!(err, HostError::DeleteFailed { .. }));
        assert!(copy.exists());

        shadow.mark_unmapped(&copy);
        shadow.discard(&copy).unwrap();
        assert!(!copy.exists());
        assert!(shadow.outstanding().is_empty());
    }

    #[test]
    fn test_drop_removes_unmapped_copies_only() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = canonical_in(dir.path());
        let shadow_dir = dir.path().join("shadow");
        fs::create_dir(&shadow_dir).unwrap();

        let mut shadow = ShadowCopyManager::new(&canonical, Some(shadow_dir.clone())).unwrap();
        let kept = shadow.make_shadow_copy().unwrap();
        let removed = shadow.make_shadow_copy().unwrap();
        assert!(kept.starts_with(&shadow_dir));
        shadow.mark_mapped(&kept);
        drop(shadow);

        assert!(kept.exists());
        assert!(!removed.exists());
        assert!(canonical.exists());
    }

    #[test]
    fn test_missing_shadow_dir_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let canonical = canonical_in(dir.path());
        let err = ShadowCopyManager::new(&canonical, Some(dir.path().join("nope"))).unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn test_canonical_library_path() {
        let path = canonical_library_path("target/debug", "demo-module");
        #[cfg(target_os = "linux")]
        assert_eq!(path, PathBuf::from("target/debug/libdemo_module.so"));
        #[cfg(target_os = "macos")]
        assert_eq!(path, PathBuf::from("target/debug/libdemo_module.dylib"));
        #[cfg(target_os = "windows")]
        assert_eq!(path, PathBuf::from("target/debug/demo_module.dll"));
    }
}
