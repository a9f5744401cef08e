use std::io::ErrorKind;
use std::path::Path;

use log::{debug, warn};
use tempfile::{Builder, TempPath};

use crate::error::{OptimizeError, OptimizeResult};

pub const FALLBACK_EXTENSION: &str = "bin";
const MAX_EXTENSION_LEN: usize = 10;

/// Creates an empty `<dir>/<prefix>_<random>.<ext>` owned by one job. The
/// returned path is deleted when dropped; [`release`] does it eagerly.
pub fn reserve(dir: &Path, prefix: &str, extension: &str) -> OptimizeResult<TempPath> {
    Builder::new()
        .prefix(&format!("{}_", prefix))
        .suffix(&format!(".{}", extension))
        .tempfile_in(dir)
        .map(|file| file.into_temp_path())
        .map_err(|e| OptimizeError::io(format!("failed to create temporary {} file in {:?}", prefix, dir), e))
}

/// Deletes a scratch file. Failures are logged and never reach the caller.
pub fn release(path: TempPath) {
    let shown = path.to_path_buf();
    match path.close() {
        Ok(()) => debug!("Removed temporary file {:?}", shown),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temporary file {:?}: {}", shown, e),
    }
}

/// Extension to use for the uploaded input, taken from the client's file
/// name. Anything that is not a short alphanumeric token is replaced.
pub fn extension_hint(file_name: Option<&str>) -> String {
    file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= MAX_EXTENSION_LEN && ext.bytes().all(|b| b.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reserved_names_are_unique() {
        let dir = TempDir::new().unwrap();
        let a = reserve(dir.path(), "input", "mp4").unwrap();
        let b = reserve(dir.path(), "input", "mp4").unwrap();
        assert_ne!(a.to_path_buf(), b.to_path_buf());
        assert!(a.starts_with(dir.path()));
        assert_eq!(a.extension().unwrap(), "mp4");
        let name = a.file_name().unwrap().to_str().unwrap().to_string();
        assert!(name.starts_with("input_"), "{}", name);
    }

    #[test]
    fn release_removes_written_file() {
        let dir = TempDir::new().unwrap();
        let scratch = reserve(dir.path(), "output", "webm").unwrap();
        std::fs::write(&scratch, b"data").unwrap();
        let path = scratch.to_path_buf();
        release(scratch);
        assert!(!path.exists());
    }

    #[test]
    fn release_tolerates_missing_file() {
        let dir = TempDir::new().unwrap();
        let scratch = reserve(dir.path(), "output", "mkv").unwrap();
        std::fs::remove_file(&scratch).unwrap();
        release(scratch);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn drop_removes_file_without_release() {
        let dir = TempDir::new().unwrap();
        drop(reserve(dir.path(), "input", "mov").unwrap());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let dir = TempDir::new().unwrap();
        let err = reserve(&dir.path().join("gone"), "input", "mp4").unwrap_err();
        assert_eq!(err.kind(), "io");
    }

    #[test]
    fn extension_hint_is_sanitized() {
        assert_eq!(extension_hint(Some("holiday.MOV")), "mov");
        assert_eq!(extension_hint(Some("clip.final.mp4")), "mp4");
        assert_eq!(extension_hint(Some("noext")), FALLBACK_EXTENSION);
        assert_eq!(extension_hint(Some("evil.mp4;rm")), FALLBACK_EXTENSION);
        assert_eq!(extension_hint(Some("../../etc/passwd")), FALLBACK_EXTENSION);
        assert_eq!(extension_hint(Some("x.averyverylongext")), FALLBACK_EXTENSION);
        assert_eq!(extension_hint(None), FALLBACK_EXTENSION);
    }
}
