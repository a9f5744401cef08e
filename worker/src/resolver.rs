// worker/src/resolver.rs
//! Locates the ffmpeg executable.
//!
//! Lookup order: explicit override, system install, development copy under
//! `./bin`, then the copy bundled next to the running executable. The first
//! hit is cached until it disappears from disk.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use log::{debug, info, warn};

use crate::error::{OptimizeError, OptimizeResult};

#[cfg(windows)]
const BINARY_NAME: &str = "ffmpeg.exe";
#[cfg(not(windows))]
const BINARY_NAME: &str = "ffmpeg";

#[cfg(target_os = "macos")]
const SYSTEM_CANDIDATES: &[&str] = &["/opt/homebrew/bin/ffmpeg", "/usr/local/bin/ffmpeg"];
#[cfg(windows)]
const SYSTEM_CANDIDATES: &[&str] = &[r"C:\ffmpeg\bin\ffmpeg.exe", r"C:\Program Files\ffmpeg\bin\ffmpeg.exe"];
#[cfg(not(any(target_os = "macos", windows)))]
const SYSTEM_CANDIDATES: &[&str] = &["/usr/bin/ffmpeg", "/usr/local/bin/ffmpeg"];

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    /// Wins over every other candidate. A missing override is an error, not
    /// a reason to fall back.
    pub override_path: Option<PathBuf>,
    pub system_paths: Vec<PathBuf>,
    pub dev_mode: bool,
    pub dev_dir: PathBuf,
    pub packaged_dir: Option<PathBuf>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        ResolverSettings {
            override_path: None,
            system_paths: SYSTEM_CANDIDATES.iter().map(PathBuf::from).collect(),
            dev_mode: cfg!(debug_assertions),
            dev_dir: std::env::current_dir()
                .map(|d| d.join("bin"))
                .unwrap_or_else(|_| PathBuf::from("bin")),
            packaged_dir: std::env::current_exe()
                .ok()
                .and_then(|exe| exe.parent().map(Path::to_path_buf)),
        }
    }
}

impl ResolverSettings {
    /// Candidates in priority order, excluding the override.
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut out = self.system_paths.clone();
        if self.dev_mode {
            out.push(self.dev_dir.join(BINARY_NAME));
        }
        if let Some(dir) = &self.packaged_dir {
            out.push(dir.join(BINARY_NAME));
            out.push(dir.join("resources").join(BINARY_NAME));
        }
        out
    }
}

pub struct BinaryResolver {
    settings: ResolverSettings,
    cached: RwLock<Option<PathBuf>>,
}

impl BinaryResolver {
    pub fn new(settings: ResolverSettings) -> Self {
        BinaryResolver {
            settings,
            cached: RwLock::new(None),
        }
    }

    pub fn resolve(&self) -> OptimizeResult<PathBuf> {
        if let Some(path) = self.cached_path() {
            return Ok(path);
        }

        let mut cached = self.cached.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        // Another request may have resolved while we waited for the lock.
        if let Some(path) = cached.as_ref().filter(|p| p.is_file()) {
            return Ok(path.clone());
        }

        let path = self.locate()?;
        ensure_executable(&path)?;
        info!("Using encoder binary at {:?}", path);
        *cached = Some(path.clone());
        Ok(path)
    }

    fn cached_path(&self) -> Option<PathBuf> {
        let cached = self.cached.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        match cached.as_ref() {
            Some(path) if path.is_file() => Some(path.clone()),
            Some(path) => {
                warn!("Cached encoder binary {:?} no longer exists, resolving again", path);
                None
            }
            None => None,
        }
    }

    fn locate(&self) -> OptimizeResult<PathBuf> {
        if let Some(explicit) = &self.settings.override_path {
            if explicit.is_file() {
                debug!("Encoder override {:?} found", explicit);
                return Ok(explicit.clone());
            }
            warn!("Encoder override {:?} does not exist", explicit);
            return Err(OptimizeError::BinaryNotFound {
                searched: vec![explicit.clone()],
            });
        }

        let candidates = self.settings.candidates();
        for candidate in &candidates {
            if candidate.is_file() {
                return Ok(candidate.clone());
            }
            debug!("Encoder candidate {:?} not present", candidate);
        }
        Err(OptimizeError::BinaryNotFound { searched: candidates })
    }
}

#[cfg(unix)]
fn ensure_executable(path: &Path) -> OptimizeResult<()> {
    use std::os::unix::fs::PermissionsExt;

    let not_executable = |reason: String| OptimizeError::BinaryNotExecutable {
        path: path.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(path).map_err(|e| not_executable(e.to_string()))?;
    let mut permissions = metadata.permissions();
    if permissions.mode() & 0o111 != 0 {
        return Ok(());
    }

    info!("Encoder binary {:?} lacks the executable bit, setting it", path);
    permissions.set_mode(permissions.mode() | 0o755);
    std::fs::set_permissions(path, permissions)
        .map_err(|e| not_executable(format!("failed to set executable bit: {}", e)))
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) -> OptimizeResult<()> {
    Ok(())
}
