use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::warn;

use crate::resolver::ResolverSettings;
use crate::transcoder::TranscoderSettings;

// Configuration Constants
pub const BIND_ADDR_ENV_VAR: &str = "OPTIMIZER_BIND_ADDR";
pub const FFMPEG_PATH_ENV_VAR: &str = "FFMPEG_PATH";
pub const DEV_MODE_ENV_VAR: &str = "OPTIMIZER_DEV_MODE";
pub const TEMP_DIR_ENV_VAR: &str = "OPTIMIZER_TEMP_DIR";
pub const TIMEOUT_ENV_VAR: &str = "OPTIMIZER_TIMEOUT_SECS";
pub const MAX_JOBS_ENV_VAR: &str = "OPTIMIZER_MAX_JOBS";
pub const CAPTURE_LIMIT_ENV_VAR: &str = "OPTIMIZER_CAPTURE_LIMIT_BYTES";
pub const MAX_UPLOAD_ENV_VAR: &str = "OPTIMIZER_MAX_UPLOAD_MB";

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_CAPTURE_LIMIT_BYTES: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_UPLOAD_MB: usize = 2048;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub resolver: ResolverSettings,
    pub transcoder: TranscoderSettings,
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source. Malformed values
    /// are reported and replaced by their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let mut resolver = ResolverSettings::default();
        resolver.override_path = get(FFMPEG_PATH_ENV_VAR).map(PathBuf::from);
        if let Some(raw) = get(DEV_MODE_ENV_VAR) {
            match parse_flag(&raw) {
                Some(flag) => resolver.dev_mode = flag,
                None => warn!("Ignoring {}={:?}: expected a boolean", DEV_MODE_ENV_VAR, raw),
            }
        }

        let default_jobs = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let transcoder = TranscoderSettings {
            temp_dir: get(TEMP_DIR_ENV_VAR)
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            timeout: Duration::from_secs(parsed(TIMEOUT_ENV_VAR, get(TIMEOUT_ENV_VAR), DEFAULT_TIMEOUT_SECS)),
            capture_limit: parsed(CAPTURE_LIMIT_ENV_VAR, get(CAPTURE_LIMIT_ENV_VAR), DEFAULT_CAPTURE_LIMIT_BYTES),
            max_jobs: parsed(MAX_JOBS_ENV_VAR, get(MAX_JOBS_ENV_VAR), default_jobs).max(1),
        };

        let max_upload_mb = parsed(MAX_UPLOAD_ENV_VAR, get(MAX_UPLOAD_ENV_VAR), DEFAULT_MAX_UPLOAD_MB);

        ServiceConfig {
            bind_addr: get(BIND_ADDR_ENV_VAR).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
            resolver,
            transcoder,
        }
    }
}

fn parsed<T>(key: &str, raw: Option<String>, default: T) -> T
where
    T: FromStr,
{
    match raw {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("Ignoring {}={:?}: not a valid number, using default", key, raw);
            default
        }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> ServiceConfig {
        let env: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ServiceConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]);
        assert_eq!(c.bind_addr, DEFAULT_BIND_ADDR);
        assert_eq!(c.transcoder.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(c.transcoder.capture_limit, DEFAULT_CAPTURE_LIMIT_BYTES);
        assert_eq!(c.transcoder.temp_dir, std::env::temp_dir());
        assert!(c.transcoder.max_jobs >= 1);
        assert_eq!(c.max_upload_bytes, DEFAULT_MAX_UPLOAD_MB * 1024 * 1024);
        assert!(c.resolver.override_path.is_none());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            (BIND_ADDR_ENV_VAR, "0.0.0.0:8080"),
            (FFMPEG_PATH_ENV_VAR, "/opt/ffmpeg/bin/ffmpeg"),
            (DEV_MODE_ENV_VAR, "false"),
            (TEMP_DIR_ENV_VAR, "/var/tmp/optimizer"),
            (TIMEOUT_ENV_VAR, "30"),
            (MAX_JOBS_ENV_VAR, "3"),
            (CAPTURE_LIMIT_ENV_VAR, "4096"),
            (MAX_UPLOAD_ENV_VAR, "16"),
        ]);
        assert_eq!(c.bind_addr, "0.0.0.0:8080");
        assert_eq!(c.resolver.override_path, Some(PathBuf::from("/opt/ffmpeg/bin/ffmpeg")));
        assert!(!c.resolver.dev_mode);
        assert_eq!(c.transcoder.temp_dir, PathBuf::from("/var/tmp/optimizer"));
        assert_eq!(c.transcoder.timeout, Duration::from_secs(30));
        assert_eq!(c.transcoder.max_jobs, 3);
        assert_eq!(c.transcoder.capture_limit, 4096);
        assert_eq!(c.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn malformed_values_fall_back() {
        let c = config(&[(TIMEOUT_ENV_VAR, "soon"), (MAX_JOBS_ENV_VAR, "0"), (FFMPEG_PATH_ENV_VAR, "  ")]);
        assert_eq!(c.transcoder.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(c.transcoder.max_jobs, 1);
        assert!(c.resolver.override_path.is_none());
    }
}
