// Shared helpers for the integration tests: fake encoders written as shell
// scripts, and a transcoder wired to them.
#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use optimizer_worker::{BinaryResolver, ResolverSettings, Transcoder, TranscoderSettings};

/// Tests that write and then exec scripts run one at a time; a concurrent
/// fork can otherwise hold the script open for writing (ETXTBSY).
pub static SERIAL: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

// Leaves `$in` as the -i value and `$out` as the last argument.
const PARSE_ARGS: &str = r#"in=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then in="$arg"; fi
  prev="$arg"
  out="$arg"
done
"#;

pub const ENCODED_PREFIX: &[u8] = b"encoded:";

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{}{}\n", PARSE_ARGS, body)).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Writes `encoded:` followed by the input bytes.
pub fn copying_encoder(dir: &Path) -> PathBuf {
    write_script(dir, "copy-ffmpeg", r#"{ printf 'encoded:'; cat "$in"; } > "$out""#)
}

/// Writes its argument vector, one per line, as the output file.
pub fn echoing_encoder(dir: &Path) -> PathBuf {
    write_script(dir, "echo-ffmpeg", r#"printf '%s\n' "$@" > "$out""#)
}

pub fn failing_encoder(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fail-ffmpeg",
        r#"echo "Unknown encoder 'libnothing'" >&2
exit 1"#,
    )
}

pub fn empty_output_encoder(dir: &Path) -> PathBuf {
    write_script(dir, "empty-ffmpeg", r#": > "$out""#)
}

pub fn silent_encoder(dir: &Path) -> PathBuf {
    write_script(dir, "noop-ffmpeg", "exit 0")
}

pub fn hanging_encoder(dir: &Path) -> PathBuf {
    write_script(dir, "hang-ffmpeg", "exec sleep 30")
}

pub fn chatty_failing_encoder(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "chatty-ffmpeg",
        r#"head -c 200000 /dev/zero | tr '\0' 'x' >&2
echo "final error line" >&2
exit 1"#,
    )
}

pub fn resolver_for(binary: &Path) -> Arc<BinaryResolver> {
    Arc::new(BinaryResolver::new(ResolverSettings {
        override_path: Some(binary.to_path_buf()),
        system_paths: Vec::new(),
        dev_mode: false,
        dev_dir: PathBuf::from("bin"),
        packaged_dir: None,
    }))
}

pub fn settings(temp_dir: &Path) -> TranscoderSettings {
    TranscoderSettings {
        temp_dir: temp_dir.to_path_buf(),
        timeout: Duration::from_secs(20),
        capture_limit: 64 * 1024,
        max_jobs: 2,
    }
}

pub fn transcoder(binary: &Path, temp_dir: &Path) -> Transcoder {
    Transcoder::new(resolver_for(binary), settings(temp_dir))
}

pub fn entries(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
}
