// worker/src/transcoder.rs
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::fs::File as TokioFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::command::EncoderCommand;
use crate::error::{OptimizeError, OptimizeResult};
use crate::job::TranscodeJob;
use crate::resolver::BinaryResolver;
use crate::scratch;

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct TranscoderSettings {
    pub temp_dir: PathBuf,
    pub timeout: Duration,
    /// Upper bound on retained encoder output, per stream.
    pub capture_limit: usize,
    pub max_jobs: usize,
}

/// Runs encoder jobs. Each job gets its own pair of temporary files, and at
/// most `max_jobs` encoder processes run at once.
pub struct Transcoder {
    resolver: Arc<BinaryResolver>,
    settings: TranscoderSettings,
    slots: Semaphore,
}

impl Transcoder {
    pub fn new(resolver: Arc<BinaryResolver>, settings: TranscoderSettings) -> Self {
        let slots = Semaphore::new(settings.max_jobs.max(1));
        Transcoder {
            resolver,
            settings,
            slots,
        }
    }

    /// Resolves the encoder binary on the blocking pool.
    pub async fn resolve_binary(&self) -> OptimizeResult<PathBuf> {
        let resolver = Arc::clone(&self.resolver);
        tokio::task::spawn_blocking(move || resolver.resolve())
            .await
            .map_err(|e| OptimizeError::io("encoder lookup task failed", std::io::Error::other(e)))?
    }

    /// Stops admitting jobs. Jobs still waiting for a slot fail with
    /// `ShuttingDown`; running encoders are left to finish.
    pub fn close(&self) {
        self.slots.close();
    }

    /// Encodes `job.input` and returns the produced bytes. Both temporary
    /// files are gone by the time this returns, whatever the outcome.
    pub async fn run(&self, job: &TranscodeJob) -> OptimizeResult<Vec<u8>> {
        if self.slots.available_permits() == 0 {
            info!("[Job {}] Waiting for a free encoder slot", job.id);
        }
        let _permit = self.slots.acquire().await.map_err(|_| OptimizeError::ShuttingDown)?;

        let temp_dir = self.settings.temp_dir.clone();
        tokio::fs::create_dir_all(&temp_dir)
            .await
            .map_err(|e| OptimizeError::io(format!("failed to create temp dir {:?}", temp_dir), e))?;

        let input_ext = job.extension_hint.clone();
        let output_ext = job.options.format.extension();
        let (input, output) = blocking(&job.id, "temp file creation", move || {
            let input = scratch::reserve(&temp_dir, "input", &input_ext)?;
            let output = scratch::reserve(&temp_dir, "output", output_ext)?;
            Ok((input, output))
        })
        .await?;

        let result = self.encode(job, &input, &output).await;

        debug!("[Job {}] Cleaning up temporary files: {:?}, {:?}", job.id, input, output);
        let cleanup = tokio::task::spawn_blocking(move || {
            scratch::release(input);
            scratch::release(output);
        });
        if let Err(e) = cleanup.await {
            warn!("[Job {}] Cleanup task failed: {}", job.id, e);
        }
        result
    }

    async fn encode(&self, job: &TranscodeJob, input: &Path, output: &Path) -> OptimizeResult<Vec<u8>> {
        write_input(input, &job.input).await?;
        debug!("[Job {}] Wrote {} input bytes to {:?}", job.id, job.input.len(), input);

        let binary = self.resolve_binary().await?;
        let command = EncoderCommand::build(&binary, input, output, &job.options);
        trace!("[Job {}] Executing encoder command: {}", job.id, command);

        self.execute(&job.id, &command).await?;

        let bytes = read_output(output).await?;
        info!("[Job {}] Encoder produced {} bytes", job.id, bytes.len());
        Ok(bytes)
    }

    async fn execute(&self, job_id: &str, command: &EncoderCommand) -> OptimizeResult<()> {
        let mut child = command.to_command().spawn().map_err(|e| {
            let details = format!("failed to start {:?}: {}", command.program, e);
            error!("[Job {}] {}", job_id, details);
            OptimizeError::TranscodeFailed { details }
        })?;

        let limit = self.settings.capture_limit;
        let stdout = tokio::spawn(capture_tail(child.stdout.take(), limit));
        let stderr = tokio::spawn(capture_tail(child.stderr.take(), limit));

        let status = match timeout(self.settings.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                let details = format!("failed waiting for encoder: {}", e);
                error!("[Job {}] {}", job_id, details);
                return Err(OptimizeError::TranscodeFailed { details });
            }
            Err(_) => {
                let seconds = self.settings.timeout.as_secs();
                error!("[Job {}] Encoder exceeded {}s, terminating it", job_id, seconds);
                if let Err(e) = child.kill().await {
                    warn!("[Job {}] Failed to kill encoder process: {}", job_id, e);
                }
                return Err(OptimizeError::TranscodeTimedOut { seconds });
            }
        };

        let stdout = stdout.await.unwrap_or_default();
        let stderr = stderr.await.unwrap_or_default();
        debug!("[Job {}] Encoder stdout: {}", job_id, String::from_utf8_lossy(&stdout));
        debug!("[Job {}] Encoder stderr: {}", job_id, String::from_utf8_lossy(&stderr));

        if !status.success() {
            let details = format!("encoder exited with {}: {}", status, diagnostics(&stderr, &stdout));
            error!("[Job {}] {}", job_id, details);
            return Err(OptimizeError::TranscodeFailed { details });
        }
        Ok(())
    }
}

/// Runs filesystem work off the async workers.
async fn blocking<T, F>(job_id: &str, what: &str, work: F) -> OptimizeResult<T>
where
    F: FnOnce() -> OptimizeResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("[Job {}] {} task failed (panic/cancellation): {}", job_id, what, e);
        OptimizeError::io(format!("{} task failed", what), std::io::Error::other(e))
    })?
}

async fn write_input(path: &Path, bytes: &[u8]) -> OptimizeResult<()> {
    let context = || format!("failed to write input file {:?}", path);
    let mut file = TokioFile::create(path).await.map_err(|e| OptimizeError::io(context(), e))?;
    file.write_all(bytes).await.map_err(|e| OptimizeError::io(context(), e))?;
    file.flush().await.map_err(|e| OptimizeError::io(context(), e))?;
    Ok(())
}

async fn read_output(path: &Path) -> OptimizeResult<Vec<u8>> {
    let missing = || OptimizeError::OutputMissing {
        path: path.to_path_buf(),
    };
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => return Err(missing()),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(missing()),
        Err(e) => return Err(OptimizeError::io(format!("failed to inspect output {:?}", path), e)),
    }
    tokio::fs::read(path)
        .await
        .map_err(|e| OptimizeError::io(format!("failed to read output {:?}", path), e))
}

/// Drains `reader` to the end, keeping only the last `limit` bytes.
async fn capture_tail<R>(reader: Option<R>, limit: usize) -> Vec<u8>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let Some(mut reader) = reader else {
        return Vec::new();
    };
    let mut kept = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                kept.extend_from_slice(&chunk[..n]);
                if kept.len() > limit.saturating_mul(2) {
                    kept.drain(..kept.len() - limit);
                }
            }
            Err(e) => {
                debug!("Stopped reading encoder output: {}", e);
                break;
            }
        }
    }
    if kept.len() > limit {
        kept.drain(..kept.len() - limit);
    }
    kept
}

fn diagnostics(stderr: &[u8], stdout: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if !text.is_empty() {
        return text.to_string();
    }
    let text = String::from_utf8_lossy(stdout);
    let text = text.trim();
    if text.is_empty() {
        "no diagnostic output".to_string()
    } else {
        text.to_string()
    }
}
