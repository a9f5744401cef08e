use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, error, info};

use crate::command::EncoderCommand;
use crate::config::ServiceConfig;
use crate::error::OptimizeResult;
use crate::job::{parse_job, JobParts, TranscodeJob};
use crate::options::TranscodeConfig;
use crate::resolver::BinaryResolver;
use crate::transcoder::Transcoder;

/// An encoded video ready to hand back to the caller.
#[derive(Debug, Clone)]
pub struct Optimized {
    pub bytes: Vec<u8>,
    pub mime_type: &'static str,
    pub file_name: String,
}

/// The `optimize(bytes, config)` capability, independent of any transport.
pub struct OptimizeService {
    transcoder: Transcoder,
}

impl OptimizeService {
    pub fn new(transcoder: Transcoder) -> Self {
        OptimizeService { transcoder }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        let resolver = Arc::new(BinaryResolver::new(config.resolver.clone()));
        Self::new(Transcoder::new(resolver, config.transcoder.clone()))
    }

    pub fn transcoder(&self) -> &Transcoder {
        &self.transcoder
    }

    /// Rejects queued and future requests with `ShuttingDown`.
    pub fn shutdown(&self) {
        info!("Encoder slots closed, refusing new jobs");
        self.transcoder.close();
    }

    pub async fn optimize(
        &self,
        video: Vec<u8>,
        file_name: Option<&str>,
        config: &TranscodeConfig,
    ) -> OptimizeResult<Optimized> {
        let job = TranscodeJob::new(video, file_name, config)?;
        self.process(job).await
    }

    pub async fn optimize_parts(&self, parts: JobParts) -> OptimizeResult<Optimized> {
        self.process(parse_job(parts)?).await
    }

    async fn process(&self, job: TranscodeJob) -> OptimizeResult<Optimized> {
        info!("[Job {}] Processing {} input bytes", job.id, job.input.len());
        debug!("[Job {}] Options: {:?}", job.id, job.options);

        match self.transcoder.run(&job).await {
            Ok(bytes) => {
                info!("[Job {}] Successfully processed.", job.id);
                Ok(Optimized {
                    bytes,
                    mime_type: job.options.format.mime_type(),
                    file_name: download_name(job.options.format.extension()),
                })
            }
            Err(e) => {
                error!("[Job {}] Failed to process ({}): {}", job.id, e.kind(), e);
                Err(e)
            }
        }
    }

    /// The encoder invocation `config` would produce, with placeholder file
    /// names. Falls back to the bare binary name when none can be resolved.
    pub async fn preview(&self, config: &TranscodeConfig) -> OptimizeResult<EncoderCommand> {
        let options = config.validate()?;
        let binary = self.transcoder.resolve_binary().await.unwrap_or_else(|e| {
            debug!("Previewing without a resolved encoder: {}", e);
            PathBuf::from("ffmpeg")
        });
        Ok(EncoderCommand::preview(&binary, &options))
    }
}

fn download_name(extension: &str) -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("optimized_{}.{}", millis, extension)
}
