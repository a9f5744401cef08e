use uuid::Uuid;

use crate::error::{OptimizeError, OptimizeResult};
use crate::options::{TranscodeConfig, TranscodeOptions};
use crate::scratch::extension_hint;

pub const VIDEO_FIELD: &str = "video";
pub const CONFIG_FIELD: &str = "config";

/// Raw pieces of an inbound optimize request, as collected by the transport.
#[derive(Debug, Default)]
pub struct JobParts {
    pub video: Option<Vec<u8>>,
    pub file_name: Option<String>,
    pub config_json: Option<String>,
}

/// One transcode request. Lives only as long as the request that created it.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub id: String,
    pub input: Vec<u8>,
    pub extension_hint: String,
    pub options: TranscodeOptions,
}

impl TranscodeJob {
    pub fn new(input: Vec<u8>, file_name: Option<&str>, config: &TranscodeConfig) -> OptimizeResult<Self> {
        if input.is_empty() {
            return Err(OptimizeError::invalid(VIDEO_FIELD, "uploaded video is empty"));
        }
        let options = config.validate()?;
        Ok(TranscodeJob {
            id: Uuid::new_v4().to_string(),
            input,
            extension_hint: extension_hint(file_name),
            options,
        })
    }
}

pub fn parse_job(parts: JobParts) -> OptimizeResult<TranscodeJob> {
    let video = parts
        .video
        .ok_or_else(|| OptimizeError::invalid(VIDEO_FIELD, "missing video field"))?;

    let config_json = parts
        .config_json
        .ok_or_else(|| OptimizeError::invalid(CONFIG_FIELD, "missing config field"))?;

    let config: TranscodeConfig = serde_json::from_str(&config_json)
        .map_err(|e| OptimizeError::invalid(CONFIG_FIELD, format!("failed to parse config JSON: {}", e)))?;

    TranscodeJob::new(video, parts.file_name.as_deref(), &config)
}
