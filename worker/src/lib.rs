//! Video optimizer worker.
//!
//! Takes raw video bytes plus an encoding config, runs ffmpeg against a
//! temporary copy, and returns the re-encoded bytes. Temporary files never
//! outlive the request that created them.

pub mod command;
pub mod config;
pub mod error;
pub mod filters;
pub mod job;
pub mod options;
pub mod resolver;
pub mod scratch;
pub mod server;
pub mod service;
pub mod transcoder;

pub use command::EncoderCommand;
pub use config::ServiceConfig;
pub use error::{OptimizeError, OptimizeResult};
pub use filters::{build_audio_filter, build_video_filter, tempo_chain, FilterSpec};
pub use job::{parse_job, JobParts, TranscodeJob};
pub use options::{TranscodeConfig, TranscodeOptions};
pub use resolver::{BinaryResolver, ResolverSettings};
pub use service::{OptimizeService, Optimized};
pub use transcoder::{Transcoder, TranscoderSettings};
