use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{OptimizeError, OptimizeResult};

pub const MAX_QUALITY: i64 = 51;
pub const MAX_FPS: u32 = 240;
pub const MAX_VELOCITY: f64 = 100.0;

/// Encoding parameters as the front-end sends them. Nothing in here is
/// trusted until [`TranscodeConfig::validate`] has turned it into
/// [`TranscodeOptions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeConfig {
    pub resolution: String,
    pub codec: String,
    pub quality: i64,
    pub format: String,
    #[serde(deserialize_with = "number_or_string")]
    pub fps: String,
    pub bitrate: String,
    pub velocity: f64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        TranscodeConfig {
            resolution: "1920x1080".to_string(),
            codec: "libx264".to_string(),
            quality: 25,
            format: "mp4".to_string(),
            fps: "60".to_string(),
            bitrate: "auto".to_string(),
            velocity: 1.0,
        }
    }
}

// The UI keeps fps as a select value ("60"), other clients send a number.
fn number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(i64),
        Text(String),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Number(n) => n.to_string(),
        Raw::Text(s) => s,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn parse(value: &str) -> OptimizeResult<Self> {
        let (w, h) = value
            .split_once('x')
            .ok_or_else(|| OptimizeError::invalid("resolution", format!("expected WxH, got '{}'", value)))?;
        let width = parse_dimension(w)
            .ok_or_else(|| OptimizeError::invalid("resolution", format!("invalid width in '{}'", value)))?;
        let height = parse_dimension(h)
            .ok_or_else(|| OptimizeError::invalid("resolution", format!("invalid height in '{}'", value)))?;
        Ok(Resolution { width, height })
    }
}

fn parse_dimension(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 5 || s.starts_with('0') || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    H264,
    H265,
    Vp9,
    Av1,
}

impl VideoCodec {
    pub const ALL: [VideoCodec; 4] = [VideoCodec::H264, VideoCodec::H265, VideoCodec::Vp9, VideoCodec::Av1];

    pub fn as_str(self) -> &'static str {
        match self {
            VideoCodec::H264 => "libx264",
            VideoCodec::H265 => "libx265",
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Av1 => "libaom-av1",
        }
    }

    pub fn parse(value: &str) -> OptimizeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == value)
            .ok_or_else(|| OptimizeError::invalid("codec", format!("unsupported codec '{}'", value)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    Webm,
    Mkv,
    Avi,
    Mov,
}

impl ContainerFormat {
    pub const ALL: [ContainerFormat; 5] = [
        ContainerFormat::Mp4,
        ContainerFormat::Webm,
        ContainerFormat::Mkv,
        ContainerFormat::Avi,
        ContainerFormat::Mov,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Webm => "webm",
            ContainerFormat::Mkv => "mkv",
            ContainerFormat::Avi => "avi",
            ContainerFormat::Mov => "mov",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "video/mp4",
            ContainerFormat::Webm => "video/webm",
            ContainerFormat::Mkv => "video/x-matroska",
            ContainerFormat::Avi => "video/x-msvideo",
            ContainerFormat::Mov => "video/quicktime",
        }
    }

    pub fn parse(value: &str) -> OptimizeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == value)
            .ok_or_else(|| OptimizeError::invalid("format", format!("unsupported format '{}'", value)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bitrate {
    Auto,
    /// Digits with an optional k/M suffix, e.g. `500k` or `2M`.
    Target(String),
}

impl Bitrate {
    pub fn parse(value: &str) -> OptimizeResult<Self> {
        if value == "auto" {
            return Ok(Bitrate::Auto);
        }
        let digits = value.strip_suffix(['k', 'K', 'm', 'M']).unwrap_or(value);
        let well_formed = !digits.is_empty()
            && digits.len() <= 6
            && !digits.starts_with('0')
            && digits.bytes().all(|b| b.is_ascii_digit());
        if !well_formed {
            return Err(OptimizeError::invalid(
                "bitrate",
                format!("expected 'auto' or a size like '2M', got '{}'", value),
            ));
        }
        Ok(Bitrate::Target(value.to_string()))
    }
}

/// Validated, strongly typed encoding options.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOptions {
    pub resolution: Resolution,
    pub codec: VideoCodec,
    pub quality: u8,
    pub format: ContainerFormat,
    pub fps: u32,
    pub bitrate: Bitrate,
    pub velocity: f64,
}

impl TranscodeConfig {
    pub fn validate(&self) -> OptimizeResult<TranscodeOptions> {
        let resolution = Resolution::parse(&self.resolution)?;
        let codec = VideoCodec::parse(&self.codec)?;

        if !(0..=MAX_QUALITY).contains(&self.quality) {
            return Err(OptimizeError::invalid(
                "quality",
                format!("must be between 0 and {}, got {}", MAX_QUALITY, self.quality),
            ));
        }
        let quality = self.quality as u8;

        let format = ContainerFormat::parse(&self.format)?;

        let fps = self
            .fps
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|fps| (1..=MAX_FPS).contains(fps))
            .ok_or_else(|| {
                OptimizeError::invalid("fps", format!("must be an integer between 1 and {}, got '{}'", MAX_FPS, self.fps))
            })?;

        let bitrate = Bitrate::parse(&self.bitrate)?;

        if !self.velocity.is_finite() || self.velocity <= 0.0 || self.velocity > MAX_VELOCITY {
            return Err(OptimizeError::invalid(
                "velocity",
                format!("must be greater than 0 and at most {}, got {}", MAX_VELOCITY, self.velocity),
            ));
        }

        Ok(TranscodeOptions {
            resolution,
            codec,
            quality,
            format,
            fps,
            bitrate,
            velocity: self.velocity,
        })
    }
}
