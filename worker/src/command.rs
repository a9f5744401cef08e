// worker/src/command.rs
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::filters::FilterSpec;
use crate::options::{Bitrate, TranscodeOptions};

pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "128k";

/// Encoder invocation as a program plus discrete arguments. Arguments are
/// handed to the OS as-is; no shell ever sees them.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl EncoderCommand {
    pub fn build(binary: &Path, input: &Path, output: &Path, options: &TranscodeOptions) -> Self {
        let filters = FilterSpec::from_options(options);
        let video_filter = filters.video_filter();
        let audio_filter = filters.audio_filter();
        let quality = options.quality.to_string();
        let fps = options.fps.to_string();

        let mut flags: Vec<&str> = vec![
            "-vf",
            &video_filter,
            "-c:v",
            options.codec.as_str(),
            "-crf",
            &quality,
            "-r",
            &fps,
        ];
        if let Bitrate::Target(bitrate) = &options.bitrate {
            flags.extend(["-b:v", bitrate.as_str()]);
        }
        if !audio_filter.is_empty() {
            flags.extend(["-af", audio_filter.as_str()]);
        }
        flags.extend(["-c:a", AUDIO_CODEC, "-b:a", AUDIO_BITRATE]);

        let mut args: Vec<OsString> = Vec::with_capacity(flags.len() + 4);
        args.push("-y".into());
        args.push("-i".into());
        args.push(input.as_os_str().to_owned());
        args.extend(flags.into_iter().map(OsString::from));
        args.push(output.as_os_str().to_owned());

        EncoderCommand {
            program: binary.to_path_buf(),
            args,
        }
    }

    /// Same arguments with placeholder file names, for showing a user what
    /// would run.
    pub fn preview(binary: &Path, options: &TranscodeOptions) -> Self {
        let output = format!("output.{}", options.format.extension());
        Self::build(binary, Path::new("input"), Path::new(&output), options)
    }

    pub fn args_lossy(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

impl fmt::Display for EncoderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}
