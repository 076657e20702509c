//! Configuration loaded from the environment.

use crate::domain::av::stages::EncoderSettings;
use std::env;
use std::str::FromStr;

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| String::from(default))
}

/// Parse `key`, falling back to `default` when it is unset or malformed.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parameters of the conversion pipeline itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Target segment length in seconds
    pub segment_duration: u32,
    pub video_codec: String,
    /// Constant rate factor for the video encoder
    pub video_crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
    /// Container extension used when the probe reports none
    pub fallback_extension: String,
    /// Upper bound on concurrent engine invocations per job
    pub max_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let encoder = EncoderSettings::default();
        Self {
            segment_duration: 1,
            video_codec: encoder.video_codec,
            video_crf: encoder.video_crf,
            audio_codec: encoder.audio_codec,
            audio_bitrate: encoder.audio_bitrate,
            fallback_extension: String::from("mp4"),
            max_workers: default_workers(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();
        let default = Self::default();

        Self {
            segment_duration: parse_or("SEGMENT_DURATION", default.segment_duration).max(1),
            video_codec: var_or("VIDEO_CODEC", &default.video_codec),
            video_crf: parse_or("VIDEO_CRF", default.video_crf),
            audio_codec: var_or("AUDIO_CODEC", &default.audio_codec),
            audio_bitrate: var_or("AUDIO_BITRATE", &default.audio_bitrate),
            fallback_extension: var_or("FALLBACK_EXTENSION", &default.fallback_extension),
            max_workers: parse_or("MAX_WORKERS", default.max_workers).max(1),
        }
    }

    pub fn encoder(&self) -> EncoderSettings {
        EncoderSettings {
            video_codec: self.video_codec.clone(),
            video_crf: self.video_crf,
            audio_codec: self.audio_codec.clone(),
            audio_bitrate: self.audio_bitrate.clone(),
        }
    }
}

/// Configuration for the local HTTP server.
#[derive(Clone, Debug)]
pub struct LocalConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Root directory of job workspaces
    pub workspace_dir: String,
    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    /// Jobs allowed to run at the same time
    pub max_concurrent_jobs: usize,
    pub pipeline: PipelineConfig,
}

impl LocalConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: var_or("ADDR", "127.0.0.1"),
            port: var_or("PORT", "3000"),
            workspace_dir: var_or("WORKSPACE_DIR", "./workspace"),
            ffmpeg_bin: var_or("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: var_or("FFPROBE_BIN", "ffprobe"),
            max_concurrent_jobs: parse_or("MAX_CONCURRENT_JOBS", 2).max(1),
            pipeline: PipelineConfig::from_env(),
        }
    }
}
