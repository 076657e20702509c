//! Argument vectors for every codec engine stage.

use super::segments::StreamKind;
use crate::domain::paths::validate_path;
use crate::error::TranscodeError;
use serde::Serialize;
use std::fmt;

/// A step of the conversion pipeline, as reported in errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Load,
    Probe,
    /// Workspace preparation: input copy and directory creation.
    Prepare,
    DemuxSplit,
    SegmentVideo,
    SegmentAudio,
    CompressVideo,
    CompressAudio,
    ConcatVideo,
    ConcatAudio,
    Mux,
    Extract,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Probe => "probe",
            Stage::Prepare => "prepare",
            Stage::DemuxSplit => "demux-split",
            Stage::SegmentVideo => "segment-video",
            Stage::SegmentAudio => "segment-audio",
            Stage::CompressVideo => "compress-video",
            Stage::CompressAudio => "compress-audio",
            Stage::ConcatVideo => "concat-video",
            Stage::ConcatAudio => "concat-audio",
            Stage::Mux => "mux",
            Stage::Extract => "extract",
        }
    }

    pub fn segment(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Video => Stage::SegmentVideo,
            StreamKind::Audio => Stage::SegmentAudio,
        }
    }

    pub fn compress(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Video => Stage::CompressVideo,
            StreamKind::Audio => Stage::CompressAudio,
        }
    }

    pub fn concat(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Video => Stage::ConcatVideo,
            StreamKind::Audio => Stage::ConcatAudio,
        }
    }

    /// Stages that must repackage streams without re-encoding.
    pub fn is_copy_stage(&self) -> bool {
        matches!(
            self,
            Stage::DemuxSplit
                | Stage::SegmentVideo
                | Stage::SegmentAudio
                | Stage::ConcatVideo
                | Stage::ConcatAudio
                | Stage::Mux
        )
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lossy encoder parameters for the compression stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub video_codec: String,
    pub video_crf: u8,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            video_crf: 30,
            audio_codec: "aac".to_string(),
            audio_bitrate: "128k".to_string(),
        }
    }
}

const CODEC_FLAGS: [&str; 3] = ["-c", "-c:v", "-c:a"];
const ENCODER_FLAGS: [&str; 3] = ["-crf", "-b:a", "-b:v"];

/// One codec engine invocation with the workspace paths it reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCommand {
    pub stage: Stage,
    pub args: Vec<String>,
    pub inputs: Vec<String>,
    /// Written paths. A segment stage lists its output template.
    pub outputs: Vec<String>,
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

impl StageCommand {
    /// Copy each listed stream of `input` into its own single-stream file.
    ///
    /// Only streams the input actually carries may be listed: an output with
    /// nothing mapped into it makes the engine fail.
    pub fn demux_split(input: &str, outputs: &[(StreamKind, &str)]) -> Self {
        let mut argv = args(&["-y", "-i", input]);
        for (kind, output) in outputs {
            let (map, codec, drop) = match kind {
                StreamKind::Video => ("0:v:0", "-c:v", "-an"),
                StreamKind::Audio => ("0:a:0", "-c:a", "-vn"),
            };
            argv.extend(args(&["-map", map, codec, "copy", drop, output]));
        }
        Self {
            stage: Stage::DemuxSplit,
            args: argv,
            inputs: vec![input.to_string()],
            outputs: outputs.iter().map(|(_, output)| output.to_string()).collect(),
        }
    }

    /// Cut `input` into `duration_secs` long pieces named after `template`.
    pub fn segment(kind: StreamKind, input: &str, template: &str, duration_secs: u32) -> Self {
        let duration = duration_secs.to_string();
        Self {
            stage: Stage::segment(kind),
            args: args(&[
                "-y",
                "-i",
                input,
                "-map",
                "0",
                "-c",
                "copy",
                "-f",
                "segment",
                "-segment_time",
                duration.as_str(),
                "-reset_timestamps",
                "1",
                template,
            ]),
            inputs: vec![input.to_string()],
            outputs: vec![template.to_string()],
        }
    }

    /// Re-encode one segment with the lossy encoder for its kind.
    pub fn compress(
        kind: StreamKind,
        input: &str,
        output: &str,
        settings: &EncoderSettings,
    ) -> Self {
        let args = match kind {
            StreamKind::Video => {
                let crf = settings.video_crf.to_string();
                args(&[
                    "-y",
                    "-i",
                    input,
                    "-c:v",
                    settings.video_codec.as_str(),
                    "-crf",
                    crf.as_str(),
                    "-an",
                    output,
                ])
            }
            StreamKind::Audio => args(&[
                "-y",
                "-i",
                input,
                "-c:a",
                settings.audio_codec.as_str(),
                "-b:a",
                settings.audio_bitrate.as_str(),
                "-vn",
                output,
            ]),
        };
        Self {
            stage: Stage::compress(kind),
            args,
            inputs: vec![input.to_string()],
            outputs: vec![output.to_string()],
        }
    }

    /// Join the segments listed in `manifest` into one stream.
    pub fn concat(kind: StreamKind, manifest: &str, output: &str) -> Self {
        Self {
            stage: Stage::concat(kind),
            args: args(&[
                "-y", "-f", "concat", "-safe", "0", "-i", manifest, "-c", "copy", output,
            ]),
            inputs: vec![manifest.to_string()],
            outputs: vec![output.to_string()],
        }
    }

    /// Combine one video and one audio stream into the output container.
    pub fn mux(video: &str, audio: &str, output: &str) -> Self {
        Self {
            stage: Stage::Mux,
            args: args(&[
                "-y", "-i", video, "-i", audio, "-map", "0:v:0", "-map", "1:a:0", "-c:v", "copy",
                "-c:a", "copy", output,
            ]),
            inputs: vec![video.to_string(), audio.to_string()],
            outputs: vec![output.to_string()],
        }
    }

    /// Whether every codec selection is `copy` and no encoder option is present.
    pub fn is_stream_copy(&self) -> bool {
        let mut selects_codec = false;
        for pair in self.args.windows(2) {
            let (flag, value) = (pair[0].as_str(), pair[1].as_str());
            if CODEC_FLAGS.contains(&flag) {
                selects_codec = true;
                if value != "copy" {
                    return false;
                }
            }
        }
        selects_codec
            && !self
                .args
                .iter()
                .any(|arg| ENCODER_FLAGS.contains(&arg.as_str()))
    }

    pub fn validate(&self) -> Result<(), TranscodeError> {
        let invalid = |reason: String| TranscodeError::InvalidCommand {
            stage: self.stage,
            reason,
        };
        if self.inputs.is_empty() || self.outputs.is_empty() {
            return Err(invalid("stage needs at least one input and one output".into()));
        }
        for path in self.inputs.iter().chain(&self.outputs) {
            if path.is_empty() {
                return Err(invalid("empty workspace path".into()));
            }
            validate_path(path).map_err(|e| invalid(e.to_string()))?;
            if !self.args.contains(path) {
                return Err(invalid(format!("{} missing from argument vector", path)));
            }
        }
        if let Some(path) = self.outputs.iter().find(|o| self.inputs.contains(*o)) {
            return Err(invalid(format!("{} is both read and written", path)));
        }
        if self.stage.is_copy_stage() && !self.is_stream_copy() {
            return Err(invalid("copy stage would re-encode".into()));
        }
        Ok(())
    }
}
