use super::av::segments::{
    IndexOrigin, SegmentNamer, SegmentStage, StreamKind, AUDIO_EXTENSION, OUTPUT_EXTENSION,
};
use super::paths::join;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::info;

/// A file supplied by the caller for conversion.
#[derive(Debug, Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputFile {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Lifecycle of one conversion job. A failed job jumps straight to `CleanedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum JobState {
    Idle,
    Loaded,
    Split,
    Segmented,
    Compressed,
    Concatenated,
    Muxed,
    Extracted,
    CleanedUp,
}

impl JobState {
    pub fn next(self) -> Option<JobState> {
        use JobState::*;
        match self {
            Idle => Some(Loaded),
            Loaded => Some(Split),
            Split => Some(Segmented),
            Segmented => Some(Compressed),
            Compressed => Some(Concatenated),
            Concatenated => Some(Muxed),
            Muxed => Some(Extracted),
            Extracted => Some(CleanedUp),
            CleanedUp => Some(Idle),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Every fixed intermediate path of a job, all below the job directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub root: String,
    pub input: String,
    pub raw_video: String,
    pub raw_audio: String,
    pub video_manifest: String,
    pub audio_manifest: String,
    pub compressed_video: String,
    pub compressed_audio: String,
    pub output: String,
}

impl JobPaths {
    pub fn new(root: &str, input_name: &str, extension: &str) -> Self {
        Self {
            root: root.to_string(),
            input: join(root, &format!("source-{}", input_name)),
            raw_video: join(root, &format!("output-video.{}", extension)),
            raw_audio: join(root, &format!("output-audio.{}", AUDIO_EXTENSION)),
            video_manifest: join(root, "video_parts.txt"),
            audio_manifest: join(root, "audio_parts.txt"),
            compressed_video: join(root, &format!("output-compressed.{}", OUTPUT_EXTENSION)),
            compressed_audio: join(root, &format!("output-compressed.{}", AUDIO_EXTENSION)),
            output: join(root, &format!("output.{}", OUTPUT_EXTENSION)),
        }
    }

    pub fn raw_stream(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Video => &self.raw_video,
            StreamKind::Audio => &self.raw_audio,
        }
    }

    pub fn manifest(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Video => &self.video_manifest,
            StreamKind::Audio => &self.audio_manifest,
        }
    }

    pub fn concatenated(&self, kind: StreamKind) -> &str {
        match kind {
            StreamKind::Video => &self.compressed_video,
            StreamKind::Audio => &self.compressed_audio,
        }
    }

    /// Single files of the job, excluding segments, in creation order.
    pub fn files(&self) -> [&str; 8] {
        [
            self.input.as_str(),
            self.raw_video.as_str(),
            self.raw_audio.as_str(),
            self.video_manifest.as_str(),
            self.audio_manifest.as_str(),
            self.compressed_video.as_str(),
            self.compressed_audio.as_str(),
            self.output.as_str(),
        ]
    }
}

/// The unit of work for one input file.
#[derive(Debug, Clone)]
pub struct MediaJob {
    pub id: String,
    pub input_name: String,
    pub extension: String,
    pub segment_duration: u32,
    pub paths: JobPaths,
    pub namer: SegmentNamer,
    origins: BTreeMap<(StreamKind, SegmentStage), IndexOrigin>,
    state: JobState,
}

impl MediaJob {
    pub fn new(id: &str, input_name: &str, extension: &str, segment_duration: u32) -> Self {
        let root = format!("job-{}", id);
        Self {
            id: id.to_string(),
            input_name: input_name.to_string(),
            extension: extension.to_string(),
            segment_duration,
            paths: JobPaths::new(&root, input_name, extension),
            namer: SegmentNamer::new(root, extension),
            origins: BTreeMap::new(),
            state: JobState::Idle,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn advance(&mut self, to: JobState) {
        if to == self.state {
            return;
        }
        info!("Job {}: {} -> {}", self.id, self.state, to);
        self.state = to;
    }

    pub fn record_origin(&mut self, kind: StreamKind, stage: SegmentStage, origin: IndexOrigin) {
        self.origins.insert((kind, stage), origin);
    }

    /// Index origin discovered for a segment directory, if it has been listed.
    pub fn origin(&self, kind: StreamKind, stage: SegmentStage) -> Option<IndexOrigin> {
        self.origins.get(&(kind, stage)).copied()
    }
}
