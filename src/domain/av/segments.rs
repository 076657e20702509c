//! Segment naming.
//!
//! Maps a `(kind, stage, index)` triple onto a workspace path and back. Raw
//! segments are named by the codec engine's segment muxer, whose running counter
//! may start at any value, so the index origin of a raw directory is recovered from
//! its listing instead of being assumed.

use crate::domain::paths::{file_name, join, DirEntry};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

static SEGMENT_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<prefix>.*?)(?P<index>\d+)\.(?P<ext>[^./]+)$")
        .expect("segment file name pattern is valid")
});

pub const RAW_VIDEO_DIR: &str = "parts_video";
pub const RAW_AUDIO_DIR: &str = "parts_audio";
pub const COMPRESSED_VIDEO_DIR: &str = "compressed_parts_video";
pub const COMPRESSED_AUDIO_DIR: &str = "compressed_parts_audio";

/// Container used for audio-only streams.
pub const AUDIO_EXTENSION: &str = "aac";
/// Container used for compressed video segments and the final deliverable.
pub const OUTPUT_EXTENSION: &str = "mp4";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Video, StreamKind::Audio];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SegmentStage {
    Raw,
    Compressed,
}

/// Native counter value of the first segment in a directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOrigin(pub u64);

impl IndexOrigin {
    /// Zero-based position of a natively numbered segment.
    pub fn logical(&self, native: u64) -> u64 {
        native - self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamerError {
    #[error("unrecognised segment file name {name:?}")]
    Unrecognized { name: String },

    #[error("segment index {index} appears more than once")]
    Duplicate { index: u64 },

    #[error("expected segment index {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: StreamKind,
    pub stage: SegmentStage,
    /// Index as it appears in the file name.
    pub index: u64,
    pub path: String,
}

/// The recovered, index-ordered content of one segment directory.
#[derive(Debug, Clone)]
pub struct SegmentListing {
    pub kind: StreamKind,
    pub stage: SegmentStage,
    pub origin: Option<IndexOrigin>,
    pub segments: Vec<Segment>,
}

impl SegmentListing {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments paired with their zero-based logical index.
    pub fn logical(&self) -> impl Iterator<Item = (u64, &Segment)> {
        let origin = self.origin.unwrap_or(IndexOrigin(0));
        self.segments
            .iter()
            .map(move |segment| (origin.logical(segment.index), segment))
    }

    pub fn paths(&self) -> Vec<String> {
        self.segments.iter().map(|s| s.path.clone()).collect()
    }
}

/// Deterministic naming of every segment belonging to one job directory.
#[derive(Debug, Clone)]
pub struct SegmentNamer {
    root: String,
    video_extension: String,
}

impl SegmentNamer {
    /// `root` is the job directory, `video_extension` the input container extension.
    pub fn new(root: impl Into<String>, video_extension: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            video_extension: video_extension.into(),
        }
    }

    pub fn directory(&self, kind: StreamKind, stage: SegmentStage) -> String {
        let dir = match (kind, stage) {
            (StreamKind::Video, SegmentStage::Raw) => RAW_VIDEO_DIR,
            (StreamKind::Audio, SegmentStage::Raw) => RAW_AUDIO_DIR,
            (StreamKind::Video, SegmentStage::Compressed) => COMPRESSED_VIDEO_DIR,
            (StreamKind::Audio, SegmentStage::Compressed) => COMPRESSED_AUDIO_DIR,
        };
        join(&self.root, dir)
    }

    /// All four segment directories, raw ones first.
    pub fn directories(&self) -> Vec<String> {
        [SegmentStage::Raw, SegmentStage::Compressed]
            .into_iter()
            .flat_map(|stage| StreamKind::ALL.map(|kind| self.directory(kind, stage)))
            .collect()
    }

    pub fn extension(&self, kind: StreamKind, stage: SegmentStage) -> &str {
        match (kind, stage) {
            (StreamKind::Video, SegmentStage::Raw) => &self.video_extension,
            (StreamKind::Video, SegmentStage::Compressed) => OUTPUT_EXTENSION,
            (StreamKind::Audio, _) => AUDIO_EXTENSION,
        }
    }

    fn prefix(kind: StreamKind, stage: SegmentStage) -> &'static str {
        match (kind, stage) {
            (StreamKind::Video, SegmentStage::Raw) => "video_part_",
            (StreamKind::Audio, SegmentStage::Raw) => "audio_part_",
            (_, SegmentStage::Compressed) => "part-",
        }
    }

    pub fn file_name(&self, kind: StreamKind, stage: SegmentStage, index: u64) -> String {
        format!(
            "{}{}.{}",
            Self::prefix(kind, stage),
            index,
            self.extension(kind, stage)
        )
    }

    pub fn segment_path(&self, kind: StreamKind, stage: SegmentStage, index: u64) -> String {
        join(
            &self.directory(kind, stage),
            &self.file_name(kind, stage, index),
        )
    }

    /// Output template handed to the engine's segment muxer.
    pub fn segment_template(&self, kind: StreamKind) -> String {
        let stage = SegmentStage::Raw;
        join(
            &self.directory(kind, stage),
            &format!(
                "{}%d.{}",
                Self::prefix(kind, stage),
                self.extension(kind, stage)
            ),
        )
    }

    /// Index embedded in a segment path, if the path follows this namer's convention.
    pub fn segment_index(&self, kind: StreamKind, stage: SegmentStage, path: &str) -> Option<u64> {
        let caps = SEGMENT_FILE_NAME.captures(file_name(path))?;
        if &caps["prefix"] != Self::prefix(kind, stage) || &caps["ext"] != self.extension(kind, stage)
        {
            return None;
        }
        caps["index"].parse().ok()
    }

    /// Rebuild the ordered segment sequence from a directory listing.
    ///
    /// Sub-directories are skipped. Every remaining entry must parse, and the
    /// parsed indices must form a contiguous run starting at the smallest one.
    pub fn recover(
        &self,
        kind: StreamKind,
        stage: SegmentStage,
        entries: &[DirEntry],
    ) -> Result<SegmentListing, NamerError> {
        let dir = self.directory(kind, stage);
        let mut segments = entries
            .iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| {
                let path = join(&dir, &entry.name);
                match self.segment_index(kind, stage, &path) {
                    Some(index) => Ok(Segment {
                        kind,
                        stage,
                        index,
                        path,
                    }),
                    None => Err(NamerError::Unrecognized {
                        name: entry.name.clone(),
                    }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        segments.sort_by_key(|segment| segment.index);
        let origin = segments.first().map(|segment| IndexOrigin(segment.index));

        if let Some(IndexOrigin(start)) = origin {
            for (position, segment) in segments.iter().enumerate() {
                // Only a repeated index can run past u64::MAX.
                let Some(expected) = start.checked_add(position as u64) else {
                    return Err(NamerError::Duplicate {
                        index: segment.index,
                    });
                };
                if segment.index < expected {
                    return Err(NamerError::Duplicate {
                        index: segment.index,
                    });
                }
                if segment.index > expected {
                    return Err(NamerError::Gap {
                        expected,
                        found: segment.index,
                    });
                }
            }
        }

        Ok(SegmentListing {
            kind,
            stage,
            origin,
            segments,
        })
    }
}
