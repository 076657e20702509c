//! Probed container metadata.
//!
//! The pipeline treats metadata as opaque except for the container extension; the
//! typed stream summaries exist for display.

use super::segments::StreamKind;
use super::stream::{number, AudioStream, FromStream, VideoStream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("probe output has no format object")]
    MissingFormat,

    #[error("probe output has no streams array")]
    MissingStreams,

    #[error("stream {index} is not an object")]
    InvalidStream { index: usize },

    #[error("probe output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Format-level fields plus one field mapping per stream, in stream order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub format: Map<String, Value>,
    pub streams: Vec<Map<String, Value>>,
}

impl Metadata {
    pub fn from_value(value: Value) -> Result<Self, MetadataError> {
        let Value::Object(mut root) = value else {
            return Err(MetadataError::MissingFormat);
        };
        let format = match root.remove("format") {
            Some(Value::Object(format)) => format,
            _ => return Err(MetadataError::MissingFormat),
        };
        let streams = match root.remove("streams") {
            Some(Value::Array(streams)) => streams,
            _ => return Err(MetadataError::MissingStreams),
        };
        let streams = streams
            .into_iter()
            .enumerate()
            .map(|(index, stream)| match stream {
                Value::Object(fields) => Ok(fields),
                _ => Err(MetadataError::InvalidStream { index }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { format, streams })
    }

    pub fn from_json(text: &str) -> Result<Self, MetadataError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    pub fn file_name(&self) -> Option<&str> {
        self.format.get("filename").and_then(|v| v.as_str())
    }

    /// Lowercased extension of the probed file name, when it is a plain alphanumeric token.
    pub fn container_extension(&self) -> Option<String> {
        let ext = Path::new(self.file_name()?).extension()?.to_str()?;
        if ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    pub fn extension_or(&self, fallback: &str) -> String {
        self.container_extension()
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Container duration in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.format.get("duration").and_then(number)
    }

    /// Whether any stream has the `codec_type` of `kind`.
    pub fn has_stream(&self, kind: StreamKind) -> bool {
        self.streams
            .iter()
            .any(|stream| stream.get("codec_type").and_then(|v| v.as_str()) == Some(kind.as_str()))
    }

    /// Stream kinds present in the container, video first.
    pub fn stream_kinds(&self) -> Vec<StreamKind> {
        StreamKind::ALL
            .into_iter()
            .filter(|kind| self.has_stream(*kind))
            .collect()
    }

    pub fn video_streams(&self) -> Vec<VideoStream> {
        self.streams.iter().filter_map(VideoStream::from_stream).collect()
    }

    pub fn audio_streams(&self) -> Vec<AudioStream> {
        self.streams.iter().filter_map(AudioStream::from_stream).collect()
    }
}
