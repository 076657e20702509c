use serde::Serialize;
use serde_json::{Map, Value};

/// Typed view over one probed stream mapping.
pub trait FromStream {
    fn from_stream(stream_data: &Map<String, Value>) -> Option<Self>
    where
        Self: Sized;
}

/// Numeric field that probes report either as a JSON number or a decimal string.
pub fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn string(stream_data: &Map<String, Value>, key: &str) -> Option<String> {
    stream_data
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn integer(stream_data: &Map<String, Value>, key: &str) -> Option<u64> {
    stream_data
        .get(key)
        .and_then(number)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

fn codec_type(stream_data: &Map<String, Value>) -> Option<&str> {
    stream_data.get("codec_type").and_then(|v| v.as_str())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoStream {
    pub index: Option<u64>,
    pub codec: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<String>,
    pub bit_rate: Option<u64>,
    pub duration: Option<f64>,
}

impl VideoStream {
    pub fn is_horizontal(&self) -> bool {
        self.width > self.height
    }
}

impl FromStream for VideoStream {
    fn from_stream(stream_data: &Map<String, Value>) -> Option<Self> {
        if codec_type(stream_data)? != "video" {
            return None;
        }
        Some(VideoStream {
            index: integer(stream_data, "index"),
            codec: string(stream_data, "codec_name")?,
            width: integer(stream_data, "width").unwrap_or(0) as u32,
            height: integer(stream_data, "height").unwrap_or(0) as u32,
            frame_rate: string(stream_data, "r_frame_rate"),
            bit_rate: integer(stream_data, "bit_rate"),
            duration: stream_data.get("duration").and_then(number),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AudioStream {
    pub index: Option<u64>,
    pub codec: String,
    pub profile: Option<String>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    pub bit_rate: Option<u64>,
}

impl FromStream for AudioStream {
    fn from_stream(stream_data: &Map<String, Value>) -> Option<Self> {
        if codec_type(stream_data)? != "audio" {
            return None;
        }
        Some(AudioStream {
            index: integer(stream_data, "index"),
            codec: string(stream_data, "codec_name")?,
            profile: string(stream_data, "profile"),
            sample_rate: integer(stream_data, "sample_rate").map(|n| n as u32),
            channels: integer(stream_data, "channels").map(|n| n as u32),
            bit_rate: integer(stream_data, "bit_rate"),
        })
    }
}
