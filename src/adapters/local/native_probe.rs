//! Metadata probe linked against libavformat.

use crate::domain::av::metadata::Metadata;
use crate::domain::jobs::InputFile;
use crate::domain::paths::validate_component;
use crate::ports::probe::MetadataProbe;
use async_trait::async_trait;
use ffmpeg_next as ffmpeg;
use serde_json::{json, Map};
use std::error::Error;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default)]
pub struct NativeProbe;

impl NativeProbe {
    pub fn new() -> Self {
        Self
    }
}

fn medium_name(medium: ffmpeg::media::Type) -> &'static str {
    match medium {
        ffmpeg::media::Type::Video => "video",
        ffmpeg::media::Type::Audio => "audio",
        ffmpeg::media::Type::Subtitle => "subtitle",
        ffmpeg::media::Type::Data => "data",
        ffmpeg::media::Type::Attachment => "attachment",
        ffmpeg::media::Type::Unknown => "unknown",
    }
}

fn describe_path(path: &Path, file_name: &str) -> Result<Metadata, Box<dyn Error + Send + Sync>> {
    ffmpeg::init()?;
    let ictx = ffmpeg::format::input(&path)?;

    let mut format = Map::new();
    format.insert("filename".into(), json!(file_name));
    format.insert("format_name".into(), json!(ictx.format().name()));
    format.insert("nb_streams".into(), json!(ictx.nb_streams()));
    if ictx.duration() > 0 {
        format.insert(
            "duration".into(),
            json!(ictx.duration() as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE)),
        );
    }
    if ictx.bit_rate() > 0 {
        format.insert("bit_rate".into(), json!(ictx.bit_rate()));
    }

    let mut streams = Vec::new();
    for stream in ictx.streams() {
        let parameters = stream.parameters();
        let medium = parameters.medium();
        let mut fields = Map::new();
        fields.insert("index".into(), json!(stream.index()));
        fields.insert("codec_type".into(), json!(medium_name(medium)));
        fields.insert("codec_name".into(), json!(parameters.id().name()));

        let rate = stream.avg_frame_rate();
        if rate.denominator() != 0 {
            fields.insert(
                "r_frame_rate".into(),
                json!(format!("{}/{}", rate.numerator(), rate.denominator())),
            );
        }

        let context = ffmpeg::codec::context::Context::from_parameters(parameters)?;
        match medium {
            ffmpeg::media::Type::Video => {
                let decoder = context.decoder().video()?;
                fields.insert("width".into(), json!(decoder.width()));
                fields.insert("height".into(), json!(decoder.height()));
            }
            ffmpeg::media::Type::Audio => {
                let decoder = context.decoder().audio()?;
                fields.insert("sample_rate".into(), json!(decoder.rate()));
            }
            _ => {}
        }
        streams.push(fields);
    }

    Ok(Metadata { format, streams })
}

#[async_trait]
impl MetadataProbe for NativeProbe {
    async fn describe(&self, input: &InputFile) -> Result<Metadata, Box<dyn Error + Send + Sync>> {
        validate_component(&input.name)?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(&input.name);
        tokio::fs::write(&path, &input.bytes).await?;

        let name = input.name.clone();
        let metadata = tokio::task::spawn_blocking(move || describe_path(&path, &name)).await??;
        drop(dir);
        Ok(metadata)
    }
}
