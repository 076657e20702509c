//! End-to-end runs of the pipeline against an in-memory workspace.
//!
//! `SimulatedEngine` interprets the argument vectors the stage builders emit the way
//! ffmpeg would, over a tiny JSON container: a file holds tracks, a track holds
//! fixed-length frames of `FRAME_SECONDS` each. Stream copy moves frames untouched,
//! encoding truncates every frame, so byte sizes reveal which one happened.

#[cfg(test)]
mod functional_tests {
    use crate::adapters::memory::MemoryWorkspace;
    use crate::application::cleanup::cleanup_job;
    use crate::application::orchestrator::PipelineOrchestrator;
    use crate::application::stages::StageExecutor;
    use crate::config::PipelineConfig;
    use crate::domain::av::manifest::ConcatManifest;
    use crate::domain::av::metadata::Metadata;
    use crate::domain::av::segments::StreamKind;
    use crate::domain::av::stages::{Stage, StageCommand};
    use crate::domain::jobs::{InputFile, MediaJob};
    use crate::domain::paths::{join, parent};
    use crate::error::TranscodeError;
    use crate::ports::engine::{CodecEngine, EngineStatus};
    use crate::ports::probe::MetadataProbe;
    use crate::ports::workspace::WorkspacePort;
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};
    use std::error::Error;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::Notify;
    use tokio_util::sync::CancellationToken;

    const FRAME_SECONDS: f64 = 0.25;
    const FRAME_PADDING: usize = 16;
    const ENCODED_FRAME_LEN: usize = 6;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Track {
        kind: String,
        codec: String,
        frames: Vec<String>,
    }

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Media {
        tracks: Vec<Track>,
    }

    impl Media {
        fn parse(bytes: &[u8]) -> Result<Self, String> {
            serde_json::from_slice(bytes)
                .map_err(|_| "Invalid data found when processing input".to_string())
        }

        fn to_bytes(&self) -> Vec<u8> {
            serde_json::to_vec(self).unwrap()
        }

        fn duration(&self) -> f64 {
            self.tracks
                .iter()
                .map(|t| t.frames.len() as f64 * FRAME_SECONDS)
                .fold(0.0, f64::max)
        }

        fn payload(&self) -> usize {
            self.tracks
                .iter()
                .flat_map(|t| t.frames.iter())
                .map(String::len)
                .sum()
        }

        fn track(&self, kind: &str) -> Option<&Track> {
            self.tracks.iter().find(|t| t.kind == kind)
        }

        /// Concat demuxer semantics: tracks are joined position by position.
        fn append(&mut self, other: Media) -> Result<(), String> {
            for (i, track) in other.tracks.into_iter().enumerate() {
                match self.tracks.get_mut(i) {
                    None => self.tracks.push(track),
                    Some(existing) if existing.kind == track.kind && existing.codec == track.codec => {
                        existing.frames.extend(track.frames)
                    }
                    Some(_) => return Err("concat inputs have mismatched streams".to_string()),
                }
            }
            Ok(())
        }
    }

    fn frame(kind: &str, index: usize) -> String {
        format!("{}{:05}{}", &kind[..1], index, "#".repeat(FRAME_PADDING))
    }

    fn synthetic(frames: usize, with_video: bool, with_audio: bool) -> Vec<u8> {
        let mut media = Media::default();
        for (kind, codec, wanted) in [("video", "rawvideo", with_video), ("audio", "pcm_s16le", with_audio)] {
            if wanted {
                media.tracks.push(Track {
                    kind: kind.to_string(),
                    codec: codec.to_string(),
                    frames: (0..frames).map(|i| frame(kind, i)).collect(),
                });
            }
        }
        media.to_bytes()
    }

    #[derive(Debug, Default)]
    struct OutputSpec {
        path: String,
        maps: Vec<String>,
        codecs: Vec<(String, String)>,
        drop_audio: bool,
        drop_video: bool,
        format: Option<String>,
        segment_time: Option<f64>,
    }

    impl OutputSpec {
        fn codec(&self, kind: &str) -> Option<&str> {
            let specific = if kind == "video" { "-c:v" } else { "-c:a" };
            self.codecs
                .iter()
                .rev()
                .find(|(flag, _)| flag == "-c" || flag == specific)
                .map(|(_, codec)| codec.as_str())
        }
    }

    #[derive(Debug, Default)]
    struct Invocation {
        inputs: Vec<(String, Option<String>)>,
        outputs: Vec<OutputSpec>,
    }

    fn take(args: &mut std::slice::Iter<'_, String>, flag: &str) -> Result<String, String> {
        args.next()
            .cloned()
            .ok_or_else(|| format!("Option {} needs a value", flag))
    }

    fn parse_argv(argv: &[String]) -> Result<Invocation, String> {
        let mut invocation = Invocation::default();
        let mut pending = OutputSpec::default();
        let mut args = argv.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-y" | "-hide_banner" | "-nostdin" => {}
                "-loglevel" | "-safe" | "-reset_timestamps" | "-crf" | "-b:a" | "-b:v" => {
                    take(&mut args, arg)?;
                }
                "-i" => {
                    let path = take(&mut args, arg)?;
                    invocation.inputs.push((path, pending.format.take()));
                }
                "-f" => pending.format = Some(take(&mut args, arg)?),
                "-map" => pending.maps.push(take(&mut args, arg)?),
                "-c" | "-c:v" | "-c:a" => pending.codecs.push((arg.clone(), take(&mut args, arg)?)),
                "-segment_time" => {
                    let value = take(&mut args, arg)?;
                    pending.segment_time = Some(value.parse().map_err(|_| format!("bad segment time {}", value))?);
                }
                "-an" => pending.drop_audio = true,
                "-vn" => pending.drop_video = true,
                flag if flag.starts_with('-') => return Err(format!("Unrecognized option '{}'", flag)),
                path => {
                    pending.path = path.to_string();
                    invocation.outputs.push(std::mem::take(&mut pending));
                }
            }
        }
        if invocation.inputs.is_empty() || invocation.outputs.is_empty() {
            return Err("At least one input and one output are required".to_string());
        }
        Ok(invocation)
    }

    fn select(inputs: &[Media], target: &OutputSpec) -> Result<Vec<Track>, String> {
        let mut tracks = Vec::new();
        if target.maps.is_empty() {
            tracks.extend(inputs[0].tracks.iter().cloned());
        }
        for map in &target.maps {
            let (map, optional) = match map.strip_suffix('?') {
                Some(map) => (map, true),
                None => (map.as_str(), false),
            };
            let mut parts = map.split(':');
            let input: usize = parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| format!("Invalid stream specifier {}", map))?;
            let media = inputs
                .get(input)
                .ok_or_else(|| format!("Invalid input file index: {}", input))?;
            match (parts.next(), parts.next()) {
                (None, _) => tracks.extend(media.tracks.iter().cloned()),
                (Some(kind), Some(n)) => {
                    let kind = if kind == "v" { "video" } else { "audio" };
                    let n: usize = n.parse().map_err(|_| format!("Invalid stream specifier {}", map))?;
                    match media.tracks.iter().filter(|t| t.kind == kind).nth(n) {
                        Some(track) => tracks.push(track.clone()),
                        None if optional => {}
                        None => return Err(format!("Stream map '{}' matches no streams", map)),
                    }
                }
                _ => return Err(format!("Invalid stream specifier {}", map)),
            }
        }
        tracks.retain(|t| !(target.drop_audio && t.kind == "audio") && !(target.drop_video && t.kind == "video"));

        for track in tracks.iter_mut() {
            match target.codec(&track.kind) {
                Some("copy") => {}
                codec => {
                    track.codec = codec.unwrap_or("default").to_string();
                    for frame in track.frames.iter_mut() {
                        frame.truncate(ENCODED_FRAME_LEN);
                    }
                }
            }
        }
        Ok(tracks)
    }

    type Hook = Arc<dyn Fn(&[String]) -> Option<EngineStatus> + Send + Sync>;

    /// In-memory stand-in for the ffmpeg binary.
    #[derive(Clone)]
    struct SimulatedEngine {
        workspace: MemoryWorkspace,
        start_number: usize,
        limit: usize,
        hook: Option<Hook>,
        history: Arc<Mutex<Vec<Vec<String>>>>,
        concat_orders: Arc<Mutex<Vec<Vec<String>>>>,
    }

    impl SimulatedEngine {
        fn new(workspace: MemoryWorkspace) -> Self {
            Self {
                workspace,
                start_number: 0,
                limit: 4,
                hook: None,
                history: Arc::default(),
                concat_orders: Arc::default(),
            }
        }

        /// First value of the segment muxer's counter.
        fn with_start_number(mut self, start_number: usize) -> Self {
            self.start_number = start_number;
            self
        }

        fn with_limit(mut self, limit: usize) -> Self {
            self.limit = limit;
            self
        }

        /// Called before every invocation; `Some` replaces the invocation's status.
        fn with_hook(mut self, hook: impl Fn(&[String]) -> Option<EngineStatus> + Send + Sync + 'static) -> Self {
            self.hook = Some(Arc::new(hook));
            self
        }

        fn history(&self) -> Vec<Vec<String>> {
            self.history.lock().unwrap().clone()
        }

        fn count(&self, stage: Stage) -> usize {
            self.history()
                .iter()
                .filter(|argv| stage_of(argv) == Some(stage))
                .count()
        }

        async fn read_media(&self, path: &str) -> Result<Media, String> {
            let bytes = self
                .workspace
                .read_file(path)
                .await
                .map_err(|e| format!("{}: {}", path, e))?;
            Media::parse(&bytes)
        }

        async fn write_media(&self, path: &str, media: &Media) -> Result<(), String> {
            self.workspace
                .write_file(path, media.to_bytes())
                .await
                .map_err(|e| format!("{}: {}", path, e))
        }

        async fn load(&self, path: &str, format: Option<&str>) -> Result<Media, String> {
            match format {
                None => self.read_media(path).await,
                Some("concat") => {
                    let bytes = self
                        .workspace
                        .read_file(path)
                        .await
                        .map_err(|e| format!("{}: {}", path, e))?;
                    let text = String::from_utf8(bytes).map_err(|e| e.to_string())?;
                    let manifest = ConcatManifest::parse(&text).map_err(|e| e.to_string())?;
                    let parts: Vec<String> = manifest
                        .entries()
                        .iter()
                        .map(|entry| join(parent(path), entry))
                        .collect();
                    self.concat_orders.lock().unwrap().push(parts.clone());

                    let mut media = Media::default();
                    for part in parts {
                        media.append(self.read_media(&part).await?)?;
                    }
                    Ok(media)
                }
                Some(other) => Err(format!("Unknown input format: '{}'", other)),
            }
        }

        async fn interpret(&self, argv: &[String]) -> Result<(), String> {
            let invocation = parse_argv(argv)?;
            let mut inputs = Vec::new();
            for (path, format) in &invocation.inputs {
                inputs.push(self.load(path, format.as_deref()).await?);
            }

            for target in &invocation.outputs {
                let tracks = select(&inputs, target)?;
                if tracks.is_empty() {
                    return Err(format!("Output file {} does not contain any stream", target.path));
                }
                match target.format.as_deref() {
                    Some("segment") => {
                        let seconds = target.segment_time.unwrap_or(2.0);
                        let per_segment = ((seconds / FRAME_SECONDS).round() as usize).max(1);
                        let count = tracks
                            .iter()
                            .map(|t| t.frames.len().div_ceil(per_segment))
                            .max()
                            .unwrap_or(0);
                        for i in 0..count {
                            let chunk = Media {
                                tracks: tracks
                                    .iter()
                                    .filter_map(|t| {
                                        let frames: Vec<String> =
                                            t.frames.iter().skip(i * per_segment).take(per_segment).cloned().collect();
                                        (!frames.is_empty()).then(|| Track { frames, ..t.clone() })
                                    })
                                    .collect(),
                            };
                            let path = target.path.replace("%d", &(self.start_number + i).to_string());
                            self.write_media(&path, &chunk).await?;
                        }
                    }
                    None => self.write_media(&target.path, &Media { tracks }).await?,
                    Some(other) => return Err(format!("Unknown output format: '{}'", other)),
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CodecEngine for SimulatedEngine {
        async fn execute(&self, argv: &[String]) -> Result<EngineStatus, Box<dyn Error + Send + Sync>> {
            self.history.lock().unwrap().push(argv.to_vec());
            if let Some(status) = self.hook.as_ref().and_then(|hook| hook(argv)) {
                return Ok(status);
            }
            Ok(match self.interpret(argv).await {
                Ok(()) => EngineStatus::ok(),
                Err(message) => EngineStatus::failed(Some(1), message),
            })
        }

        fn concurrency_limit(&self) -> usize {
            self.limit
        }
    }

    /// Classify an argument vector the way the stage builders produce them.
    fn stage_of(argv: &[String]) -> Option<Stage> {
        let has = |needle: &str| argv.iter().any(|a| a == needle);
        let output = argv.last()?;
        if has("concat") {
            Some(if output.ends_with(".aac") { Stage::ConcatAudio } else { Stage::ConcatVideo })
        } else if has("segment") {
            Some(if output.contains("audio_part_") { Stage::SegmentAudio } else { Stage::SegmentVideo })
        } else if has("-crf") {
            Some(Stage::CompressVideo)
        } else if has("-b:a") {
            Some(Stage::CompressAudio)
        } else if has("1:a:0") {
            Some(Stage::Mux)
        } else if has("0:v:0") || has("0:a:0") {
            Some(Stage::DemuxSplit)
        } else {
            None
        }
    }

    /// Engine whose invocations never finish.
    #[derive(Clone, Default)]
    struct StalledEngine {
        entered: Arc<Notify>,
    }

    #[async_trait]
    impl CodecEngine for StalledEngine {
        async fn execute(&self, _argv: &[String]) -> Result<EngineStatus, Box<dyn Error + Send + Sync>> {
            self.entered.notify_one();
            futures::future::pending().await
        }

        fn concurrency_limit(&self) -> usize {
            1
        }
    }

    struct SimulatedProbe;

    #[async_trait]
    impl MetadataProbe for SimulatedProbe {
        async fn describe(&self, input: &InputFile) -> Result<Metadata, Box<dyn Error + Send + Sync>> {
            let media = Media::parse(&input.bytes)?;
            let format = json!({
                "filename": input.name,
                "format_name": "synthetic",
                "duration": format!("{:.6}", media.duration()),
            });
            let streams: Vec<Value> = media
                .tracks
                .iter()
                .enumerate()
                .map(|(index, t)| json!({"index": index, "codec_type": t.kind, "codec_name": t.codec}))
                .collect();
            Ok(Metadata::from_value(json!({"format": format, "streams": streams}))?)
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            max_workers: 4,
            ..PipelineConfig::default()
        }
    }

    fn orchestrator(
        engine: &SimulatedEngine,
    ) -> PipelineOrchestrator<MemoryWorkspace, SimulatedEngine, SimulatedProbe> {
        PipelineOrchestrator::new(engine.workspace.clone(), engine.clone(), SimulatedProbe, config())
    }

    fn frames_of(media: &Media, kind: &str) -> Vec<String> {
        media.track(kind).map(|t| t.frames.clone()).unwrap_or_default()
    }

    fn encoded(kind: &str, count: usize) -> Vec<String> {
        (0..count)
            .map(|i| frame(kind, i)[..ENCODED_FRAME_LEN].to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_three_and_a_half_seconds_end_to_end() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let output = pipeline
            .submit(InputFile::new("clip.mkv", synthetic(14, true, true)))
            .await
            .unwrap();

        assert_eq!(engine.count(Stage::DemuxSplit), 1);
        assert_eq!(engine.count(Stage::SegmentVideo), 1);
        assert_eq!(engine.count(Stage::SegmentAudio), 1);
        assert_eq!(engine.count(Stage::CompressVideo), 4);
        assert_eq!(engine.count(Stage::CompressAudio), 4);
        assert_eq!(engine.count(Stage::ConcatVideo), 1);
        assert_eq!(engine.count(Stage::ConcatAudio), 1);
        assert_eq!(engine.count(Stage::Mux), 1);

        let duration = output.metadata.duration().unwrap();
        assert!((duration - 3.5).abs() < 1e-6, "{}", duration);
        assert_eq!(output.source_metadata.file_name(), Some("clip.mkv"));
        assert_eq!(output.source_metadata.video_streams()[0].codec, "rawvideo");
        assert_eq!(output.metadata.video_streams()[0].codec, "libx264");
        assert_eq!(output.metadata.audio_streams()[0].codec, "aac");

        let media = Media::parse(&output.bytes).unwrap();
        assert_eq!(frames_of(&media, "video"), encoded("video", 14));
        assert_eq!(frames_of(&media, "audio"), encoded("audio", 14));

        assert!(output.cleanup.is_clean());
        assert!(ws.is_empty(), "{:?}", ws.paths());
    }

    #[tokio::test]
    async fn test_segment_names_follow_native_counter() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone()).with_start_number(2);
        let pipeline = orchestrator(&engine);

        let output = pipeline
            .submit(InputFile::new("clip.mkv", synthetic(14, true, true)))
            .await
            .unwrap();

        let history = engine.history();
        let compress_inputs: Vec<&String> = history
            .iter()
            .filter(|argv| stage_of(argv) == Some(Stage::CompressVideo))
            .map(|argv| &argv[2])
            .collect();
        assert!(compress_inputs.iter().any(|p| p.ends_with("parts_video/video_part_2.mkv")));
        assert!(compress_inputs.iter().all(|p| !p.ends_with("video_part_0.mkv")));

        let orders = engine.concat_orders.lock().unwrap().clone();
        let video_order = orders.iter().find(|o| o[0].ends_with(".mp4")).unwrap();
        let names: Vec<&str> = video_order.iter().map(|p| p.rsplit('/').next().unwrap()).collect();
        assert_eq!(names, vec!["part-0.mp4", "part-1.mp4", "part-2.mp4", "part-3.mp4"]);

        let media = Media::parse(&output.bytes).unwrap();
        assert_eq!(frames_of(&media, "video"), encoded("video", 14));
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_manifest_order_survives_lexicographic_listing() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        // 12 seconds: part-10 and part-11 list before part-2.
        let output = pipeline
            .submit(InputFile::new("clip.mkv", synthetic(48, true, true)))
            .await
            .unwrap();

        let orders = engine.concat_orders.lock().unwrap().clone();
        assert_eq!(orders.len(), 2);
        for order in &orders {
            let indices: Vec<u64> = order
                .iter()
                .map(|p| {
                    let name = p.rsplit('/').next().unwrap();
                    name["part-".len()..name.find('.').unwrap()].parse().unwrap()
                })
                .collect();
            assert_eq!(indices, (0..12).collect::<Vec<_>>());
        }

        let media = Media::parse(&output.bytes).unwrap();
        assert_eq!(frames_of(&media, "video"), encoded("video", 48));
        assert_eq!(frames_of(&media, "audio"), encoded("audio", 48));
    }

    #[tokio::test]
    async fn test_missing_audio_fails_at_audio_concat() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let failure = pipeline
            .submit(InputFile::new("silent.mp4", synthetic(14, true, false)))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            TranscodeError::EmptyStream {
                stage: Stage::ConcatAudio,
                kind: StreamKind::Audio
            }
        ));
        assert_eq!(failure.stage(), Stage::ConcatAudio);
        assert_eq!(engine.count(Stage::DemuxSplit), 1);
        assert_eq!(engine.count(Stage::SegmentVideo), 1);
        assert_eq!(engine.count(Stage::SegmentAudio), 0);
        assert_eq!(engine.count(Stage::CompressVideo), 4);
        assert_eq!(engine.count(Stage::CompressAudio), 0);
        assert_eq!(engine.count(Stage::Mux), 0);

        let history = engine.history();
        let demux = history
            .iter()
            .find(|argv| stage_of(argv) == Some(Stage::DemuxSplit))
            .unwrap();
        assert!(demux.iter().all(|a| !a.ends_with("output-audio.aac")), "{:?}", demux);
        assert!(failure.cleanup.is_clean());
        assert!(ws.is_empty(), "{:?}", ws.paths());
    }

    #[tokio::test]
    async fn test_missing_video_fails_at_video_concat() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let failure = pipeline
            .submit(InputFile::new("voice.m4a", synthetic(8, false, true)))
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            TranscodeError::EmptyStream {
                stage: Stage::ConcatVideo,
                kind: StreamKind::Video
            }
        ));
        assert_eq!(engine.count(Stage::SegmentVideo), 0);
        assert_eq!(engine.count(Stage::Mux), 0);
        assert!(ws.is_empty(), "{:?}", ws.paths());
    }

    #[tokio::test]
    async fn test_demux_split_of_absent_stream_fails() {
        let ws = MemoryWorkspace::new();
        let executor = StageExecutor::new(SimulatedEngine::new(ws.clone()));
        ws.create_dir("j").await.unwrap();
        ws.write_file("j/in.mp4", synthetic(4, true, false)).await.unwrap();

        let err = executor
            .run(&StageCommand::demux_split(
                "j/in.mp4",
                &[(StreamKind::Video, "j/v.mp4"), (StreamKind::Audio, "j/a.aac")],
            ))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TranscodeError::Stage {
                stage: Stage::DemuxSplit,
                status: Some(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_job_still_cleans_up() {
        let ws = MemoryWorkspace::new();
        let engine = StalledEngine::default();
        let entered = engine.entered.clone();
        let pipeline = PipelineOrchestrator::new(ws.clone(), engine, SimulatedProbe, config());

        tokio::select! {
            _ = pipeline.submit(InputFile::new("clip.mp4", synthetic(4, true, true))) => {
                panic!("stalled job finished")
            }
            _ = entered.notified() => {}
        }
        assert!(
            ws.paths().iter().any(|p| p.ends_with("source-clip.mp4")),
            "{:?}",
            ws.paths()
        );

        tokio::time::timeout(Duration::from_secs(5), async {
            while !ws.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_compress_failure_cleans_up() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone()).with_hook(|argv| {
            let failing = stage_of(argv) == Some(Stage::CompressVideo)
                && argv.iter().any(|a| a.ends_with("video_part_1.mkv"));
            failing.then(|| EngineStatus::failed(Some(187), "Error while encoding"))
        });
        let pipeline = orchestrator(&engine);

        let failure = pipeline
            .submit(InputFile::new("clip.mkv", synthetic(14, true, true)))
            .await
            .unwrap_err();

        match &failure.error {
            TranscodeError::Stage { stage, status, message } => {
                assert_eq!(stage.as_str(), "compress-video");
                assert_eq!(*status, Some(187));
                assert_eq!(message, "Error while encoding");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(engine.count(Stage::Mux), 0);
        assert!(failure.cleanup.is_clean());
        assert!(ws.is_empty(), "{:?}", ws.paths());
    }

    #[tokio::test]
    async fn test_cleanup_twice_after_success() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let output = pipeline
            .submit(InputFile::new("clip.mkv", synthetic(6, true, true)))
            .await
            .unwrap();
        assert!(ws.is_empty());

        let job = MediaJob::new(&output.job_id, "clip.mkv", "mkv", 1);
        let again = cleanup_job(&ws, &job).await;
        assert!(again.is_clean());
        assert_eq!(again.removed, 0);
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_copy_stages_preserve_payload() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let executor = StageExecutor::new(engine);
        let input = synthetic(14, true, true);
        let source = Media::parse(&input).unwrap();

        ws.create_dir("j").await.unwrap();
        ws.create_dir("j/parts_video").await.unwrap();
        ws.write_file("j/in.mkv", input).await.unwrap();

        executor
            .run(&StageCommand::demux_split(
                "j/in.mkv",
                &[(StreamKind::Video, "j/v.mkv"), (StreamKind::Audio, "j/a.aac")],
            ))
            .await
            .unwrap();
        let video = Media::parse(&ws.read_file("j/v.mkv").await.unwrap()).unwrap();
        let audio = Media::parse(&ws.read_file("j/a.aac").await.unwrap()).unwrap();
        assert_eq!(video.payload() + audio.payload(), source.payload());
        assert_eq!(video.track("video"), source.track("video"));

        executor
            .run(&StageCommand::segment(
                StreamKind::Video,
                "j/v.mkv",
                "j/parts_video/video_part_%d.mkv",
                1,
            ))
            .await
            .unwrap();
        let mut parts = Vec::new();
        for i in 0..4 {
            let path = format!("j/parts_video/video_part_{}.mkv", i);
            parts.push(Media::parse(&ws.read_file(&path).await.unwrap()).unwrap());
        }
        assert_eq!(ws.list_dir("j/parts_video").await.unwrap().len(), 4);
        assert_eq!(parts.iter().map(Media::payload).sum::<usize>(), video.payload());
        assert!(parts.iter().all(|p| p.payload() > 0));
        assert!((parts[3].duration() - 0.5).abs() < 1e-9);

        let manifest = ConcatManifest::relative_to(
            "j",
            (0..4).map(|i| format!("j/parts_video/video_part_{}.mkv", i)),
        );
        ws.write_file("j/list.txt", manifest.serialize().into_bytes())
            .await
            .unwrap();
        executor
            .run(&StageCommand::concat(StreamKind::Video, "j/list.txt", "j/joined.mkv"))
            .await
            .unwrap();
        let joined = Media::parse(&ws.read_file("j/joined.mkv").await.unwrap()).unwrap();
        assert_eq!(joined, video);
    }

    #[tokio::test]
    async fn test_compression_shrinks_segments() {
        let ws = MemoryWorkspace::new();
        let executor = StageExecutor::new(SimulatedEngine::new(ws.clone()));
        ws.write_file("seg.mkv", synthetic(4, true, false)).await.unwrap();

        executor
            .run(&StageCommand::compress(
                StreamKind::Video,
                "seg.mkv",
                "part-0.mp4",
                &config().encoder(),
            ))
            .await
            .unwrap();

        let before = Media::parse(&ws.read_file("seg.mkv").await.unwrap()).unwrap();
        let after = Media::parse(&ws.read_file("part-0.mp4").await.unwrap()).unwrap();
        assert!(after.payload() < before.payload());
        assert_eq!(after.tracks[0].codec, "libx264");
        assert_eq!(after.duration(), before.duration());
    }

    #[tokio::test]
    async fn test_probe_failure_leaves_workspace_untouched() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let failure = pipeline
            .submit(InputFile::new("clip.mkv", b"not a media file".to_vec()))
            .await
            .unwrap_err();

        assert!(matches!(failure.error, TranscodeError::Probe(_)));
        assert!(engine.history().is_empty());
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_input_name_is_rejected() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let failure = pipeline
            .submit(InputFile::new("../clip.mkv", synthetic(4, true, true)))
            .await
            .unwrap_err();

        assert_eq!(failure.stage(), Stage::Prepare);
        assert!(engine.history().is_empty());
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_extension_falls_back_when_probe_has_none() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        pipeline
            .submit(InputFile::new("clip", synthetic(4, true, true)))
            .await
            .unwrap();

        let history = engine.history();
        let demux = history
            .iter()
            .find(|argv| stage_of(argv) == Some(Stage::DemuxSplit))
            .unwrap();
        assert!(demux.iter().any(|a| a.ends_with("output-video.mp4")));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let failure = pipeline
            .submit_with_cancel(InputFile::new("clip.mkv", synthetic(4, true, true)), cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            TranscodeError::Cancelled {
                stage: Stage::Prepare
            }
        ));
        assert!(engine.history().is_empty());
        assert!(ws.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_during_compression() {
        let ws = MemoryWorkspace::new();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        let engine = SimulatedEngine::new(ws.clone())
            .with_limit(1)
            .with_hook(move |argv| {
                if stage_of(argv) == Some(Stage::CompressVideo) {
                    trigger.cancel();
                }
                None
            });
        let pipeline = orchestrator(&engine);
        assert_eq!(pipeline.concurrency_limit(), 1);

        let failure = pipeline
            .submit_with_cancel(InputFile::new("clip.mkv", synthetic(14, true, true)), cancel)
            .await
            .unwrap_err();

        assert!(matches!(
            failure.error,
            TranscodeError::Cancelled {
                stage: Stage::CompressVideo
            }
        ));
        assert_eq!(engine.count(Stage::CompressVideo), 1);
        assert!(ws.is_empty(), "{:?}", ws.paths());
    }

    #[tokio::test]
    async fn test_concurrent_jobs_share_a_workspace() {
        let ws = MemoryWorkspace::new();
        let engine = SimulatedEngine::new(ws.clone());
        let pipeline = orchestrator(&engine);

        let (a, b) = tokio::join!(
            pipeline.submit(InputFile::new("a.mkv", synthetic(8, true, true))),
            pipeline.submit(InputFile::new("b.mkv", synthetic(12, true, true))),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_ne!(a.job_id, b.job_id);
        assert!((a.metadata.duration().unwrap() - 2.0).abs() < 1e-6);
        assert!((b.metadata.duration().unwrap() - 3.0).abs() < 1e-6);
        assert!(ws.is_empty());
    }
}
