//! The conversion pipeline.
//!
//! One job runs through: write input → demux-split → segment both streams →
//! compress every segment → concatenate per kind → mux → read output → cleanup.
//! Stage ordering is expressed as two task graphs keyed by workspace paths; the
//! raw segment listings between them decide how many compression tasks exist.

use super::cleanup::{cleanup_job, CleanupReport};
use super::graph::{RunError, TaskGraph, TaskId};
use super::stages::StageExecutor;
use crate::config::PipelineConfig;
use crate::domain::av::manifest::ConcatManifest;
use crate::domain::av::metadata::Metadata;
use crate::domain::av::segments::{
    IndexOrigin, NamerError, SegmentListing, SegmentNamer, SegmentStage, StreamKind,
    OUTPUT_EXTENSION,
};
use crate::domain::av::stages::{EncoderSettings, Stage, StageCommand};
use crate::domain::jobs::{InputFile, JobState, MediaJob};
use crate::domain::paths::{parent, validate_component};
use crate::error::TranscodeError;
use crate::ports::engine::CodecEngine;
use crate::ports::probe::MetadataProbe;
use crate::ports::workspace::WorkspacePort;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Result of a successful job.
#[derive(Debug)]
pub struct JobOutput {
    pub job_id: String,
    pub bytes: Vec<u8>,
    /// Probed metadata of the submitted file.
    pub source_metadata: Metadata,
    /// Probed metadata of the produced file.
    pub metadata: Metadata,
    pub cleanup: CleanupReport,
}

/// A failed job. Cleanup problems travel alongside the primary error.
#[derive(Debug, thiserror::Error)]
#[error("job {job_id} failed: {error}")]
pub struct JobFailure {
    pub job_id: String,
    #[source]
    pub error: TranscodeError,
    pub cleanup: CleanupReport,
}

impl JobFailure {
    pub fn stage(&self) -> Stage {
        self.error.stage()
    }
}

#[derive(Debug)]
enum Step {
    Run(StageCommand),
    /// List compressed segments, write the manifest, then concatenate.
    Concat {
        kind: StreamKind,
        manifest: String,
        output: String,
    },
}

impl Step {
    fn stage(&self) -> Stage {
        match self {
            Step::Run(command) => command.stage,
            Step::Concat { kind, .. } => Stage::concat(*kind),
        }
    }
}

/// A graph task and the job state reached once every task of its phase is done.
#[derive(Debug)]
struct PlannedStep {
    step: Step,
    phase: JobState,
}

/// Advances the job state machine as phases drain.
struct PhaseTracker {
    pending: BTreeMap<JobState, usize>,
}

impl PhaseTracker {
    fn new(phases: &[JobState], graph: &TaskGraph<PlannedStep>) -> Self {
        let mut pending: BTreeMap<JobState, usize> = phases.iter().map(|p| (*p, 0)).collect();
        for planned in graph.tasks() {
            *pending.entry(planned.phase).or_default() += 1;
        }
        Self { pending }
    }

    fn complete(&mut self, phase: JobState, job: &mut MediaJob) {
        if let Some(count) = self.pending.get_mut(&phase) {
            *count = count.saturating_sub(1);
        }
        self.settle(job);
    }

    fn settle(&mut self, job: &mut MediaJob) {
        while let Some(next) = job.state().next() {
            if self.pending.get(&next) != Some(&0) {
                break;
            }
            self.pending.remove(&next);
            job.advance(next);
        }
    }
}

/// Cleans a job's workspace entries up in the background if the job future is
/// dropped before its own cleanup finished.
struct CleanupOnDrop<W: WorkspacePort + Clone + 'static> {
    workspace: W,
    job: Option<MediaJob>,
}

impl<W: WorkspacePort + Clone + 'static> CleanupOnDrop<W> {
    fn arm(workspace: &W, job: &MediaJob) -> Self {
        Self {
            workspace: workspace.clone(),
            job: Some(job.clone()),
        }
    }

    fn disarm(&mut self) {
        self.job = None;
    }
}

impl<W: WorkspacePort + Clone + 'static> Drop for CleanupOnDrop<W> {
    fn drop(&mut self) {
        let Some(job) = self.job.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("Job {} dropped outside a runtime, workspace entries left behind", job.id);
            return;
        };
        warn!("Job {} dropped before cleanup, cleaning up in the background", job.id);
        let workspace = self.workspace.clone();
        runtime.spawn(async move {
            let report = cleanup_job(&workspace, &job).await;
            info!(
                "Job {}: background cleanup removed {} paths, {} errors",
                job.id,
                report.removed,
                report.errors.len()
            );
        });
    }
}

pub struct PipelineOrchestrator<W, E, P> {
    workspace: W,
    executor: StageExecutor<E>,
    probe: P,
    config: PipelineConfig,
    encoder: EncoderSettings,
}

impl<W, E, P> PipelineOrchestrator<W, E, P>
where
    W: WorkspacePort + Clone + 'static,
    E: CodecEngine,
    P: MetadataProbe,
{
    pub fn new(workspace: W, engine: E, probe: P, config: PipelineConfig) -> Self {
        let encoder = config.encoder();
        Self {
            workspace,
            executor: StageExecutor::new(engine),
            probe,
            config,
            encoder,
        }
    }

    pub fn workspace(&self) -> &W {
        &self.workspace
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Concurrent engine invocations allowed inside one job.
    pub fn concurrency_limit(&self) -> usize {
        self.config
            .max_workers
            .min(self.executor.engine().concurrency_limit())
            .max(1)
    }

    pub async fn describe(&self, input: &InputFile) -> Result<Metadata, TranscodeError> {
        self.probe
            .describe(input)
            .await
            .map_err(|e| TranscodeError::Probe(e.to_string()))
    }

    pub async fn submit(&self, input: InputFile) -> Result<JobOutput, JobFailure> {
        self.submit_with_cancel(input, CancellationToken::new()).await
    }

    /// Convert `input`, stopping before the next stage once `cancel` fires.
    ///
    /// Cleanup always runs to completion, whatever the outcome. Dropping the
    /// returned future hands cleanup to a background task; prefer cancelling
    /// through `cancel` so that no engine invocation is killed mid-write.
    pub async fn submit_with_cancel(
        &self,
        input: InputFile,
        cancel: CancellationToken,
    ) -> Result<JobOutput, JobFailure> {
        let job_id = Uuid::new_v4().to_string();
        let fail = |job_id: String, error: TranscodeError, cleanup: CleanupReport| {
            error!("Job {} failed at {}: {}", job_id, error.stage(), error);
            JobFailure {
                job_id,
                error,
                cleanup,
            }
        };

        if let Err(err) = validate_component(&input.name) {
            let error = TranscodeError::workspace(Stage::Prepare)(err);
            return Err(fail(job_id, error, CleanupReport::default()));
        }
        let metadata = match self.describe(&input).await {
            Ok(metadata) => metadata,
            Err(error) => return Err(fail(job_id, error, CleanupReport::default())),
        };

        let extension = metadata.extension_or(&self.config.fallback_extension);
        let streams = metadata.stream_kinds();
        let mut job = MediaJob::new(&job_id, &input.name, &extension, self.config.segment_duration);
        info!(
            "Job {}: converting {} ({} bytes, .{}, streams {:?})",
            job_id,
            input.name,
            input.bytes.len(),
            extension,
            streams
        );
        for kind in StreamKind::ALL.into_iter().filter(|kind| !streams.contains(kind)) {
            warn!("Job {}: input has no {} stream", job_id, kind);
        }

        let mut guard = CleanupOnDrop::arm(&self.workspace, &job);
        let result = self.run_job(&mut job, input, &streams, &cancel).await;
        let cleanup = cleanup_job(&self.workspace, &job).await;
        guard.disarm();
        job.advance(JobState::CleanedUp);

        let bytes = match result {
            Ok(bytes) => bytes,
            Err(error) => return Err(fail(job_id, error, cleanup)),
        };
        let output = InputFile::new(format!("output.{}", OUTPUT_EXTENSION), bytes);
        match self.describe(&output).await {
            Ok(output_metadata) => {
                info!("Job {}: produced {} bytes", job_id, output.bytes.len());
                Ok(JobOutput {
                    job_id,
                    bytes: output.bytes,
                    source_metadata: metadata,
                    metadata: output_metadata,
                    cleanup,
                })
            }
            Err(error) => Err(fail(job_id, error, cleanup)),
        }
    }

    async fn run_job(
        &self,
        job: &mut MediaJob,
        input: InputFile,
        streams: &[StreamKind],
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, TranscodeError> {
        if cancel.is_cancelled() {
            return Err(TranscodeError::Cancelled {
                stage: Stage::Prepare,
            });
        }

        self.workspace
            .create_dir(&job.paths.root)
            .await
            .map_err(TranscodeError::workspace(Stage::Prepare))?;
        self.workspace
            .write_file(&job.paths.input, input.bytes)
            .await
            .map_err(TranscodeError::workspace(Stage::Prepare))?;
        for dir in job.namer.directories() {
            self.workspace
                .create_dir(&dir)
                .await
                .map_err(TranscodeError::workspace(Stage::Prepare))?;
        }
        job.advance(JobState::Loaded);

        let graph = self.segmentation_graph(job, streams);
        self.run_graph(job, &graph, &[JobState::Split, JobState::Segmented], cancel)
            .await?;

        let mut raw = Vec::new();
        for kind in StreamKind::ALL {
            let listing = self
                .list_segments(&job.namer, kind, SegmentStage::Raw, Stage::segment(kind))
                .await?;
            if let Some(origin) = listing.origin {
                job.record_origin(kind, SegmentStage::Raw, origin);
            }
            info!(
                "Job {}: {} raw {} segments, native origin {:?}",
                job.id,
                listing.len(),
                kind,
                job.origin(kind, SegmentStage::Raw).map(|o| o.0)
            );
            raw.push(listing);
        }

        let graph = self.assembly_graph(job, &raw);
        self.run_graph(
            job,
            &graph,
            &[JobState::Compressed, JobState::Concatenated, JobState::Muxed],
            cancel,
        )
        .await?;

        let bytes = self
            .workspace
            .read_file(&job.paths.output)
            .await
            .map_err(TranscodeError::workspace(Stage::Extract))?;
        job.advance(JobState::Extracted);
        Ok(bytes)
    }

    /// Split and segment the streams the input carries. A missing kind keeps an
    /// empty raw directory and fails at its concat stage.
    fn segmentation_graph(&self, job: &MediaJob, streams: &[StreamKind]) -> TaskGraph<PlannedStep> {
        let paths = &job.paths;
        let mut graph = TaskGraph::new();
        if streams.is_empty() {
            return graph;
        }
        let outputs: Vec<(StreamKind, &str)> = streams
            .iter()
            .map(|kind| (*kind, paths.raw_stream(*kind)))
            .collect();
        graph.add(
            PlannedStep {
                step: Step::Run(StageCommand::demux_split(&paths.input, &outputs)),
                phase: JobState::Split,
            },
            [paths.input.clone()],
            outputs.iter().map(|(_, output)| output.to_string()),
        );
        for &kind in streams {
            let template = job.namer.segment_template(kind);
            graph.add(
                PlannedStep {
                    step: Step::Run(StageCommand::segment(
                        kind,
                        paths.raw_stream(kind),
                        &template,
                        job.segment_duration,
                    )),
                    phase: JobState::Segmented,
                },
                [paths.raw_stream(kind).to_string()],
                [job.namer.directory(kind, SegmentStage::Raw)],
            );
        }
        graph
    }

    fn assembly_graph(&self, job: &MediaJob, raw: &[SegmentListing]) -> TaskGraph<PlannedStep> {
        let paths = &job.paths;
        let mut graph = TaskGraph::new();

        for listing in raw {
            let kind = listing.kind;
            let mut compressed = Vec::with_capacity(listing.len());
            for (index, segment) in listing.logical() {
                let output = job.namer.segment_path(kind, SegmentStage::Compressed, index);
                graph.add(
                    PlannedStep {
                        step: Step::Run(StageCommand::compress(
                            kind,
                            &segment.path,
                            &output,
                            &self.encoder,
                        )),
                        phase: JobState::Compressed,
                    },
                    [segment.path.clone()],
                    [output.clone()],
                );
                compressed.push(output);
            }

            let manifest = paths.manifest(kind).to_string();
            let output = paths.concatenated(kind).to_string();
            graph.add(
                PlannedStep {
                    step: Step::Concat {
                        kind,
                        manifest: manifest.clone(),
                        output: output.clone(),
                    },
                    phase: JobState::Concatenated,
                },
                compressed,
                [manifest, output],
            );
        }

        graph.add(
            PlannedStep {
                step: Step::Run(StageCommand::mux(
                    &paths.compressed_video,
                    &paths.compressed_audio,
                    &paths.output,
                )),
                phase: JobState::Muxed,
            },
            [paths.compressed_video.clone(), paths.compressed_audio.clone()],
            [paths.output.clone()],
        );
        graph
    }

    async fn run_graph(
        &self,
        job: &mut MediaJob,
        graph: &TaskGraph<PlannedStep>,
        phases: &[JobState],
        cancel: &CancellationToken,
    ) -> Result<(), TranscodeError> {
        let mut tracker = PhaseTracker::new(phases, graph);
        tracker.settle(job);

        let namer = job.namer.clone();
        let namer = &namer;
        let this = self;
        let result = graph
            .run(
                self.concurrency_limit(),
                cancel,
                move |_, planned| this.run_step(namer, &planned.step),
                |id: TaskId| tracker.complete(graph.task(id).phase, job),
            )
            .await;

        result.map_err(|err| match err {
            RunError::Task(err) => err,
            RunError::Cancelled { pending } => TranscodeError::Cancelled {
                stage: pending.map_or(Stage::Extract, |id| graph.task(id).step.stage()),
            },
            RunError::Graph(err) => TranscodeError::InvalidCommand {
                stage: graph.tasks().next().map_or(Stage::Prepare, |t| t.step.stage()),
                reason: err.to_string(),
            },
        })
    }

    async fn run_step(&self, namer: &SegmentNamer, step: &Step) -> Result<(), TranscodeError> {
        match step {
            Step::Run(command) => self.executor.run(command).await,
            Step::Concat {
                kind,
                manifest,
                output,
            } => self.concat(namer, *kind, manifest, output).await,
        }
    }

    async fn list_segments(
        &self,
        namer: &SegmentNamer,
        kind: StreamKind,
        stage: SegmentStage,
        during: Stage,
    ) -> Result<SegmentListing, TranscodeError> {
        let dir = namer.directory(kind, stage);
        let entries = self
            .workspace
            .list_dir(&dir)
            .await
            .map_err(TranscodeError::workspace(during))?;
        namer
            .recover(kind, stage, &entries)
            .map_err(|source| TranscodeError::Segments {
                stage: during,
                dir,
                source,
            })
    }

    async fn concat(
        &self,
        namer: &SegmentNamer,
        kind: StreamKind,
        manifest_path: &str,
        output: &str,
    ) -> Result<(), TranscodeError> {
        let stage = Stage::concat(kind);
        let listing = self
            .list_segments(namer, kind, SegmentStage::Compressed, stage)
            .await?;
        if listing.is_empty() {
            return Err(TranscodeError::EmptyStream { stage, kind });
        }
        // Compressed segments carry logical indices.
        if let Some(IndexOrigin(found)) = listing.origin.filter(|o| o.0 != 0) {
            return Err(TranscodeError::Segments {
                stage,
                dir: namer.directory(kind, SegmentStage::Compressed),
                source: NamerError::Gap { expected: 0, found },
            });
        }

        let manifest = ConcatManifest::relative_to(parent(manifest_path), listing.paths());
        self.workspace
            .write_file(manifest_path, manifest.serialize().into_bytes())
            .await
            .map_err(TranscodeError::workspace(stage))?;
        self.executor
            .run(&StageCommand::concat(kind, manifest_path, output))
            .await
    }
}
