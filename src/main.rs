use minivid::adapters::local::{http, FfmpegCli, LocalWorkspace};
use minivid::{LocalConfig, PipelineOrchestrator};
use std::error::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = LocalConfig::from_env();

    let workspace = LocalWorkspace::create(&config.workspace_dir).await?;
    let engine = FfmpegCli::load(
        &config.ffmpeg_bin,
        workspace.root(),
        config.pipeline.max_workers,
    )
    .await?;
    #[cfg(feature = "native-probe")]
    let probe = minivid::adapters::local::NativeProbe::new();
    #[cfg(not(feature = "native-probe"))]
    let probe = minivid::adapters::local::FfprobeCli::new(&config.ffprobe_bin);

    let pipeline = PipelineOrchestrator::new(workspace, engine, probe, config.pipeline.clone());
    let app = http::router(pipeline, config.max_concurrent_jobs);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port)).await?;
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app).await?;
    Ok(())
}
