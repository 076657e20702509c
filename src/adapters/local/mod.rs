//! Local adapters: filesystem workspace, ffmpeg/ffprobe binaries, HTTP surface.

pub mod ffmpeg;
pub mod ffprobe;
pub mod fs;
pub mod http;
#[cfg(feature = "native-probe")]
pub mod native_probe;

pub use ffmpeg::FfmpegCli;
pub use ffprobe::FfprobeCli;
pub use fs::LocalWorkspace;
#[cfg(feature = "native-probe")]
pub use native_probe::NativeProbe;
