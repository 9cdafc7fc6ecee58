pub mod command;
pub mod config;
pub mod error;
pub mod handler;
pub mod metadata;
pub mod probe;
pub mod processor;
pub mod scene_analyzer;
pub mod segment;
pub mod storage;
pub mod transcode;
pub mod workspace;

pub use command::{ChildLines, CommandOutput, ProcessRunner};
pub use config::{ConfigLoader, ConfigOverrides, ServiceConfig};
pub use error::{MediaError, MediaResult};
pub use handler::{build_router, AppState};
pub use metadata::{AnalyzeRequest, AnalyzeResponse, MediaMetadataResponse, SceneResult};
pub use probe::{FfprobeClient, Prober, TimestampStream};
pub use processor::{parse_time, MediaProcessor};
pub use scene_analyzer::SceneAnalyzer;
pub use segment::{build_segments, SceneSegment};
pub use storage::FileStorage;
pub use transcode::{FfmpegClient, Transcoder};
pub use workspace::{JobWorkspace, Workspace};
