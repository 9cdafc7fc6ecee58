use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Query, State},
    http::StatusCode,
    response::Json as ResponseJson,
    routing::{get, post},
    Router,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::command::ProcessRunner;
use crate::config::ServiceConfig;
use crate::error::{MediaError, MediaResult};
use crate::metadata::{
    AnalyzeRequest, AnalyzeResponse, CreateClipRequest, ErrorResponse, ExtractAudioRequest,
    ExtractFramesRequest, MediaMetadataResponse, MetadataQuery, OutputDirResponse,
    OutputPathResponse, UploadResponse,
};
use crate::probe::{FfprobeClient, Prober};
use crate::processor::{ensure_input, MediaProcessor};
use crate::scene_analyzer::SceneAnalyzer;
use crate::storage::FileStorage;
use crate::transcode::{FfmpegClient, Transcoder};
use crate::workspace::Workspace;

type ApiError = (StatusCode, ResponseJson<ErrorResponse>);
type ApiResult<T> = Result<ResponseJson<T>, ApiError>;

/// 服务共享状态
#[derive(Clone)]
pub struct AppState {
    pub analyzer: Arc<SceneAnalyzer>,
    pub processor: Arc<MediaProcessor>,
    pub storage: Arc<FileStorage>,
    /// 请求未携带 threshold 时使用
    pub default_threshold: f64,
}

impl AppState {
    /// 用已校验的配置构造 ffmpeg / ffprobe 客户端
    pub fn from_config(config: &ServiceConfig) -> MediaResult<Self> {
        let runner = |program: &Path| {
            let runner = ProcessRunner::new(program);
            match config.process_timeout_secs {
                Some(secs) => runner.with_timeout(secs),
                None => runner,
            }
        };
        let prober = Arc::new(FfprobeClient::new(runner(config.ffprobe_path.as_path())));
        let transcoder = Arc::new(FfmpegClient::new(runner(config.ffmpeg_path.as_path())));
        Self::with_clients(prober, transcoder, &config.work_dir, config.default_threshold)
    }

    pub fn with_clients(
        prober: Arc<dyn Prober>,
        transcoder: Arc<dyn Transcoder>,
        work_dir: &Path,
        default_threshold: f64,
    ) -> MediaResult<Self> {
        let workspace = Workspace::new(work_dir);
        Ok(Self {
            analyzer: Arc::new(SceneAnalyzer::new(
                prober.clone(),
                transcoder.clone(),
                workspace.clone(),
            )),
            processor: Arc::new(MediaProcessor::new(prober, transcoder, workspace)),
            storage: Arc::new(FileStorage::new(work_dir)?),
            default_threshold,
        })
    }
}

/// 构建全部路由
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route(
            "/media/upload",
            post(handle_upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/media/metadata", get(handle_metadata))
        .route("/media/audio", post(handle_extract_audio))
        .route("/media/frames", post(handle_extract_frames))
        .route("/media/clip", post(handle_create_clip))
        .route("/media/scenes", post(handle_analyze))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn api_error(err: MediaError) -> ApiError {
    let status = match &err {
        MediaError::Validation(_) => StatusCode::BAD_REQUEST,
        MediaError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        error!("❌ [请求处理] {}", err);
    } else {
        warn!("⚠️  [请求处理] {}", err);
    }
    (
        status,
        ResponseJson(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

/// 健康检查 Handler
pub async fn health_check() -> &'static str {
    "OK"
}

/// 场景分析：检测场景并为每个场景生成片段和缩略图
pub async fn handle_analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<AnalyzeResponse> {
    info!("收到场景分析请求: {:?}", request);

    let threshold = request.threshold.unwrap_or(state.default_threshold);
    if !threshold.is_finite() || !(0.0..=1.0).contains(&threshold) {
        return Err(api_error(MediaError::validation(format!(
            "threshold 必须在 0.0-1.0 之间: {}",
            threshold
        ))));
    }

    let input = PathBuf::from(&request.path);
    ensure_input(&input).map_err(api_error)?;

    let response = state
        .analyzer
        .analyze(&input, threshold)
        .await
        .map_err(api_error)?;
    Ok(ResponseJson(response))
}

/// 查询媒体元数据
pub async fn handle_metadata(
    State(state): State<AppState>,
    Query(query): Query<MetadataQuery>,
) -> ApiResult<MediaMetadataResponse> {
    info!("元数据查询请求: {}", query.path);
    let metadata = state
        .processor
        .metadata(Path::new(&query.path))
        .await
        .map_err(api_error)?;
    Ok(ResponseJson(metadata))
}

/// 提取音频为 WAV
pub async fn handle_extract_audio(
    State(state): State<AppState>,
    Json(request): Json<ExtractAudioRequest>,
) -> ApiResult<OutputPathResponse> {
    info!("音频提取请求: {}", request.path);
    let output = state
        .processor
        .extract_audio(Path::new(&request.path))
        .await
        .map_err(api_error)?;
    Ok(ResponseJson(OutputPathResponse {
        message: "音频提取完成".to_string(),
        output_path: output.to_string_lossy().to_string(),
    }))
}

/// 按帧率批量截图
pub async fn handle_extract_frames(
    State(state): State<AppState>,
    Json(request): Json<ExtractFramesRequest>,
) -> ApiResult<OutputDirResponse> {
    info!("帧提取请求: path={}, fps={}", request.path, request.fps);
    let output_dir = state
        .processor
        .extract_frames(Path::new(&request.path), request.fps)
        .await
        .map_err(api_error)?;
    Ok(ResponseJson(OutputDirResponse {
        message: "帧提取完成".to_string(),
        output_dir: output_dir.to_string_lossy().to_string(),
    }))
}

/// 截取片段
pub async fn handle_create_clip(
    State(state): State<AppState>,
    Json(request): Json<CreateClipRequest>,
) -> ApiResult<OutputPathResponse> {
    info!(
        "片段截取请求: path={}, start={}, end={}",
        request.path, request.start, request.end
    );
    let output = state
        .processor
        .create_clip(Path::new(&request.path), &request.start, &request.end)
        .await
        .map_err(api_error)?;
    Ok(ResponseJson(OutputPathResponse {
        message: "片段截取完成".to_string(),
        output_path: output.to_string_lossy().to_string(),
    }))
}

/// 上传媒体文件（multipart 字段名 `file`），返回保存后的绝对路径
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<UploadResponse> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        api_error(MediaError::validation(format!("读取上传内容失败: {}", e)))
    };

    while let Some(mut field) = multipart.next_field().await.map_err(bad_request)? {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        info!("文件上传请求: {}", file_name);

        let (path, mut file) = state.storage.create(&file_name).await.map_err(api_error)?;
        let mut written = 0usize;
        while let Some(chunk) = field.chunk().await.map_err(bad_request)? {
            written += chunk.len();
            file.write_all(&chunk)
                .await
                .map_err(|e| api_error(e.into()))?;
        }
        file.flush().await.map_err(|e| api_error(e.into()))?;

        info!("💾 文件保存完成: {} ({} bytes)", path.display(), written);
        return Ok(ResponseJson(UploadResponse {
            message: "文件上传成功".to_string(),
            path: path.to_string_lossy().to_string(),
        }));
    }

    Err(api_error(MediaError::validation("缺少 file 字段")))
}
