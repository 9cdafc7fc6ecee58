use serde::{Deserialize, Serialize};

/// 场景分析请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    /// 输入视频文件路径（服务器本地路径）
    pub path: String,
    /// 场景变化检测阈值 (0.0-1.0)，未提供时使用配置中的默认值
    #[serde(default)]
    pub threshold: Option<f64>,
}

/// 单个场景的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResult {
    /// 场景开始时间（秒）
    pub start_time: f64,
    /// 场景结束时间（秒）
    pub end_time: f64,
    /// 场景视频片段的绝对路径
    pub clip_path: String,
    /// 场景缩略图的绝对路径
    pub thumbnail_path: String,
}

/// 场景分析响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    /// 实际生成的场景数量
    pub total_scenes: usize,
    pub scenes: Vec<SceneResult>,
}

impl AnalyzeResponse {
    pub fn new(scenes: Vec<SceneResult>) -> Self {
        Self {
            total_scenes: scenes.len(),
            scenes,
        }
    }
}

/// 媒体文件元数据（从 ffprobe 输出整理而来）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadataResponse {
    pub filename: String,
    /// 时长（秒）
    pub duration: f64,
    /// 文件大小（字节）
    pub size: u64,
    pub bit_rate: u64,
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    pub name: String,
    pub long_name: String,
}

/// 单个流（视频 / 音频 / 字幕）的信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub codec_name: String,
    pub codec_long_name: String,
    /// VIDEO、AUDIO 等
    pub codec_type: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractAudioRequest {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractFramesRequest {
    pub path: String,
    /// 每秒提取的帧数
    pub fps: f64,
}

/// 片段截取请求，时间支持秒数（"12.5"）或 "HH:MM:SS[.fff]" / "MM:SS"
#[derive(Debug, Clone, Deserialize)]
pub struct CreateClipRequest {
    pub path: String,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataQuery {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPathResponse {
    pub message: String,
    pub output_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputDirResponse {
    pub message: String,
    pub output_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
