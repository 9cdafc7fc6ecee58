//! ffprobe 封装：读取时长、检测场景切换时间点、读取媒体元数据。

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::pin::Pin;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, error, trace, warn};

use crate::command::ProcessRunner;
use crate::error::{MediaError, MediaResult};
use crate::metadata::{FormatInfo, MediaMetadataResponse, StreamInfo};

/// 场景切换时间点序列（秒），惰性产生、只能遍历一次
pub type TimestampStream = Pin<Box<dyn Stream<Item = f64> + Send>>;

/// 时间点通道容量
const TIMESTAMP_BUFFER: usize = 64;

/// 媒体探测能力
#[async_trait]
pub trait Prober: Send + Sync {
    /// 容器级时长（秒）
    async fn duration(&self, path: &Path) -> MediaResult<f64>;

    /// 按阈值检测场景切换时间点
    ///
    /// 进程启动失败、退出码非零或读取失败都只记录日志，表现为序列提前结束（或为空）。
    async fn scene_timestamps(&self, path: &Path, threshold: f64) -> TimestampStream;

    /// 容器与各个流的元数据
    async fn metadata(&self, path: &Path) -> MediaResult<MediaMetadataResponse>;
}

/// 基于 ffprobe 可执行文件的实现
#[derive(Debug, Clone)]
pub struct FfprobeClient {
    runner: ProcessRunner,
}

impl FfprobeClient {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }
}

/// 场景检测参数：`movie=<path>,select=gt(scene\,<threshold>)`
pub fn scene_detection_args(path: &Path, threshold: f64) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "frame=pts_time".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        "-f".to_string(),
        "lavfi".to_string(),
        "-i".to_string(),
        format!(
            "movie={},select=gt(scene\\,{:.6})",
            path.to_string_lossy(),
            threshold
        ),
    ]
}

fn duration_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-show_entries".to_string(),
        "format=duration".to_string(),
        "-of".to_string(),
        "default=noprint_wrappers=1:nokey=1".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

fn metadata_args(path: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "quiet".to_string(),
        "-print_format".to_string(),
        "json".to_string(),
        "-show_format".to_string(),
        "-show_streams".to_string(),
        path.to_string_lossy().to_string(),
    ]
}

/// 解析一行输出为时间点；空行和非数值行返回 None
pub(crate) fn parse_timestamp(line: &str) -> Option<f64> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.parse::<f64>().ok().filter(|t| t.is_finite())
}

#[async_trait]
impl Prober for FfprobeClient {
    async fn duration(&self, path: &Path) -> MediaResult<f64> {
        let output = self.runner.output(&duration_args(path)).await?;
        if !output.success {
            return Err(MediaError::probe_failed(
                format!("读取时长失败: {}", output.stderr.trim()),
                output.exit_code,
            ));
        }

        output
            .stdout
            .lines()
            .find_map(parse_timestamp)
            .ok_or_else(|| {
                MediaError::probe_failed(
                    format!("无法解析时长输出: {:?}", output.stdout.trim()),
                    output.exit_code,
                )
            })
    }

    async fn scene_timestamps(&self, path: &Path, threshold: f64) -> TimestampStream {
        let (tx, rx) = mpsc::channel(TIMESTAMP_BUFFER);
        let args = scene_detection_args(path, threshold);

        match self.runner.spawn_lines(&args, TIMESTAMP_BUFFER) {
            Ok(mut lines) => {
                tokio::spawn(async move {
                    let mut count = 0usize;
                    while let Some(line) = lines.next_line().await {
                        match parse_timestamp(&line) {
                            Some(t) => {
                                count += 1;
                                if tx.send(t).await.is_err() {
                                    break;
                                }
                            }
                            None if !line.trim().is_empty() => {
                                trace!("[ffprobe] 忽略非数值输出: {}", line);
                            }
                            None => {}
                        }
                    }

                    match lines.wait().await {
                        Ok(status) if status.success() => {
                            debug!("[ffprobe] 场景检测结束，输出 {} 个时间点", count);
                        }
                        Ok(status) => {
                            warn!("⚠️  [ffprobe] 场景检测退出码非零: {:?}", status.code());
                        }
                        Err(e) => {
                            error!("❌ [ffprobe] 场景检测进程异常: {}", e);
                        }
                    }
                });
            }
            Err(e) => {
                error!("❌ [ffprobe] 启动场景检测失败: {}", e);
            }
        }

        Box::pin(ReceiverStream::new(rx))
    }

    async fn metadata(&self, path: &Path) -> MediaResult<MediaMetadataResponse> {
        let output = self.runner.output(&metadata_args(path)).await?;
        if !output.success {
            return Err(MediaError::probe_failed(
                format!("读取元数据失败: {}", output.stderr.trim()),
                output.exit_code,
            ));
        }
        parse_metadata(&output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    filename: Option<String>,
    format_name: Option<String>,
    format_long_name: Option<String>,
    duration: Option<String>,
    size: Option<String>,
    bit_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    codec_long_name: Option<String>,
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
}

/// 将 `ffprobe -print_format json` 的输出整理为响应结构
pub(crate) fn parse_metadata(json: &str) -> MediaResult<MediaMetadataResponse> {
    let probe: FfprobeOutput = serde_json::from_str(json)?;
    let format = probe
        .format
        .ok_or_else(|| MediaError::probe_failed("ffprobe 输出缺少 format 信息", None))?;

    let streams = probe
        .streams
        .into_iter()
        .map(|s| StreamInfo {
            codec_name: s.codec_name.unwrap_or_default(),
            codec_long_name: s.codec_long_name.unwrap_or_default(),
            codec_type: s
                .codec_type
                .map(|t| t.to_uppercase())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            frame_rate: s.avg_frame_rate.unwrap_or_else(|| "N/A".to_string()),
        })
        .collect();

    Ok(MediaMetadataResponse {
        filename: format.filename.unwrap_or_default(),
        duration: format
            .duration
            .as_deref()
            .and_then(|d| d.parse().ok())
            .unwrap_or(0.0),
        size: format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
        bit_rate: format
            .bit_rate
            .as_deref()
            .and_then(|b| b.parse().ok())
            .unwrap_or(0),
        format: FormatInfo {
            name: format.format_name.unwrap_or_default(),
            long_name: format.format_long_name.unwrap_or_default(),
        },
        streams,
    })
}
