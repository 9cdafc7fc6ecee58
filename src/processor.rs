use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

use crate::error::{MediaError, MediaResult};
use crate::metadata::MediaMetadataResponse;
use crate::probe::Prober;
use crate::transcode::Transcoder;
use crate::workspace::Workspace;

/// 单次媒体处理：元数据查询、音频提取、批量截图、片段截取
pub struct MediaProcessor {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    workspace: Workspace,
}

/// 输入文件必须存在
pub(crate) fn ensure_input(path: &Path) -> MediaResult<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MediaError::NotFound(path.to_path_buf()))
    }
}

/// 解析时间：秒数（"12.5"）或 "HH:MM:SS[.fff]" / "MM:SS"
pub fn parse_time(value: &str) -> MediaResult<f64> {
    let value = value.trim();
    let invalid = || MediaError::validation(format!("无法解析时间: {:?}", value));

    let parts: Vec<&str> = value.split(':').collect();
    if parts.len() > 3 || parts.iter().any(|p| p.trim().is_empty()) {
        return Err(invalid());
    }

    let mut seconds = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let number: f64 = part.trim().parse().map_err(|_| invalid())?;
        // 除最后一段外必须是整数，且分、秒段小于 60
        let is_last = i == parts.len() - 1;
        if !number.is_finite() || number < 0.0 || (!is_last && number.fract() != 0.0) {
            return Err(invalid());
        }
        if i > 0 && number >= 60.0 {
            return Err(invalid());
        }
        seconds = seconds * 60.0 + number;
    }
    Ok(seconds)
}

impl MediaProcessor {
    pub fn new(prober: Arc<dyn Prober>, transcoder: Arc<dyn Transcoder>, workspace: Workspace) -> Self {
        Self {
            prober,
            transcoder,
            workspace,
        }
    }

    pub async fn metadata(&self, input: &Path) -> MediaResult<MediaMetadataResponse> {
        ensure_input(input)?;
        info!("⏳ [媒体处理] 查询元数据: {}", input.display());
        self.prober.metadata(input).await
    }

    /// 提取音轨到 `<workDir>/audio_<token>.wav`
    pub async fn extract_audio(&self, input: &Path) -> MediaResult<PathBuf> {
        ensure_input(input)?;
        let started = Instant::now();
        let output = self.workspace.unique_file("audio", "wav")?;

        self.transcoder.extract_audio(input, &output).await?;
        info!(
            "✅ [媒体处理] 音频提取完成: {}，耗时: {:.2}秒",
            output.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(output)
    }

    /// 按帧率批量截图到 `<workDir>/frames_<token>/`
    pub async fn extract_frames(&self, input: &Path, fps: f64) -> MediaResult<PathBuf> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(MediaError::validation(format!("fps 必须大于 0: {}", fps)));
        }
        ensure_input(input)?;

        let started = Instant::now();
        let job = self.workspace.allocate_with_prefix("frames")?;
        if let Err(e) = self.transcoder.extract_frames(input, fps, job.base_dir()).await {
            error!("❌ [媒体处理] 批量截图失败: {}", e);
            job.discard();
            return Err(e);
        }

        info!(
            "✅ [媒体处理] 批量截图完成: {}，耗时: {:.2}秒",
            job.base_dir().display(),
            started.elapsed().as_secs_f64()
        );
        Ok(job.base_dir().to_path_buf())
    }

    /// 截取 `[start, end)` 到 `<workDir>/clip_<token>.mp4`
    pub async fn create_clip(&self, input: &Path, start: &str, end: &str) -> MediaResult<PathBuf> {
        let start = parse_time(start)?;
        let end = parse_time(end)?;
        if end <= start {
            return Err(MediaError::validation(format!(
                "结束时间必须大于开始时间: {} ~ {}",
                start, end
            )));
        }
        ensure_input(input)?;

        let output = self.workspace.unique_file("clip", "mp4")?;
        self.transcoder
            .cut_clip(input, start, end - start, &output)
            .await?;
        info!("✅ [媒体处理] 片段截取完成: {}", output.display());
        Ok(output)
    }
}
