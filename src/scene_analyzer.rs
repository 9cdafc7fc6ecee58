use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::error::MediaResult;
use crate::metadata::{AnalyzeResponse, SceneResult};
use crate::probe::Prober;
use crate::segment::{build_segments, SceneSegment};
use crate::transcode::Transcoder;
use crate::workspace::{JobWorkspace, Workspace};

/// 短于该时长（秒）的场景视为噪声，不生成片段
pub const MIN_SCENE_DURATION: f64 = 0.5;

/// 阈值大于该值时才允许降低阈值重试
pub const RETRY_THRESHOLD_GUARD: f64 = 0.1;

/// 重试阈值下限
pub const RETRY_THRESHOLD_FLOOR: f64 = 0.05;

/// 场景分析器：检测场景切换，按场景切分片段并生成缩略图
///
/// 分析器本身不持有任务状态，多个任务可以并发调用，
/// 每个任务写入各自独立的工作目录。
pub struct SceneAnalyzer {
    prober: Arc<dyn Prober>,
    transcoder: Arc<dyn Transcoder>,
    workspace: Workspace,
}

impl SceneAnalyzer {
    pub fn new(prober: Arc<dyn Prober>, transcoder: Arc<dyn Transcoder>, workspace: Workspace) -> Self {
        Self {
            prober,
            transcoder,
            workspace,
        }
    }

    /// 分析视频并为每个场景生成 `scene_NNN.mp4` 和 `thumb_NNN.jpg`
    ///
    /// 只有工作目录分配失败会导致整个任务失败；探测失败退化为单场景，
    /// 单个场景的转码失败只跳过该场景，已生成的部分文件保留在磁盘上。
    /// 没有任何场景成功且任务目录为空时删除该目录，否则目录保留。
    pub async fn analyze(&self, input: &Path, threshold: f64) -> MediaResult<AnalyzeResponse> {
        let total_start = Instant::now();
        info!(
            "🎬 [场景分析] 开始分析: input={}, threshold={}",
            input.display(),
            threshold
        );

        let job = self.workspace.allocate()?;
        info!("📁 [场景分析] 输出目录: {}", job.base_dir().display());

        // 1. 检测场景切换时间点
        let detect_start = Instant::now();
        let timestamps = self.detect_scene_changes(input, threshold).await;
        info!(
            "✅ [场景分析] 时间点检测完成，耗时: {:.2}秒，时间点: {:?}",
            detect_start.elapsed().as_secs_f64(),
            timestamps
        );

        // 2. 构建场景区间
        let total_duration = self.total_duration(input).await;
        let segments = build_segments(&timestamps, total_duration);
        info!("  • 场景区间数: {} 个", segments.len());

        // 3. 逐个场景生成片段和缩略图
        let render_start = Instant::now();
        let mut scenes = Vec::new();
        let mut scene_index = 0usize;

        for segment in &segments {
            if segment.duration() < MIN_SCENE_DURATION {
                debug!(
                    "[场景分析] 跳过过短区间: {:.2}s ({} ~ {})",
                    segment.duration(),
                    segment.start,
                    segment.end
                );
                continue;
            }

            scene_index += 1;
            match self.render_scene(&job, input, segment, scene_index).await {
                Ok(scene) => scenes.push(scene),
                Err(e) => {
                    error!("❌ [场景分析] 场景处理失败 (Index: {}): {}", scene_index, e);
                }
            }
        }

        info!(
            "✅ [场景分析] 片段生成完成，耗时: {:.2}秒",
            render_start.elapsed().as_secs_f64()
        );

        if scenes.is_empty() && dir_is_empty(job.base_dir()) {
            warn!("⚠️  [场景分析] 没有生成任何场景，清理空输出目录");
            job.discard();
        }

        let total = total_start.elapsed();
        info!(
            "🎉 [场景分析] 分析完成: Total Scenes={} (总耗时: {}ms, 约 {:.1}秒)",
            scenes.len(),
            total.as_millis(),
            total.as_secs_f64()
        );

        Ok(AnalyzeResponse::new(scenes))
    }

    /// 检测场景切换时间点（第一个元素总是 0.0）
    ///
    /// 除起点外没有检测到切换且阈值大于 0.1 时，以 `max(0.05, threshold / 2)` 重试一次。
    async fn detect_scene_changes(&self, input: &Path, threshold: f64) -> Vec<f64> {
        let timestamps = self.collect_timestamps(input, threshold).await;

        if timestamps.len() <= 1 && threshold > RETRY_THRESHOLD_GUARD {
            let retry_threshold = RETRY_THRESHOLD_FLOOR.max(threshold * 0.5);
            warn!(
                "⚠️  [场景分析] 未检测到场景切换 (Threshold={})，以 {} 重试",
                threshold, retry_threshold
            );
            let retried = self.collect_timestamps(input, retry_threshold).await;
            if retried.len() > 1 {
                return retried;
            }
        }

        if timestamps.len() <= 1 {
            warn!("⚠️  [场景分析] 最终未检测到场景切换，整个视频作为单个场景处理");
        }

        timestamps
    }

    async fn collect_timestamps(&self, input: &Path, threshold: f64) -> Vec<f64> {
        let mut timestamps = vec![0.0];
        let mut stream = self.prober.scene_timestamps(input, threshold).await;
        while let Some(t) = stream.next().await {
            timestamps.push(t);
        }
        timestamps
    }

    /// 读取视频总时长，失败时返回 0.0（最后一个场景使用默认长度）
    async fn total_duration(&self, input: &Path) -> f64 {
        match self.prober.duration(input).await {
            Ok(duration) => duration,
            Err(e) => {
                warn!("⚠️  [场景分析] 读取视频时长失败: {}", e);
                0.0
            }
        }
    }

    /// 生成单个场景的片段和缩略图；失败时已生成的文件保留在磁盘上
    async fn render_scene(
        &self,
        job: &JobWorkspace,
        input: &Path,
        segment: &SceneSegment,
        scene_index: usize,
    ) -> MediaResult<SceneResult> {
        let clip_path = job.resolve(&format!("scene_{:03}.mp4", scene_index));
        let thumb_path = job.resolve(&format!("thumb_{:03}.jpg", scene_index));

        self.transcoder
            .cut_clip(input, segment.start, segment.duration(), &clip_path)
            .await?;
        self.transcoder
            .extract_frame(input, segment.midpoint(), &thumb_path)
            .await?;

        Ok(SceneResult {
            start_time: segment.start,
            end_time: segment.end,
            clip_path: clip_path.to_string_lossy().to_string(),
            thumbnail_path: thumb_path.to_string_lossy().to_string(),
        })
    }
}

fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}
