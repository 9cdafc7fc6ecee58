/// 时长未知时最后一个场景的默认长度（秒）
pub const UNKNOWN_DURATION_FALLBACK: f64 = 10.0;

/// 结束时间不大于开始时间时补足的长度（秒）
pub const MIN_SEGMENT_BUMP: f64 = 5.0;

/// 场景区间 `[start, end)`，单位秒
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneSegment {
    pub start: f64,
    pub end: f64,
}

impl SceneSegment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// 区间中点，用于截取缩略图
    pub fn midpoint(&self) -> f64 {
        self.start + self.duration() / 2.0
    }
}

/// 将场景切换时间点转换为有序、首尾相接的场景区间
///
/// 时间点先排序去重（非有限值和负值被丢弃），列表为空时补 `0.0`。
/// 每个区间的结束时间是下一个时间点；最后一个区间以视频总时长结束，
/// 总时长未知（不大于开始时间）时取 `start + 10.0`。任何结束时间不大于开始时间的区间
/// 被补足为 `start + 5.0`。
pub fn build_segments(timestamps: &[f64], total_duration: f64) -> Vec<SceneSegment> {
    let mut points: Vec<f64> = timestamps
        .iter()
        .copied()
        .filter(|t| t.is_finite() && *t >= 0.0)
        .collect();
    points.sort_by(|a, b| a.total_cmp(b));
    points.dedup();

    if points.is_empty() {
        points.push(0.0);
    }

    let last = points.len() - 1;
    points
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let mut end = if i < last {
                points[i + 1]
            } else if total_duration > start {
                total_duration
            } else {
                start + UNKNOWN_DURATION_FALLBACK
            };

            if end <= start {
                end = start + MIN_SEGMENT_BUMP;
            }

            SceneSegment { start, end }
        })
        .collect()
}
