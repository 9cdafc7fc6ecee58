// 集成测试共用的假 ffprobe / ffmpeg 实现
#![allow(dead_code)]

use async_trait::async_trait;
use scene_parse::metadata::{FormatInfo, MediaMetadataResponse, StreamInfo};
use scene_parse::{MediaError, MediaResult, Prober, TimestampStream, Transcoder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 按阈值返回预设的时间点
#[derive(Default)]
pub struct MockProber {
    timestamps: HashMap<String, Vec<f64>>,
    duration: Option<f64>,
    pub scene_calls: Mutex<Vec<f64>>,
}

fn threshold_key(threshold: f64) -> String {
    format!("{:.4}", threshold)
}

impl MockProber {
    /// duration 为 None 时时长探测失败
    pub fn new(duration: Option<f64>) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    pub fn with_timestamps(mut self, threshold: f64, timestamps: &[f64]) -> Self {
        self.timestamps
            .insert(threshold_key(threshold), timestamps.to_vec());
        self
    }

    pub fn scene_calls(&self) -> Vec<f64> {
        self.scene_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prober for MockProber {
    async fn duration(&self, _path: &Path) -> MediaResult<f64> {
        self.duration
            .ok_or_else(|| MediaError::probe_failed("mock duration failure", Some(1)))
    }

    async fn scene_timestamps(&self, _path: &Path, threshold: f64) -> TimestampStream {
        self.scene_calls.lock().unwrap().push(threshold);
        let values = self
            .timestamps
            .get(&threshold_key(threshold))
            .cloned()
            .unwrap_or_default();
        Box::pin(tokio_stream::iter(values))
    }

    async fn metadata(&self, path: &Path) -> MediaResult<MediaMetadataResponse> {
        Ok(MediaMetadataResponse {
            filename: path.to_string_lossy().to_string(),
            duration: self.duration.unwrap_or_default(),
            size: 1024,
            bit_rate: 800_000,
            format: FormatInfo {
                name: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
                long_name: "QuickTime / MOV".to_string(),
            },
            streams: vec![StreamInfo {
                codec_name: "h264".to_string(),
                codec_long_name: "H.264 / AVC".to_string(),
                codec_type: "VIDEO".to_string(),
                width: 1280,
                height: 720,
                frame_rate: "N/A".to_string(),
            }],
        })
    }
}

/// 一次转码调用
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeCall {
    Clip {
        start: f64,
        duration: f64,
        output: PathBuf,
    },
    Frame {
        at: f64,
        output: PathBuf,
    },
    Audio {
        output: PathBuf,
    },
    Frames {
        fps: f64,
        output_dir: PathBuf,
    },
}

/// 把输出写成真实文件的假 ffmpeg；`fail_clip_at` 指定第几次截取片段（从 1 开始）失败
#[derive(Default)]
pub struct MockTranscoder {
    fail_clip_at: Option<usize>,
    fail_frames: bool,
    fail_all: bool,
    pub calls: Mutex<Vec<TranscodeCall>>,
}

impl MockTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_clip(n: usize) -> Self {
        Self {
            fail_clip_at: Some(n),
            ..Default::default()
        }
    }

    /// 片段正常生成，截图总是失败
    pub fn failing_frames() -> Self {
        Self {
            fail_frames: true,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<TranscodeCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: TranscodeCall) -> usize {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        calls
            .iter()
            .filter(|c| matches!(c, TranscodeCall::Clip { .. }))
            .count()
    }

    fn check(&self) -> MediaResult<()> {
        if self.fail_all {
            Err(MediaError::transcode_failed("mock failure", Some(1)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn cut_clip(&self, _input: &Path, start: f64, duration: f64, output: &Path) -> MediaResult<()> {
        let clips = self.record(TranscodeCall::Clip {
            start,
            duration,
            output: output.to_path_buf(),
        });
        self.check()?;
        if self.fail_clip_at == Some(clips) {
            return Err(MediaError::transcode_failed("mock clip failure", Some(1)));
        }
        std::fs::write(output, b"clip")?;
        Ok(())
    }

    async fn extract_frame(&self, _input: &Path, at: f64, output: &Path) -> MediaResult<()> {
        self.record(TranscodeCall::Frame {
            at,
            output: output.to_path_buf(),
        });
        self.check()?;
        if self.fail_frames {
            return Err(MediaError::transcode_failed("mock frame failure", Some(1)));
        }
        std::fs::write(output, b"jpeg")?;
        Ok(())
    }

    async fn extract_audio(&self, _input: &Path, output: &Path) -> MediaResult<()> {
        self.record(TranscodeCall::Audio {
            output: output.to_path_buf(),
        });
        self.check()?;
        std::fs::write(output, b"RIFF")?;
        Ok(())
    }

    async fn extract_frames(&self, _input: &Path, fps: f64, output_dir: &Path) -> MediaResult<()> {
        self.record(TranscodeCall::Frames {
            fps,
            output_dir: output_dir.to_path_buf(),
        });
        self.check()?;
        std::fs::write(output_dir.join("frame_0001.jpg"), b"jpeg")?;
        Ok(())
    }
}

/// 在临时目录中创建一个假的输入视频
pub fn fake_video(dir: &Path) -> PathBuf {
    let path = dir.join("input.mp4");
    std::fs::write(&path, b"not really a video").unwrap();
    path
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {expected}, got {actual}"
    );
}
