//! ffmpeg 封装：片段截取、单帧截图、音频提取、按帧率批量截图。

use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::debug;

use crate::command::ProcessRunner;
use crate::error::{MediaError, MediaResult};

/// 转码能力，所有操作都会覆盖已存在的输出文件，并阻塞到子进程退出
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// 截取 `[start, start + duration)` 区间，音视频流直接复制（不重新编码）
    async fn cut_clip(&self, input: &Path, start: f64, duration: f64, output: &Path) -> MediaResult<()>;

    /// 在 `at` 秒处截取一帧图片
    async fn extract_frame(&self, input: &Path, at: f64, output: &Path) -> MediaResult<()>;

    /// 提取音轨为 WAV（PCM s16le, 44100 Hz, 双声道）
    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()>;

    /// 按 `fps` 帧率批量截图到 `output_dir/frame_%04d.jpg`
    async fn extract_frames(&self, input: &Path, fps: f64, output_dir: &Path) -> MediaResult<()>;
}

/// 秒转毫秒，向下取整
pub fn to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).floor() as i64
}

fn millis_arg(seconds: f64) -> String {
    format!("{}ms", to_millis(seconds))
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

pub fn clip_args(input: &Path, start: f64, duration: f64, output: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        millis_arg(start),
        "-i".to_string(),
        path_arg(input),
        "-t".to_string(),
        millis_arg(duration),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-y".to_string(),
        path_arg(output),
    ]
}

pub fn frame_args(input: &Path, at: f64, output: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-ss".to_string(),
        millis_arg(at),
        "-i".to_string(),
        path_arg(input),
        "-frames:v".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "image2".to_string(),
        "-y".to_string(),
        path_arg(output),
    ]
}

fn audio_args(input: &Path, output: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-vn".to_string(),
        "-acodec".to_string(),
        "pcm_s16le".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-y".to_string(),
        path_arg(output),
    ]
}

fn frames_args(input: &Path, fps: f64, output_dir: &Path) -> Vec<String> {
    vec![
        "-v".to_string(),
        "error".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-vf".to_string(),
        format!("fps={}", fps),
        "-y".to_string(),
        path_arg(&output_dir.join("frame_%04d.jpg")),
    ]
}

/// 基于 ffmpeg 可执行文件的实现
#[derive(Debug, Clone)]
pub struct FfmpegClient {
    runner: ProcessRunner,
}

impl FfmpegClient {
    pub fn new(runner: ProcessRunner) -> Self {
        Self { runner }
    }

    async fn run(&self, args: &[String]) -> MediaResult<()> {
        let output = self.runner.output(args).await?;
        if output.success {
            Ok(())
        } else {
            Err(MediaError::transcode_failed(
                last_lines(&output.stderr, 5),
                output.exit_code,
            ))
        }
    }

    /// 运行后确认输出文件确实生成（ffmpeg 在越界截取时可能成功退出但不写文件）
    async fn run_expecting(&self, args: &[String], output: &Path) -> MediaResult<()> {
        self.run(args).await?;
        if tokio::fs::try_exists(output).await? {
            Ok(())
        } else {
            Err(MediaError::transcode_failed(
                format!("输出文件未生成: {}", output.display()),
                Some(0),
            ))
        }
    }
}

/// 取 stderr 的最后几行作为错误信息
fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        return "ffmpeg 退出码非零".to_string();
    }
    lines[lines.len().saturating_sub(n)..].join("\n")
}

#[async_trait]
impl Transcoder for FfmpegClient {
    async fn cut_clip(&self, input: &Path, start: f64, duration: f64, output: &Path) -> MediaResult<()> {
        let started = Instant::now();
        self.run_expecting(&clip_args(input, start, duration, output), output)
            .await?;
        debug!(
            "🎞️  [ffmpeg] 片段生成完成: {} (耗时: {}ms)",
            output.display(),
            started.elapsed().as_millis()
        );
        Ok(())
    }

    async fn extract_frame(&self, input: &Path, at: f64, output: &Path) -> MediaResult<()> {
        self.run_expecting(&frame_args(input, at, output), output)
            .await
    }

    async fn extract_audio(&self, input: &Path, output: &Path) -> MediaResult<()> {
        self.run_expecting(&audio_args(input, output), output).await
    }

    async fn extract_frames(&self, input: &Path, fps: f64, output_dir: &Path) -> MediaResult<()> {
        self.run(&frames_args(input, fps, output_dir)).await
    }
}
