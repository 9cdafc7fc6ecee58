use std::path::PathBuf;
use thiserror::Error;

/// 媒体处理结果类型
pub type MediaResult<T> = Result<T, MediaError>;

/// 媒体处理过程中可能出现的错误
#[derive(Debug, Error)]
pub enum MediaError {
    /// 可执行文件或工作目录不可用（启动阶段致命错误）
    #[error("配置错误: {0}")]
    Config(String),

    /// 工作目录创建、文件读写失败
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// ffprobe 退出码非零或输出无法解析
    #[error("ffprobe 执行失败: {message}")]
    ProbeFailed {
        message: String,
        exit_code: Option<i32>,
    },

    /// ffmpeg 退出码非零
    #[error("ffmpeg 执行失败: {message}")]
    TranscodeFailed {
        message: String,
        exit_code: Option<i32>,
    },

    /// 请求参数不合法
    #[error("参数错误: {0}")]
    Validation(String),

    #[error("文件不存在: {}", .0.display())]
    NotFound(PathBuf),

    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),

    /// 子进程超时（已被终止）
    #[error("子进程执行超时: {0} 秒")]
    Timeout(u64),
}

impl MediaError {
    pub fn probe_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::ProbeFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn transcode_failed(message: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self::TranscodeFailed {
            message: message.into(),
            exit_code,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
