use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::error::MediaResult;

/// 进程内递增序号，与毫秒时间戳组合保证同一进程内的目录名唯一
static JOB_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// 目录名冲突（其他进程占用）时的最大重试次数
const MAX_ALLOCATE_ATTEMPTS: usize = 8;

fn next_token() -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let seq = JOB_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}", millis, seq)
}

/// 工作目录，所有任务输出都位于其下
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 为场景分析任务分配目录：`<root>/scenes_<token>/`
    pub fn allocate(&self) -> MediaResult<JobWorkspace> {
        self.allocate_with_prefix("scenes")
    }

    /// 分配 `<root>/<prefix>_<token>/`，父目录不存在时一并创建
    pub fn allocate_with_prefix(&self, prefix: &str) -> MediaResult<JobWorkspace> {
        let root = std::path::absolute(&self.root)?;
        std::fs::create_dir_all(&root)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let base_dir = root.join(format!("{}_{}", prefix, next_token()));
            match std::fs::create_dir(&base_dir) {
                Ok(()) => {
                    debug!("📁 [工作目录] 已创建: {}", base_dir.display());
                    return Ok(JobWorkspace { base_dir });
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::AlreadyExists
                        && attempt < MAX_ALLOCATE_ATTEMPTS =>
                {
                    debug!("[工作目录] 目录已存在，重新分配: {}", base_dir.display());
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 生成工作目录下唯一的文件路径：`<root>/<prefix>_<token>.<ext>`（不创建文件）
    pub fn unique_file(&self, prefix: &str, ext: &str) -> MediaResult<PathBuf> {
        let root = std::path::absolute(&self.root)?;
        std::fs::create_dir_all(&root)?;
        Ok(root.join(format!("{}_{}.{}", prefix, next_token(), ext)))
    }
}

/// 单个任务独占的输出目录
#[derive(Debug, Clone)]
pub struct JobWorkspace {
    base_dir: PathBuf,
}

impl JobWorkspace {
    /// 绝对路径
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// 拼接任务目录下的文件路径，不做任何 IO
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// 尽力删除整个任务目录，失败只记录日志
    pub fn discard(self) {
        if let Err(e) = std::fs::remove_dir_all(&self.base_dir) {
            warn!("⚠️  [工作目录] 清理失败: {} - {}", self.base_dir.display(), e);
        }
    }
}
