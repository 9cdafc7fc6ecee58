use std::path::{Path, PathBuf};

use crate::error::{MediaError, MediaResult};

/// 上传文件存储，位于 `<workDir>/uploads/`
#[derive(Debug, Clone)]
pub struct FileStorage {
    location: PathBuf,
}

impl FileStorage {
    /// 创建存储目录（已存在则直接使用）
    pub fn new(work_dir: &Path) -> MediaResult<Self> {
        let location = std::path::absolute(work_dir.join("uploads"))?;
        std::fs::create_dir_all(&location)?;
        Ok(Self { location })
    }

    /// 创建目标文件，文件名加 UUID 前缀避免重名；调用方负责写入内容
    pub async fn create(&self, original_name: &str) -> MediaResult<(PathBuf, tokio::fs::File)> {
        let name = clean_file_name(original_name)?;
        let stored_name = format!("{}_{}", uuid::Uuid::new_v4(), name);
        let target = self.location.join(stored_name);

        tokio::fs::create_dir_all(&self.location).await?;
        let file = tokio::fs::File::create(&target).await?;
        Ok((target, file))
    }
}

fn clean_file_name(name: &str) -> MediaResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(MediaError::validation("文件名为空"));
    }
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(MediaError::validation(format!(
            "文件名包含非法字符: {}",
            name
        )));
    }
    Ok(name)
}
