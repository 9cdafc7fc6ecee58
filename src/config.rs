use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{MediaError, MediaResult};

const DEFAULT_WORK_DIR: &str = "./work";
const DEFAULT_FFMPEG: &str = "ffmpeg";
const DEFAULT_FFPROBE: &str = "ffprobe";
const DEFAULT_THRESHOLD: f64 = 0.3;
const DEFAULT_LOG_LEVEL: &str = "info";

/// 服务配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// 所有任务输出的根目录
    pub work_dir: PathBuf,
    /// ffmpeg 可执行文件路径
    pub ffmpeg_path: PathBuf,
    /// ffprobe 可执行文件路径
    pub ffprobe_path: PathBuf,
    /// 请求未指定阈值时使用的场景检测阈值
    pub default_threshold: f64,
    /// 日志级别（trace, debug, info, warn, error）
    pub log_level: String,
    /// 单个 ffmpeg / ffprobe 子进程的超时时间（秒），None 表示不限制
    pub process_timeout_secs: Option<u64>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG),
            ffprobe_path: PathBuf::from(DEFAULT_FFPROBE),
            default_threshold: DEFAULT_THRESHOLD,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            process_timeout_secs: None,
        }
    }
}

impl ServiceConfig {
    /// 启动前校验：可执行文件可找到、工作目录可用、阈值合法
    ///
    /// 返回的配置中可执行文件与工作目录均为绝对路径。
    pub fn validate(&self) -> MediaResult<ServiceConfig> {
        if !(0.0..=1.0).contains(&self.default_threshold) {
            return Err(MediaError::config(format!(
                "threshold 必须在 0.0-1.0 之间: {}",
                self.default_threshold
            )));
        }

        let ffmpeg_path = resolve_executable(&self.ffmpeg_path, "ffmpeg")?;
        let ffprobe_path = resolve_executable(&self.ffprobe_path, "ffprobe")?;

        std::fs::create_dir_all(&self.work_dir).map_err(|e| {
            MediaError::config(format!(
                "无法创建工作目录 {}: {}",
                self.work_dir.display(),
                e
            ))
        })?;
        let work_dir = self.work_dir.canonicalize().map_err(|e| {
            MediaError::config(format!("工作目录不可用 {}: {}", self.work_dir.display(), e))
        })?;
        if !work_dir.is_dir() {
            return Err(MediaError::config(format!(
                "工作目录不是目录: {}",
                work_dir.display()
            )));
        }

        info!("FFmpeg 初始化: Path={}", ffmpeg_path.display());
        info!("FFprobe 初始化: Path={}", ffprobe_path.display());
        info!("工作目录确认: {}", work_dir.display());

        Ok(ServiceConfig {
            work_dir,
            ffmpeg_path,
            ffprobe_path,
            default_threshold: self.default_threshold,
            log_level: self.log_level.clone(),
            process_timeout_secs: self.process_timeout_secs,
        })
    }
}

fn resolve_executable(path: &Path, name: &str) -> MediaResult<PathBuf> {
    which::which(path).map_err(|e| {
        MediaError::config(format!("找不到 {} 可执行文件 {}: {}", name, path.display(), e))
    })
}

/// 命令行参数提供的覆盖项
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub work_dir: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    pub threshold: Option<f64>,
    pub log_level: Option<String>,
}

/// 单一来源（环境变量或配置文件）读到的配置，未设置的项为 None
#[derive(Debug, Clone, Default)]
struct PartialConfig {
    work_dir: Option<PathBuf>,
    ffmpeg_path: Option<PathBuf>,
    ffprobe_path: Option<PathBuf>,
    threshold: Option<f64>,
    log_level: Option<String>,
    process_timeout_secs: Option<u64>,
}

/// 空字符串视为未设置
fn non_empty(value: String) -> Option<String> {
    let value = value.trim().to_string();
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// 读取并解析环境变量，无法解析时记录警告并视为未设置
fn parse_env<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let value = lookup(key).and_then(non_empty)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("⚠️  [配置] 环境变量 {} 的值无效，已忽略: {}", key, value);
            None
        }
    }
}

/// 配置加载器
pub struct ConfigLoader;

impl ConfigLoader {
    /// 从多个源加载配置，优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
    pub fn load_config(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<ServiceConfig> {
        Self::load_config_with_env(config_file, overrides, |key| env::var(key).ok())
    }

    pub(crate) fn load_config_with_env(
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<ServiceConfig> {
        // 1. 配置文件：显式指定的文件必须可读，默认位置找不到则忽略
        let file_config = match config_file {
            Some(path) => Self::load_from_file(path)?,
            None => Self::load_from_default_locations().unwrap_or_default(),
        };

        // 2. 环境变量
        let env_config = Self::load_from_env(lookup);

        // 3. 合并
        let config = ServiceConfig {
            work_dir: overrides
                .work_dir
                .or(env_config.work_dir)
                .or(file_config.work_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_WORK_DIR)),
            ffmpeg_path: overrides
                .ffmpeg_path
                .or(env_config.ffmpeg_path)
                .or(file_config.ffmpeg_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG)),
            ffprobe_path: overrides
                .ffprobe_path
                .or(env_config.ffprobe_path)
                .or(file_config.ffprobe_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FFPROBE)),
            default_threshold: overrides
                .threshold
                .or(env_config.threshold)
                .or(file_config.threshold)
                .unwrap_or(DEFAULT_THRESHOLD),
            log_level: overrides
                .log_level
                .or(env_config.log_level)
                .or(file_config.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            process_timeout_secs: env_config
                .process_timeout_secs
                .or(file_config.process_timeout_secs)
                .filter(|secs| *secs > 0),
        };

        Ok(config)
    }

    fn load_from_env(lookup: impl Fn(&str) -> Option<String>) -> PartialConfig {
        PartialConfig {
            work_dir: lookup("SCENE_PARSE_WORK_DIR")
                .and_then(non_empty)
                .map(PathBuf::from),
            ffmpeg_path: lookup("SCENE_PARSE_FFMPEG_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            ffprobe_path: lookup("SCENE_PARSE_FFPROBE_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            threshold: parse_env(&lookup, "SCENE_PARSE_THRESHOLD"),
            log_level: lookup("LOG_LEVEL").and_then(non_empty),
            process_timeout_secs: parse_env(&lookup, "SCENE_PARSE_PROCESS_TIMEOUT"),
        }
    }

    /// 从 INI 配置文件加载，节内找不到的键回退到 [DEFAULT]
    fn load_from_file(config_path: &Path) -> Result<PartialConfig> {
        if !config_path.exists() {
            return Err(anyhow::anyhow!("配置文件不存在: {}", config_path.display()));
        }

        let mut config_parser = configparser::ini::Ini::new();
        config_parser
            .load(config_path)
            .map_err(|e| anyhow::anyhow!("读取配置文件失败: {}: {}", config_path.display(), e))?;

        let get = |section: &str, key: &str| {
            config_parser
                .get(section, key)
                .or_else(|| config_parser.get("DEFAULT", key))
                .and_then(non_empty)
        };

        let threshold = match get("scene", "threshold") {
            Some(v) => Some(
                v.parse::<f64>()
                    .with_context(|| format!("配置项 threshold 不是有效数字: {}", v))?,
            ),
            None => None,
        };

        let process_timeout_secs = match get("ffmpeg", "timeout_secs") {
            Some(v) => Some(
                v.parse::<u64>()
                    .with_context(|| format!("配置项 timeout_secs 不是有效整数: {}", v))?,
            ),
            None => None,
        };

        Ok(PartialConfig {
            work_dir: get("ffmpeg", "work_dir").map(PathBuf::from),
            ffmpeg_path: get("ffmpeg", "ffmpeg_path").map(PathBuf::from),
            ffprobe_path: get("ffmpeg", "ffprobe_path").map(PathBuf::from),
            threshold,
            log_level: get("logging", "level"),
            process_timeout_secs,
        })
    }

    fn load_from_default_locations() -> Result<PartialConfig> {
        let mut candidates = vec![
            PathBuf::from("scene-parse.ini"),
            PathBuf::from(".scene-parse.ini"),
        ];
        if let Some(home) = env::var_os("HOME") {
            candidates.push(PathBuf::from(home).join(".scene-parse.ini"));
        }
        candidates.push(PathBuf::from("/etc/scene-parse.ini"));

        for candidate in candidates {
            if candidate.exists() {
                return Self::load_from_file(&candidate);
            }
        }

        Err(anyhow::anyhow!("未找到配置文件"))
    }

    /// 创建默认配置文件
    pub fn create_default_config(config_path: &Path) -> Result<()> {
        let mut config_parser = configparser::ini::Ini::new();
        config_parser.set("ffmpeg", "work_dir", Some(DEFAULT_WORK_DIR.to_string()));
        config_parser.set("ffmpeg", "ffmpeg_path", Some(DEFAULT_FFMPEG.to_string()));
        config_parser.set("ffmpeg", "ffprobe_path", Some(DEFAULT_FFPROBE.to_string()));
        config_parser.set("scene", "threshold", Some(DEFAULT_THRESHOLD.to_string()));
        config_parser.set("logging", "level", Some(DEFAULT_LOG_LEVEL.to_string()));

        config_parser
            .write(config_path)
            .map_err(|e| anyhow::anyhow!("写入配置文件失败: {}: {}", config_path.display(), e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_ini(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("scene-parse.ini");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_file_values_loaded() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(
            temp.path(),
            "[ffmpeg]\nwork_dir = /data/work\nffmpeg_path = /opt/ffmpeg\n\n[scene]\nthreshold = 0.45\n\n[logging]\nlevel = debug\n",
        );

        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env_of(&[]))
                .unwrap();
        assert_eq!(config.work_dir, PathBuf::from("/data/work"));
        assert_eq!(config.ffmpeg_path, PathBuf::from("/opt/ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(config.default_threshold, 0.45);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_priority_cli_over_env_over_file() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(
            temp.path(),
            "[ffmpeg]\nwork_dir = /from/file\nffprobe_path = /file/ffprobe\n[scene]\nthreshold = 0.1\n",
        );
        let env = env_of(&[
            ("SCENE_PARSE_WORK_DIR", "/from/env"),
            ("SCENE_PARSE_THRESHOLD", "0.2"),
        ]);
        let overrides = ConfigOverrides {
            threshold: Some(0.5),
            ..Default::default()
        };

        let config = ConfigLoader::load_config_with_env(Some(&ini), overrides, env).unwrap();
        assert_eq!(config.default_threshold, 0.5);
        assert_eq!(config.work_dir, PathBuf::from("/from/env"));
        assert_eq!(config.ffprobe_path, PathBuf::from("/file/ffprobe"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(temp.path(), "[ffmpeg]\nffmpeg_path =\n");
        let env = env_of(&[("SCENE_PARSE_FFPROBE_PATH", "  ")]);

        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(config.ffprobe_path, PathBuf::from("ffprobe"));
    }

    #[test]
    fn test_invalid_env_threshold_falls_back_to_file() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(temp.path(), "[scene]\nthreshold = 0.45\n");
        let env = env_of(&[("SCENE_PARSE_THRESHOLD", "high")]);

        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.default_threshold, 0.45);
    }

    #[test]
    fn test_process_timeout_sources() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(temp.path(), "[ffmpeg]\ntimeout_secs = 600\n");

        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env_of(&[]))
                .unwrap();
        assert_eq!(config.process_timeout_secs, Some(600));

        let env = env_of(&[("SCENE_PARSE_PROCESS_TIMEOUT", "30")]);
        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.process_timeout_secs, Some(30));

        // 0 表示不限制
        let env = env_of(&[("SCENE_PARSE_PROCESS_TIMEOUT", "0")]);
        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env).unwrap();
        assert_eq!(config.process_timeout_secs, None);

        let bad = write_ini(temp.path(), "[ffmpeg]\ntimeout_secs = soon\n");
        assert!(ConfigLoader::load_config_with_env(
            Some(&bad),
            ConfigOverrides::default(),
            env_of(&[])
        )
        .is_err());
    }

    #[test]
    fn test_default_section_fallback() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(temp.path(), "[DEFAULT]\nthreshold = 0.6\n");
        let config =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env_of(&[]))
                .unwrap();
        assert_eq!(config.default_threshold, 0.6);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let result = ConfigLoader::load_config_with_env(
            Some(Path::new("/nonexistent/scene-parse.ini")),
            ConfigOverrides::default(),
            env_of(&[]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_threshold_in_file_is_error() {
        let temp = tempfile::tempdir().unwrap();
        let ini = write_ini(temp.path(), "[scene]\nthreshold = high\n");
        let result =
            ConfigLoader::load_config_with_env(Some(&ini), ConfigOverrides::default(), env_of(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn test_create_default_config_round_trip() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("generated.ini");
        ConfigLoader::create_default_config(&path).unwrap();

        let config =
            ConfigLoader::load_config_with_env(Some(&path), ConfigOverrides::default(), env_of(&[]))
                .unwrap();
        assert_eq!(config.default_threshold, DEFAULT_THRESHOLD);
        assert_eq!(config.work_dir, PathBuf::from(DEFAULT_WORK_DIR));
    }

    #[test]
    fn test_validate_rejects_missing_executable() {
        let temp = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            work_dir: temp.path().join("work"),
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MediaError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_threshold_out_of_range() {
        let config = ServiceConfig {
            default_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(MediaError::Config(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_validate_resolves_paths() {
        use crate::test_support::write_script;

        let temp = tempfile::tempdir().unwrap();
        let ffmpeg = write_script(temp.path(), "ffmpeg", "exit 0");
        let ffprobe = write_script(temp.path(), "ffprobe", "exit 0");
        let config = ServiceConfig {
            work_dir: temp.path().join("a").join("work"),
            ffmpeg_path: ffmpeg.clone(),
            ffprobe_path: ffprobe,
            ..Default::default()
        };

        let validated = config.validate().unwrap();
        assert!(validated.work_dir.is_absolute());
        assert!(validated.work_dir.is_dir());
        assert!(validated.ffmpeg_path.is_absolute());
        assert!(validated.ffmpeg_path.ends_with("ffmpeg"));
        assert!(ffmpeg.ends_with("ffmpeg"));
    }
}
