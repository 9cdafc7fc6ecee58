use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use scene_parse::{
    build_router, config::ConfigLoader, AppState, ConfigOverrides, ServiceConfig,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// 场景分析服务 - 检测视频场景切换，按场景切分片段并生成缩略图
#[derive(Parser, Debug)]
#[command(name = "scene-parse")]
#[command(about = "场景分析工具：检测场景切换、切分片段、生成缩略图", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// CLI 模式：分析本地视频文件，结果以 JSON 输出到标准输出
    Analyze {
        /// 输入视频文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 场景变化检测阈值 (0.0-1.0)
        /// 可通过环境变量 SCENE_PARSE_THRESHOLD 或配置文件设置
        #[arg(long)]
        threshold: Option<f64>,

        /// 输出根目录，可通过环境变量 SCENE_PARSE_WORK_DIR 或配置文件设置
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// 配置文件路径（可选，支持 .ini 格式）
        /// 优先级：命令行参数 > 环境变量 > 配置文件 > 默认值
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Web 服务模式：启动 HTTP 服务器
    Serve {
        /// 监听地址（默认从环境变量 PORT 读取，如果不存在则使用 0.0.0.0:8080）
        #[arg(short, long)]
        bind: Option<String>,

        /// 配置文件路径（可选，支持 .ini 格式）
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// 生成默认配置文件
    InitConfig {
        /// 配置文件输出路径
        #[arg(default_value = "scene-parse.ini")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Analyze {
            input,
            threshold,
            work_dir,
            config: config_file,
        } => {
            let overrides = ConfigOverrides {
                work_dir,
                threshold,
                ..Default::default()
            };
            let config = load_service_config(config_file.as_deref(), overrides)?;
            if !input.is_file() {
                anyhow::bail!("输入文件不存在: {}", input.display());
            }

            let state = AppState::from_config(&config).context("初始化服务失败")?;
            let response = state
                .analyzer
                .analyze(&input, config.default_threshold)
                .await
                .context("场景分析失败")?;

            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Serve {
            bind,
            config: config_file,
        } => {
            let config = load_service_config(config_file.as_deref(), ConfigOverrides::default())?;

            // 优先使用命令行参数，其次使用环境变量 PORT，最后使用默认值 8080
            let bind_addr = bind.unwrap_or_else(|| {
                std::env::var("PORT")
                    .map(|port| format!("0.0.0.0:{}", port))
                    .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            });
            start_web_server(&bind_addr, &config).await?;
        }
        Commands::InitConfig { path } => {
            ConfigLoader::create_default_config(&path)?;
            println!("已生成默认配置文件: {}", path.display());
        }
    }

    Ok(())
}

/// 加载配置、初始化日志并校验 ffmpeg / ffprobe / 工作目录
fn load_service_config(
    config_file: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<ServiceConfig> {
    let config = ConfigLoader::load_config(config_file, overrides).context("加载配置失败")?;

    // RUST_LOG 优先，其次使用配置中的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(
        "使用配置: work_dir={}, threshold={:.2}",
        config.work_dir.display(),
        config.default_threshold
    );

    let config = config.validate().context("配置校验失败")?;
    Ok(config)
}

async fn start_web_server(bind: &str, config: &ServiceConfig) -> Result<()> {
    let state = AppState::from_config(config).context("初始化服务失败")?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .context(format!("绑定地址失败: {}", bind))?;

    tracing::info!("Web 服务器启动在: http://{}", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    tracing::info!("可用端点:");
    tracing::info!("  • 健康检查: GET  http://{}/health", bind);
    tracing::info!("  • 场景分析: POST http://{}/media/scenes", bind);
    tracing::info!("  • 文件上传: POST http://{}/media/upload", bind);
    tracing::info!("  • 元数据查询: GET  http://{}/media/metadata?path=<path>", bind);
    tracing::info!("  • 音频提取: POST http://{}/media/audio", bind);
    tracing::info!("  • 批量截图: POST http://{}/media/frames", bind);
    tracing::info!("  • 片段截取: POST http://{}/media/clip", bind);
    tracing::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    axum::serve(listener, app)
        .await
        .context("启动服务器失败")?;

    Ok(())
}
