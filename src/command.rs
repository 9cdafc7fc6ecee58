//! 外部进程执行：启动子进程、逐行读取输出、等待退出并收集退出码。

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult};

/// 子进程运行完成后的输出
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// 退出码（被信号终止时为 None）
    pub exit_code: Option<i32>,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// 子进程执行器，绑定一个可执行文件路径
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    program: PathBuf,
    /// 单个子进程的超时时间（秒），None 表示不限制
    timeout_secs: Option<u64>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout_secs: None,
        }
    }

    /// 设置超时，超时后子进程会被终止
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    fn command(&self, args: &[String]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// 运行子进程直到退出，收集 stdout / stderr
    pub async fn output(&self, args: &[String]) -> MediaResult<CommandOutput> {
        debug!("执行命令: {} {}", self.program.display(), args.join(" "));

        let mut cmd = self.command(args);
        let future = cmd.output();
        let output = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), future).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("⚠️  [进程] {} 超过 {} 秒未结束，已终止", self.program.display(), secs);
                    return Err(MediaError::Timeout(secs));
                }
            },
            None => future.await?,
        };

        Ok(CommandOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// 启动子进程并逐行读取输出（stderr 合并到同一行序列中）
    ///
    /// `buffer` 为通道容量：消费方读取慢时读取任务会被挂起，子进程输出不会被一次性读入内存。
    pub fn spawn_lines(&self, args: &[String], buffer: usize) -> MediaResult<ChildLines> {
        debug!("启动命令: {} {}", self.program.display(), args.join(" "));

        let mut child = self.command(args).spawn()?;
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let timeout_secs = self.timeout_secs;
        let program = self.program.display().to_string();

        let exit = tokio::spawn(async move {
            let drain = drain_child(&mut child, tx);
            match timeout_secs {
                Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), drain).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("⚠️  [进程] {} 超过 {} 秒未结束，已终止", program, secs);
                        let _ = child.kill().await;
                        Err(MediaError::Timeout(secs))
                    }
                },
                None => drain.await,
            }
        });

        Ok(ChildLines { lines: rx, exit })
    }
}

/// 读取子进程的 stdout 与 stderr，直到两者都关闭，然后等待退出
async fn drain_child(child: &mut Child, tx: mpsc::Sender<String>) -> MediaResult<ExitStatus> {
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("子进程 stdout 未被捕获"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("子进程 stderr 未被捕获"))?;

    let mut out_lines = BufReader::new(stdout).lines();
    let mut err_lines = BufReader::new(stderr).lines();
    let mut out_done = false;
    let mut err_done = false;

    while !(out_done && err_done) {
        let line = tokio::select! {
            line = out_lines.next_line(), if !out_done => match line {
                Ok(Some(line)) => Some(line),
                Ok(None) => { out_done = true; None }
                Err(e) => {
                    warn!("⚠️  [进程] 读取 stdout 失败: {}", e);
                    out_done = true;
                    None
                }
            },
            line = err_lines.next_line(), if !err_done => match line {
                Ok(Some(line)) => Some(line),
                Ok(None) => { err_done = true; None }
                Err(e) => {
                    warn!("⚠️  [进程] 读取 stderr 失败: {}", e);
                    err_done = true;
                    None
                }
            },
        };

        if let Some(line) = line {
            if tx.send(line).await.is_err() {
                // 消费方已放弃读取
                let _ = child.kill().await;
                break;
            }
        }
    }

    Ok(child.wait().await?)
}

/// 正在运行的子进程的输出行序列（单次遍历）
#[derive(Debug)]
pub struct ChildLines {
    lines: mpsc::Receiver<String>,
    exit: JoinHandle<MediaResult<ExitStatus>>,
}

impl ChildLines {
    /// 读取下一行，子进程输出结束时返回 None
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }

    /// 等待子进程退出；未读取完的输出会被丢弃
    pub async fn wait(self) -> MediaResult<ExitStatus> {
        drop(self.lines);
        self.exit.await.map_err(std::io::Error::other)?
    }
}
