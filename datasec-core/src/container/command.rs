use crate::{DataSecError, Result};
use std::process::{Command, Stdio};
use tracing::debug;

/// 外部命令的执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    /// stdout 与 stderr 合并后的文本
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// 外部命令执行接缝，执行器只通过它驱动 docker / compose / scp
pub trait ProcessRunner: Send + Sync {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput>;
}

/// 基于 `std::process::Command` 的真实实现
#[derive(Debug, Clone, Default)]
pub struct SystemProcessRunner;

impl SystemProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String]) -> Result<ProcessOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| DataSecError::custom("命令参数为空"))?;

        let program = which::which(program)
            .map_err(|_| DataSecError::docker(format!("{program} 未安装或不在 PATH 中")))?;

        debug!(command = %argv.join(" "), "执行外部命令");
        let output = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        Ok(ProcessOutput {
            // 被信号终止时没有退出码
            exit_code: output.status.code().unwrap_or(-1),
            output: text,
        })
    }
}

/// 把 `&str` 参数列表转换为 argv
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(|s| s.as_ref().to_string()).collect()
}
