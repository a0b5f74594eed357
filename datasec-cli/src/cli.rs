use crate::project_info::{metadata, version_info};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// 备份任务相关命令
#[derive(Subcommand, Debug)]
pub enum BackupCommand {
    /// 立即触发一次备份（已有任务在执行时返回该任务）
    Run {
        /// 执行全量备份（额外导出镜像、容器与网络配置）
        #[arg(long)]
        full: bool,
        /// 等待任务结束并输出最终状态
        #[arg(long)]
        wait: bool,
    },
    /// 列出最近的备份任务
    Jobs {
        /// 最多显示的任务数
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// 查看单个备份任务
    Job {
        /// 任务 ID
        id: i64,
    },
}

/// 备份设置相关命令
#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// 显示当前备份设置
    Show,
    /// 修改备份设置（文本字段传入空字符串表示清空）
    Set(SettingsArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct SettingsArgs {
    /// 是否启用定时备份
    #[arg(long)]
    pub enabled: Option<bool>,
    /// 旧版固定间隔（分钟），未配置增量 cron 时使用
    #[arg(long)]
    pub interval_minutes: Option<i64>,
    /// 增量备份 cron 表达式，例如 "0 2 * * *"
    #[arg(long)]
    pub incremental_schedule: Option<String>,
    /// 全量备份 cron 表达式
    #[arg(long)]
    pub full_backup_schedule: Option<String>,
    /// 目标模式：share / local
    #[arg(long)]
    pub target_mode: Option<String>,
    #[arg(long)]
    pub target_ip: Option<String>,
    #[arg(long)]
    pub target_share_name: Option<String>,
    #[arg(long)]
    pub target_subdir: Option<String>,
    #[arg(long)]
    pub target_local_dir: Option<String>,
    /// 伴随平台的 docker-compose.yml 路径
    #[arg(long)]
    pub compose_path: Option<String>,
    /// 显式指定 compose 项目名
    #[arg(long)]
    pub compose_project_name: Option<String>,
    /// 导出数据卷期间是否停止伴随平台服务
    #[arg(long)]
    pub stop_services: Option<bool>,
    /// 业务 SQLite 数据库路径
    #[arg(long)]
    pub app_db_path: Option<String>,
    #[arg(long)]
    pub upload_after_backup: Option<bool>,
    #[arg(long)]
    pub upload_host: Option<String>,
    #[arg(long)]
    pub upload_username: Option<String>,
    #[arg(long)]
    pub upload_target_path: Option<String>,
    #[arg(long)]
    pub full_backup_enabled: Option<bool>,
    #[arg(long)]
    pub full_backup_include_images: Option<bool>,
}

/// DataSec CLI - 业务数据库与伴随平台的定时备份工具
#[derive(Parser)]
#[command(name = "datasec")]
#[command(about = metadata::PROJECT_DESCRIPTION)]
#[command(version = version_info::CLI_VERSION)]
#[command(long_about = metadata::display::DESCRIPTION_LONG)]
#[command(author = metadata::PROJECT_AUTHORS)]
pub struct Cli {
    /// 配置文件路径（默认按 config.toml -> datasec.toml -> .datasec.toml 查找）
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// 详细输出
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 首次使用时初始化：创建配置文件和数据库
    Init {
        /// 如果配置文件已存在，强制覆盖
        #[arg(long)]
        force: bool,
    },
    /// 启动定时备份调度，Ctrl-C 退出
    Serve,
    /// 备份任务
    #[command(subcommand)]
    Backup(BackupCommand),
    /// 备份设置
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// 计算 cron 表达式在指定时刻（默认现在）之前最近一次触发时间
    Cron {
        /// cron 表达式，例如 "0 2 * * *"
        expression: String,
        /// 本地时间，格式 "YYYY-MM-DD HH:MM:SS"
        #[arg(long)]
        at: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_backup_run_flags() {
        let cli = Cli::try_parse_from(["datasec", "-v", "backup", "run", "--full", "--wait"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Backup(BackupCommand::Run {
                full: true,
                wait: true
            })
        ));
    }

    #[test]
    fn test_parse_settings_set() {
        let cli = Cli::try_parse_from([
            "datasec",
            "settings",
            "set",
            "--enabled",
            "true",
            "--incremental-schedule",
            "0 2 * * *",
            "--target-subdir",
            "",
        ])
        .unwrap();
        let Commands::Settings(SettingsCommand::Set(args)) = cli.command else {
            panic!("应解析为 settings set");
        };
        assert_eq!(args.enabled, Some(true));
        assert_eq!(args.incremental_schedule.as_deref(), Some("0 2 * * *"));
        assert_eq!(args.target_subdir.as_deref(), Some(""));
        assert!(args.compose_path.is_none());
    }

    #[test]
    fn test_jobs_limit_default() {
        let cli = Cli::try_parse_from(["datasec", "backup", "jobs"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Backup(BackupCommand::Jobs { limit: 20 })
        ));
    }
}
