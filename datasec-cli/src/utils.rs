use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

/// 日志文件环境变量
pub const LOG_FILE_ENV: &str = "DATASEC_LOG_FILE";

const DEFAULT_LOG_FILE_NAME: &str = "datasec.log";

/// # DataSec 日志
///
/// - 库代码（datasec-core）只使用 `tracing` 宏，日志配置只在这里完成
/// - `-v, --verbose` 把默认级别提升到 DEBUG；`RUST_LOG` 优先于默认级别
/// - 设置 `DATASEC_LOG_FILE` 后日志写入该文件（非阻塞写入），否则输出到终端
///
/// ```bash
/// datasec -v backup run --wait
/// DATASEC_LOG_FILE=/var/log/datasec.log datasec serve
/// RUST_LOG=datasec_core::executor=debug datasec serve
/// ```
///
/// 写文件时返回的 guard 必须保持到进程退出，否则缓冲中的日志会丢失。
pub fn setup_logging(verbose: bool) -> Option<WorkerGuard> {
    use tracing_subscriber::{EnvFilter, fmt};

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match std::env::var(LOG_FILE_ENV) {
        Ok(log_file) if !log_file.trim().is_empty() => {
            let path = Path::new(log_file.trim());
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|name| name.to_os_string())
                .unwrap_or_else(|| DEFAULT_LOG_FILE_NAME.into());

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);

            // 文件输出使用详细格式便于排查
            fmt()
                .with_env_filter(env_filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_names(true)
                .with_line_number(true)
                .init();
            Some(guard)
        }
        _ => {
            // 终端输出使用简洁格式
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_thread_names(false)
                .with_line_number(false)
                .compact()
                .init();
            None
        }
    }
}

/// 毫秒时间戳格式化为本地时间
pub fn format_ms(ts_ms: i64) -> String {
    use chrono::{Local, TimeZone};

    match Local.timestamp_millis_opt(ts_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => ts_ms.to_string(),
    }
}
