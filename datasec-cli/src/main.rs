use clap::Parser;
use datasec_cli::{Cli, CliApp, Commands, run_init, setup_logging};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 写文件时 guard 需要存活到 main 返回，不能用 process::exit 提前退出
    let _log_guard = setup_logging(cli.verbose);

    // `init` 不需要预先加载配置
    if let Commands::Init { force } = cli.command {
        if let Err(e) = run_init(cli.config.as_deref(), force) {
            error!("❌ 初始化失败: {}", e);
            return ExitCode::FAILURE;
        }
        return ExitCode::SUCCESS;
    }

    let app = match CliApp::new(cli.config.as_deref()) {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 应用初始化失败: {}", e);
            if let Some(path) = cli.config.as_deref().filter(|p| !p.exists()) {
                error!("👉 配置文件 '{}' 不存在，请先运行 'datasec init'", path.display());
            }
            return ExitCode::FAILURE;
        }
    };

    match app.run_command(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("❌ 操作失败: {}", e);
            ExitCode::FAILURE
        }
    }
}
