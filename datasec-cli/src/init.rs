use datasec_core::{
    Result,
    config::AppConfig,
    constants::{config, cron::DEFAULT_BACKUP_CRON},
    db::{Database, SettingsStore},
};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 运行独立的初始化流程
pub fn run_init(config_path: Option<&Path>, force: bool) -> Result<()> {
    info!("🛡️  DataSec 初始化");
    info!("==================");

    let config_path: PathBuf = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(config::get_config_file_path);

    if config_path.exists() && !force {
        warn!("⚠️  配置文件已存在: {}", config_path.display());
        info!("如果要重新初始化，请使用 --force 参数");
        info!("示例: datasec init --force");
        return Ok(());
    }

    info!("📋 步骤 1: 创建配置文件");
    let app_config = AppConfig::default();
    app_config.save_to_file(&config_path)?;
    info!("   ✅ 配置文件: {}", config_path.display());

    info!("📋 步骤 2: 初始化数据库");
    let db_path = app_config.database_path();
    let database = Database::open(&db_path, app_config.busy_timeout())?;
    let settings = SettingsStore::new(database).get_settings()?;
    info!("   ✅ 数据库: {}", db_path.display());
    info!(
        "   ✅ 备份设置已就绪（定时备份{}）",
        if settings.enabled { "已启用" } else { "未启用" }
    );

    info!("🎉 初始化完成！");
    info!("");
    info!("📝 接下来的步骤:");
    info!("   1️⃣  datasec settings set --compose-path /path/to/docker-compose.yml");
    info!("   2️⃣  datasec settings set --target-mode local --target-local-dir /backups");
    info!(
        "   3️⃣  datasec settings set --incremental-schedule \"{}\" --enabled true",
        DEFAULT_BACKUP_CRON
    );
    info!("   4️⃣  datasec serve");
    info!("");
    info!("💡 提示: 使用 'datasec backup run --wait' 立即执行一次备份");

    Ok(())
}
