use crate::app::CliApp;
use crate::cli::SettingsArgs;
use crate::utils::format_ms;
use datasec_core::Result;
use datasec_core::db::{DataSecuritySettings, SettingsUpdate, TargetMode};
use tracing::info;

/// 显示当前设置
pub fn show_settings(app: &CliApp) -> Result<()> {
    let settings = app.settings.get_settings()?;
    log_summary(&settings);
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// 修改设置并输出更新后的结果
pub fn set_settings(app: &CliApp, args: SettingsArgs) -> Result<()> {
    let update = to_update(args)?;
    let settings = app.settings.update_settings(update)?;
    info!("✅ 备份设置已更新");
    log_summary(&settings);
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// 命令行参数转为设置更新；文本字段原样传入，空字符串由存储层清空
fn to_update(args: SettingsArgs) -> Result<SettingsUpdate> {
    let target_mode = args
        .target_mode
        .as_deref()
        .map(str::parse::<TargetMode>)
        .transpose()?;

    Ok(SettingsUpdate {
        enabled: args.enabled,
        interval_minutes: args.interval_minutes,
        incremental_schedule: args.incremental_schedule.map(Some),
        full_backup_schedule: args.full_backup_schedule.map(Some),
        target_mode,
        target_ip: args.target_ip.map(Some),
        target_share_name: args.target_share_name.map(Some),
        target_subdir: args.target_subdir.map(Some),
        target_local_dir: args.target_local_dir.map(Some),
        compose_path: args.compose_path.map(Some),
        compose_project_name: args.compose_project_name.map(Some),
        stop_services: args.stop_services,
        app_db_path: args.app_db_path.map(Some),
        upload_after_backup: args.upload_after_backup,
        upload_host: args.upload_host.map(Some),
        upload_username: args.upload_username.map(Some),
        upload_target_path: args.upload_target_path.map(Some),
        full_backup_enabled: args.full_backup_enabled,
        full_backup_include_images: args.full_backup_include_images,
    })
}

fn log_summary(settings: &DataSecuritySettings) {
    let describe = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());
    let time = |value: Option<i64>| value.map(format_ms).unwrap_or_else(|| "-".to_string());

    info!("📋 定时备份: {}", if settings.enabled { "启用" } else { "停用" });
    info!("   增量计划: {}", describe(&settings.incremental_schedule));
    info!(
        "   全量计划: {} ({})",
        describe(&settings.full_backup_schedule),
        if settings.full_backup_enabled { "启用" } else { "停用" }
    );
    info!("   目标模式: {}", settings.target_mode.as_str());
    info!("   compose: {}", describe(&settings.compose_path));
    info!("   最近运行: {}", time(settings.last_run_at_ms));
    info!(
        "   最近成功: 增量 {} / 全量 {}",
        time(settings.last_incremental_backup_time_ms),
        time(settings.last_full_backup_time_ms)
    );
}
