use super::manifest::UploadEntry;
use crate::container::{DockerEngine, argv};
use crate::db::DataSecuritySettings;
use crate::{DataSecError, Result};
use std::path::Path;
use tracing::info;

/// 校验上传配置，三项必须全部提供
pub(super) fn upload_entry(settings: &DataSecuritySettings) -> Result<UploadEntry> {
    let field = |value: &Option<String>, name: &str| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| DataSecError::config(format!("已开启备份后上传，但未配置 {name}")))
    };

    Ok(UploadEntry {
        host: field(&settings.upload_host, "upload_host")?,
        username: field(&settings.upload_username, "upload_username")?,
        target_path: field(&settings.upload_target_path, "upload_target_path")?,
    })
}

/// 通过 scp 把整个迁移包目录复制到远端
pub(super) fn upload_pack(
    engine: &DockerEngine,
    binary: &str,
    pack_dir: &Path,
    entry: &UploadEntry,
) -> Result<()> {
    let destination = format!("{}@{}:{}", entry.username, entry.host, entry.target_path);
    let pack = pack_dir.to_string_lossy();
    let argv = argv([binary, "-r", "-o", "BatchMode=yes", &*pack, destination.as_str()]);

    info!("上传迁移包到 {}", destination);
    let output = engine.runner().run(&argv)?;
    if !output.success() {
        return Err(DataSecError::upload(format!(
            "{binary} 退出码 {}: {}",
            output.exit_code,
            output.output.trim()
        )));
    }
    Ok(())
}
