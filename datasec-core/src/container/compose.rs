use crate::constants::docker::{COMPOSE_PROJECT_ENV, ENV_FILE_NAME};
use crate::{DataSecError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// 解析 compose 项目名
///
/// 优先级：设置中显式指定 -> compose 文件 `name:` -> 同级 `.env` 中的
/// `COMPOSE_PROJECT_NAME` -> compose 文件所在目录名。结果按 compose 的规则规范化。
pub fn resolve_project_name(compose_file: &Path, explicit: Option<&str>) -> Result<String> {
    if let Some(name) = explicit.map(str::trim).filter(|s| !s.is_empty()) {
        debug!("使用设置中的 compose 项目名: {}", name);
        return normalized(name);
    }

    if let Some(name) = name_from_compose_file(compose_file)? {
        debug!("使用 compose 文件 name 字段: {}", name);
        return normalized(&name);
    }

    let env_file = compose_file
        .parent()
        .map(|dir| dir.join(ENV_FILE_NAME))
        .filter(|p| p.exists());
    if let Some(env_file) = env_file {
        if let Some(name) = name_from_env_file(&env_file)? {
            debug!("使用 .env 中的 {}: {}", COMPOSE_PROJECT_ENV, name);
            return normalized(&name);
        }
    }

    let dir_name = compose_file
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().to_string())
        .ok_or_else(|| {
            DataSecError::config(format!(
                "无法从 compose 路径推断项目名: {}",
                compose_file.display()
            ))
        })?;
    debug!("使用 compose 所在目录名: {}", dir_name);
    normalized(&dir_name)
}

/// 项目卷名前缀
pub fn volume_prefix(project: &str) -> String {
    format!("{project}_")
}

/// compose 的项目名规范：小写，只保留字母数字、下划线和中划线
pub fn normalize_project_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_' || *c == '-')
        .collect()
}

fn normalized(raw: &str) -> Result<String> {
    let name = normalize_project_name(raw);
    if name.is_empty() {
        return Err(DataSecError::config(format!("compose 项目名无效: {raw}")));
    }
    Ok(name)
}

fn name_from_compose_file(compose_file: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(compose_file).map_err(|e| {
        DataSecError::config(format!(
            "读取compose文件失败 {}: {e}",
            compose_file.display()
        ))
    })?;
    let yaml: serde_yaml::Value = serde_yaml::from_str(&content)?;

    Ok(yaml
        .get("name")
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn name_from_env_file(env_file: &Path) -> Result<Option<String>> {
    let content = fs::read_to_string(env_file)?;
    for line in content.lines() {
        let line = line.trim();
        if line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == COMPOSE_PROJECT_ENV {
                let value = value.trim().trim_matches('"').trim_matches('\'').trim();
                if !value.is_empty() {
                    return Ok(Some(value.to_string()));
                }
            }
        }
    }
    Ok(None)
}
