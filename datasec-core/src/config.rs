use crate::constants::{config, database, docker, scheduler, upload};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 应用配置结构
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// 数据库相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Docker相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DockerConfig {
    pub binary: String,
    pub helper_image: String,
}

/// 调度相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub poll_interval_secs: u64,
    pub stale_job_hours: u64,
}

/// 上传相关配置
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub binary: String,
}

fn default_busy_timeout_ms() -> u64 {
    database::DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: database::get_database_path().to_string_lossy().to_string(),
            busy_timeout_ms: database::DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: docker::DEFAULT_BINARY.to_string(),
            helper_image: docker::DEFAULT_HELPER_IMAGE.to_string(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: scheduler::DEFAULT_POLL_INTERVAL_SECS,
            stale_job_hours: scheduler::DEFAULT_STALE_JOB_HOURS,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            binary: upload::DEFAULT_BINARY.to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            docker: DockerConfig::default(),
            scheduler: SchedulerConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// 智能查找并加载配置文件
    /// 按优先级查找：config.toml -> datasec.toml -> .datasec.toml
    pub fn find_and_load_config() -> Result<Self> {
        for config_file in &config::CONFIG_SEARCH_NAMES {
            if Path::new(config_file).exists() {
                tracing::info!("找到配置文件: {}", config_file);
                return Self::load_from_file(config_file);
            }
        }

        // 如果没找到配置文件，创建默认配置
        tracing::warn!("未找到配置文件，创建默认配置: {}", config::CONFIG_FILE_NAME);
        let default_config = Self::default();
        default_config.save_to_file(config::CONFIG_FILE_NAME)?;
        Ok(default_config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content)?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&path, self.to_toml_with_comments())?;
        Ok(())
    }

    /// 生成带注释的TOML配置
    fn to_toml_with_comments(&self) -> String {
        const TEMPLATE: &str = include_str!("../templates/config.toml.template");

        TEMPLATE
            .replace("{database_path}", &toml_escape(&self.database.path))
            .replace(
                "{busy_timeout_ms}",
                &self.database.busy_timeout_ms.to_string(),
            )
            .replace("{docker_binary}", &toml_escape(&self.docker.binary))
            .replace("{helper_image}", &toml_escape(&self.docker.helper_image))
            .replace(
                "{poll_interval_secs}",
                &self.scheduler.poll_interval_secs.to_string(),
            )
            .replace(
                "{stale_job_hours}",
                &self.scheduler.stale_job_hours.to_string(),
            )
            .replace("{upload_binary}", &toml_escape(&self.upload.binary))
    }

    /// 获取数据库路径
    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.database.path)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.database.busy_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs.max(1))
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.scheduler.stale_job_hours * 3600)
    }
}

// Windows 路径中的反斜杠在 TOML 基础字符串里需要转义
fn toml_escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
