use thiserror::Error;

pub type Result<T> = std::result::Result<T, DataSecError>;

#[derive(Error, Debug)]
pub enum DataSecError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("备份任务不存在: {0}")]
    JobNotFound(i64),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML 解析错误: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("配置文件解析错误: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("任务执行错误: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("目录遍历错误: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("Docker 命令执行失败: {0}")]
    Docker(String),

    #[error("备份操作失败: {0}")]
    Backup(String),

    #[error("上传失败: {0}")]
    Upload(String),

    #[error("自定义错误: {0}")]
    Custom(String),
}

// rusqlite 的错误类型不便直接暴露给调用方，统一转为字符串
impl From<rusqlite::Error> for DataSecError {
    fn from(err: rusqlite::Error) -> Self {
        DataSecError::Database(err.to_string())
    }
}

impl DataSecError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub fn docker(msg: impl Into<String>) -> Self {
        Self::Docker(msg.into())
    }

    pub fn backup(msg: impl Into<String>) -> Self {
        Self::Backup(msg.into())
    }

    pub fn upload(msg: impl Into<String>) -> Self {
        Self::Upload(msg.into())
    }

    /// 是否为配置类错误（在任何阶段执行前就应失败）
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
