/// DataSec CLI 项目信息
///
/// datasec-cli 是面向运维的入口，项目元数据统一在这里定义；
/// datasec-core 只提供技术性常量

/// 项目元数据（自动从 Cargo.toml 同步）
pub mod metadata {
    pub const PROJECT_NAME: &str = env!("CARGO_PKG_NAME");

    pub const PROJECT_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

    pub const PROJECT_AUTHORS: &str = env!("CARGO_PKG_AUTHORS");

    /// 用户友好的显示名称
    pub mod display {
        pub const FRIENDLY_NAME: &str = "DataSec";

        pub const DESCRIPTION_LONG: &str = "数据安全备份工具：定时对业务 SQLite 数据库和伴随平台（Docker Compose）的数据卷做一致性快照，生成可迁移的备份包，并可选上传到远端主机";
    }
}

/// 版本信息
pub mod version_info {
    pub const CLI_VERSION: &str = env!("CARGO_PKG_VERSION");

    pub const CORE_VERSION: &str = datasec_core::constants::version::version_info::CORE_VERSION;
}

/// 启动时打印的版本行
pub fn version_line() -> String {
    format!(
        "{} {} (core {})",
        metadata::display::FRIENDLY_NAME,
        version_info::CLI_VERSION,
        version_info::CORE_VERSION
    )
}
