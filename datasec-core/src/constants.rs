/// Docker相关常量
pub mod docker {
    /// 默认的 docker 可执行文件名
    pub const DEFAULT_BINARY: &str = "docker";

    /// 导出卷时使用的一次性辅助镜像
    pub const DEFAULT_HELPER_IMAGE: &str = "alpine:3.20";

    /// compose 项目名环境变量（读取 compose 文件同级的 .env）
    pub const COMPOSE_PROJECT_ENV: &str = "COMPOSE_PROJECT_NAME";

    /// compose 同级环境变量文件名
    pub const ENV_FILE_NAME: &str = ".env";

    /// 辅助容器内卷的只读挂载点
    pub const HELPER_SOURCE_MOUNT: &str = "/from";

    /// 辅助容器内输出目录的挂载点
    pub const HELPER_TARGET_MOUNT: &str = "/to";

    /// docker 中表示无标签镜像的占位符
    pub const NONE_TAG: &str = "<none>";
}

/// 备份包相关常量
pub mod backup {
    /// 迁移包目录前缀
    pub const PACK_DIR_PREFIX: &str = "migration_pack_";

    /// 迁移包目录时间戳格式
    pub const PACK_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

    /// 业务数据库快照文件名
    pub const APP_DB_FILE_NAME: &str = "app.db";

    /// 增量清单文件名
    pub const MANIFEST_FILE_NAME: &str = "manifest.json";

    /// 全量清单文件名
    pub const FULL_MANIFEST_FILE_NAME: &str = "full_backup_manifest.json";

    /// 伴随平台文件目录
    pub const PLATFORM_DIR_NAME: &str = "platform";

    /// 卷归档目录
    pub const VOLUMES_DIR_NAME: &str = "volumes";

    /// 镜像归档目录
    pub const IMAGES_DIR_NAME: &str = "images";

    /// 卷归档扩展名
    pub const VOLUME_ARCHIVE_EXTENSION: &str = ".tar.gz";

    /// 镜像归档扩展名
    pub const IMAGE_ARCHIVE_EXTENSION: &str = ".tar";

    /// 关闭镜像导出时写入的占位说明文件
    pub const IMAGES_SKIPPED_NOTE: &str = "IMAGES_SKIPPED.txt";

    /// 容器配置导出文件
    pub const CONTAINERS_FILE_NAME: &str = "containers.json";

    /// 网络配置导出文件
    pub const NETWORKS_FILE_NAME: &str = "networks.json";
}

/// 任务进度节点（单调递增）
pub mod progress {
    pub const STARTED: i64 = 5;
    pub const PACK_CREATED: i64 = 10;
    pub const DATABASE_DONE: i64 = 25;
    pub const COMPOSE_RESOLVED: i64 = 30;
    pub const SERVICES_STOPPED: i64 = 35;
    pub const VOLUMES_START: i64 = 40;
    pub const VOLUMES_DONE: i64 = 70;
    pub const SERVICES_RESTARTED: i64 = 75;
    pub const IMAGES_DONE: i64 = 82;
    pub const INSPECT_DONE: i64 = 86;
    pub const MANIFEST_DONE: i64 = 90;
    pub const UPLOAD_DONE: i64 = 98;
    pub const FINISHED: i64 = 100;
}

/// 调度相关常量
pub mod scheduler {
    /// 默认轮询间隔（秒）
    pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

    /// 默认僵死任务判定阈值（小时）
    pub const DEFAULT_STALE_JOB_HOURS: u64 = 24;
}

/// cron 表达式相关常量
pub mod cron {
    /// 标准 cron 表达式字段数（分 时 日 月 周）
    pub const CRON_FIELDS_COUNT: usize = 5;

    /// 示例/默认的每日备份表达式
    pub const DEFAULT_BACKUP_CRON: &str = "0 2 * * *";
}

/// 数据库相关常量
pub mod database {
    use std::path::{Path, PathBuf};

    /// 数据目录名
    pub const DATA_DIR_NAME: &str = "data";

    /// 业务数据库文件名
    pub const DATABASE_FILE_NAME: &str = "auth.db";

    /// 默认 busy_timeout（毫秒）
    pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

    /// 获取默认数据库路径
    pub fn get_database_path() -> PathBuf {
        Path::new(".").join(DATA_DIR_NAME).join(DATABASE_FILE_NAME)
    }
}

/// 上传相关常量
pub mod upload {
    /// 默认的远程拷贝命令
    pub const DEFAULT_BINARY: &str = "scp";
}

/// 配置文件相关常量
pub mod config {
    use std::path::{Path, PathBuf};

    /// 配置文件名
    pub const CONFIG_FILE_NAME: &str = "config.toml";

    /// 按优先级查找的配置文件名
    pub const CONFIG_SEARCH_NAMES: [&str; 3] = ["config.toml", "datasec.toml", ".datasec.toml"];

    /// 获取默认配置文件路径
    pub fn get_config_file_path() -> PathBuf {
        Path::new(".").join(CONFIG_FILE_NAME)
    }
}

/// 版本相关常量
pub mod version {
    pub mod version_info {
        /// 核心库版本
        pub const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

        /// 清单格式版本
        pub const MANIFEST_FORMAT_VERSION: u32 = 1;
    }
}
