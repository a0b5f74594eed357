// 模块声明
mod command;
pub mod compose;
mod engine;

#[cfg(test)]
pub(crate) mod testing;

// 重新导出公共API
pub use command::{ProcessOutput, ProcessRunner, SystemProcessRunner, argv};
pub use compose::{resolve_project_name, volume_prefix};
pub use engine::DockerEngine;
