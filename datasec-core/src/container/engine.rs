use super::command::{ProcessOutput, ProcessRunner, argv};
use crate::constants::backup::VOLUME_ARCHIVE_EXTENSION;
use crate::constants::docker::{HELPER_SOURCE_MOUNT, HELPER_TARGET_MOUNT, NONE_TAG};
use crate::{DataSecError, Result};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 容器引擎操作集合，所有调用都经过 [`ProcessRunner`]
#[derive(Clone)]
pub struct DockerEngine {
    runner: Arc<dyn ProcessRunner>,
    binary: String,
}

impl fmt::Debug for DockerEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DockerEngine")
            .field("binary", &self.binary)
            .finish()
    }
}

impl DockerEngine {
    pub fn new(runner: Arc<dyn ProcessRunner>, binary: impl Into<String>) -> Self {
        Self {
            runner,
            binary: binary.into(),
        }
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// 检查引擎可用以及 compose 子命令存在
    pub fn check_available(&self) -> Result<()> {
        let info = self.docker(&["info"])?;
        if !info.success() {
            return Err(DataSecError::docker(format!(
                "Docker 服务未运行: {}",
                info.output.trim()
            )));
        }

        let compose = self.docker(&["compose", "version"])?;
        if !compose.success() {
            return Err(DataSecError::docker(format!(
                "Docker Compose 未安装或不可用: {}",
                compose.output.trim()
            )));
        }
        Ok(())
    }

    /// 列出以 `prefix` 开头的卷名（已排序）
    pub fn list_volumes(&self, prefix: &str) -> Result<Vec<String>> {
        let output = self.checked(&["volume", "ls", "--format", "{{.Name}}"], "列出数据卷")?;
        let mut volumes: Vec<String> = non_empty_lines(&output)
            .filter(|name| name.starts_with(prefix))
            .collect();
        volumes.sort();
        Ok(volumes)
    }

    /// 停止 compose 项目的服务
    pub fn compose_stop(&self, compose_file: &Path, project: &str) -> Result<()> {
        info!("停止伴随平台服务: {}", project);
        self.compose(compose_file, project, "stop")
    }

    /// 启动 compose 项目的服务
    pub fn compose_start(&self, compose_file: &Path, project: &str) -> Result<()> {
        info!("启动伴随平台服务: {}", project);
        self.compose(compose_file, project, "start")
    }

    fn compose(&self, compose_file: &Path, project: &str, action: &str) -> Result<()> {
        let compose_path = compose_file.to_string_lossy();
        self.checked(
            &["compose", "-f", &compose_path, "-p", project, action],
            &format!("docker compose {action}"),
        )?;
        Ok(())
    }

    /// 通过一次性辅助容器把卷导出为 `<out_dir>/<volume>.tar.gz`，返回归档文件名
    pub fn export_volume(&self, helper_image: &str, volume: &str, out_dir: &Path) -> Result<String> {
        let archive = format!("{volume}{VOLUME_ARCHIVE_EXTENSION}");
        let source = format!("{volume}:{HELPER_SOURCE_MOUNT}:ro");
        let target = format!("{}:{HELPER_TARGET_MOUNT}", out_dir.to_string_lossy());
        let script = format!("cd {HELPER_SOURCE_MOUNT} && tar -czf {HELPER_TARGET_MOUNT}/{archive} .");

        debug!(volume, archive = %archive, "导出数据卷");
        self.checked(
            &[
                "run", "--rm", "-v", &source, "-v", &target, helper_image, "sh", "-c", &script,
            ],
            &format!("导出数据卷 {volume}"),
        )?;
        Ok(archive)
    }

    /// 列出本地镜像（`repo:tag`），忽略无标签镜像
    pub fn list_images(&self) -> Result<Vec<String>> {
        let output = self.checked(
            &["image", "ls", "--format", "{{.Repository}}:{{.Tag}}"],
            "列出镜像",
        )?;
        let mut images: Vec<String> = non_empty_lines(&output)
            .filter(|image| !image.contains(NONE_TAG))
            .collect();
        images.sort();
        images.dedup();
        Ok(images)
    }

    /// 导出单个镜像
    pub fn save_image(&self, image: &str, path: &Path) -> Result<()> {
        let path = path.to_string_lossy();
        self.checked(&["save", "-o", &path, image], &format!("导出镜像 {image}"))?;
        Ok(())
    }

    /// 所有容器名（包括已停止的）
    pub fn list_containers(&self) -> Result<Vec<String>> {
        let output = self.checked(&["ps", "-a", "--format", "{{.Names}}"], "列出容器")?;
        Ok(non_empty_lines(&output).collect())
    }

    pub fn inspect_containers(&self, names: &[String]) -> Result<serde_json::Value> {
        self.inspect(&["inspect"], names, "查看容器配置")
    }

    pub fn list_networks(&self) -> Result<Vec<String>> {
        let output = self.checked(&["network", "ls", "--format", "{{.Name}}"], "列出网络")?;
        Ok(non_empty_lines(&output).collect())
    }

    pub fn inspect_networks(&self, names: &[String]) -> Result<serde_json::Value> {
        self.inspect(&["network", "inspect"], names, "查看网络配置")
    }

    fn inspect(&self, base: &[&str], names: &[String], what: &str) -> Result<serde_json::Value> {
        if names.is_empty() {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        let mut args: Vec<&str> = base.to_vec();
        args.extend(names.iter().map(String::as_str));
        let output = self.checked(&args, what)?;
        serde_json::from_str(output.trim())
            .map_err(|e| DataSecError::docker(format!("{what}输出不是有效 JSON: {e}")))
    }

    fn docker(&self, args: &[&str]) -> Result<ProcessOutput> {
        let argv = argv(std::iter::once(self.binary.as_str()).chain(args.iter().copied()));
        self.runner.run(&argv)
    }

    /// 执行命令，非零退出码转为错误并附带输出
    fn checked(&self, args: &[&str], what: &str) -> Result<String> {
        let output = self.docker(args)?;
        if !output.success() {
            return Err(DataSecError::docker(format!(
                "{what}失败 (exit {}): {}",
                output.exit_code,
                output.output.trim()
            )));
        }
        Ok(output.output)
    }
}

fn non_empty_lines(output: &str) -> impl Iterator<Item = String> + '_ {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::testing::RecordingRunner;

    fn engine(runner: &Arc<RecordingRunner>) -> DockerEngine {
        DockerEngine::new(runner.clone(), "docker")
    }

    #[test]
    fn test_check_available_reports_missing_compose() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(&["docker", "compose", "version"], 1, "unknown command: compose");
        let err = engine(&runner).check_available().unwrap_err();
        assert!(err.to_string().contains("unknown command"));
    }

    #[test]
    fn test_list_volumes_filters_by_prefix() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            &["docker", "volume", "ls"],
            0,
            "ragflow_mysql_data\nother_data\n\nragflow_esdata01\n",
        );
        let volumes = engine(&runner).list_volumes("ragflow_").unwrap();
        assert_eq!(volumes, vec!["ragflow_esdata01", "ragflow_mysql_data"]);
    }

    #[test]
    fn test_export_volume_mounts_read_only() {
        let runner = Arc::new(RecordingRunner::new());
        let archive = engine(&runner)
            .export_volume("alpine:3.20", "ragflow_minio", Path::new("/tmp/pack/volumes"))
            .unwrap();
        assert_eq!(archive, "ragflow_minio.tar.gz");

        let call = runner.calls().pop().unwrap();
        assert!(call.contains(&"ragflow_minio:/from:ro".to_string()));
        assert!(call.contains(&"/tmp/pack/volumes:/to".to_string()));
    }

    #[test]
    fn test_non_zero_exit_carries_output() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(&["docker", "compose"], 2, "no such service");
        let err = engine(&runner)
            .compose_stop(Path::new("/srv/docker-compose.yml"), "ragflow")
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("exit 2"));
        assert!(text.contains("no such service"));
    }

    #[test]
    fn test_list_images_skips_untagged() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            &["docker", "image", "ls"],
            0,
            "infiniflow/ragflow:v0.17.2\n<none>:<none>\nredis:7\n",
        );
        let images = engine(&runner).list_images().unwrap();
        assert_eq!(images, vec!["infiniflow/ragflow:v0.17.2", "redis:7"]);
    }

    #[test]
    fn test_inspect_empty_list_skips_command() {
        let runner = Arc::new(RecordingRunner::new());
        let value = engine(&runner).inspect_networks(&[]).unwrap();
        assert_eq!(value, serde_json::json!([]));
        assert!(runner.calls().is_empty());
    }
}
