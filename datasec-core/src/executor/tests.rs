use super::manifest::{FullManifest, Manifest};
use super::*;
use crate::container::testing::RecordingRunner;
use crate::db::{Database, SettingsUpdate, TargetMode};
use std::fs::{self, File};
use std::sync::Arc;
use tempfile::{TempDir, tempdir};

/// 一个完整的执行环境：临时数据库、compose 目录以及模拟的 docker
pub(crate) struct Fixture {
    pub(crate) dir: TempDir,
    pub(crate) runner: Arc<RecordingRunner>,
    pub(crate) settings: SettingsStore,
    pub(crate) jobs: JobStore,
    pub(crate) executor: BackupExecutor,
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("data/auth.db"), Duration::from_secs(5)).unwrap();
        let settings = SettingsStore::new(db.clone());
        let jobs = JobStore::new(db.clone());

        let platform = dir.path().join("ragflow");
        fs::create_dir_all(&platform).unwrap();
        let compose = platform.join("docker-compose.yml");
        fs::write(
            &compose,
            "name: ragflow\nservices:\n  mysql:\n    image: mysql:8.0\n",
        )
        .unwrap();
        fs::write(platform.join(".env"), "MYSQL_PASSWORD=infini_rag_flow\n").unwrap();

        settings
            .update_settings(SettingsUpdate {
                target_mode: Some(TargetMode::Local),
                target_local_dir: Some(Some(
                    dir.path().join("backups").to_string_lossy().to_string(),
                )),
                compose_path: Some(Some(compose.to_string_lossy().to_string())),
                ..Default::default()
            })
            .unwrap();

        let runner = Arc::new(RecordingRunner::new());
        runner.respond(
            &["docker", "volume", "ls"],
            0,
            "ragflow_v1\nragflow_v2\nother_v3\n",
        );
        runner.on_call(&["docker", "run"], write_fake_archive);

        let engine = DockerEngine::new(runner.clone(), "docker");
        let executor = BackupExecutor::new(
            settings.clone(),
            jobs.clone(),
            engine,
            ExecutorOptions {
                helper_image: "alpine:3.20".to_string(),
                upload_binary: "scp".to_string(),
                default_app_db: db.path().to_path_buf(),
                busy_timeout: Duration::from_secs(5),
            },
        );

        Self {
            dir,
            runner,
            settings,
            jobs,
            executor,
        }
    }

    pub(crate) fn update(&self, update: SettingsUpdate) {
        self.settings.update_settings(update).unwrap();
    }

    fn run(&self, kind: BackupKind) -> (i64, Result<PathBuf>) {
        let job = self
            .jobs
            .create_job(kind, JobStatus::Queued, "测试触发")
            .unwrap();
        (job.id, self.executor.run(job.id, kind))
    }
}

/// 模拟辅助容器：在挂载的输出目录中写出 `<volume>.tar.gz`
fn write_fake_archive(argv: &[String]) {
    let volume = argv
        .iter()
        .find_map(|a| a.strip_suffix(":/from:ro"))
        .unwrap();
    let out_dir = argv.iter().find_map(|a| a.strip_suffix(":/to")).unwrap();
    fs::write(
        Path::new(out_dir).join(format!("{volume}.tar.gz")),
        volume.as_bytes(),
    )
    .unwrap();
}

fn position(lines: &[String], pred: impl Fn(&str) -> bool) -> usize {
    lines.iter().position(|l| pred(l)).unwrap()
}

#[test]
fn test_incremental_exports_every_prefixed_volume() {
    let fx = Fixture::new();
    let (job_id, result) = fx.run(BackupKind::Incremental);
    let pack = result.unwrap();

    let manifest: Manifest =
        serde_json::from_reader(File::open(pack.join(backup::MANIFEST_FILE_NAME)).unwrap())
            .unwrap();
    let names: Vec<&str> = manifest.volumes.iter().map(|v| v.name.as_str()).collect();
    assert_eq!(names, ["ragflow_v1", "ragflow_v2"]);
    for volume in &manifest.volumes {
        let archive = pack.join("platform/volumes").join(&volume.archive);
        assert!(archive.is_file());
        assert_eq!(volume.size_bytes, volume.name.len() as u64);
    }
    assert!(pack.join(backup::APP_DB_FILE_NAME).is_file());
    assert!(pack.join("platform/docker-compose.yml").is_file());
    assert!(pack.join("platform/.env").is_file());
    assert!(!pack.join(backup::FULL_MANIFEST_FILE_NAME).exists());
    assert_eq!(manifest.compose.project_name, "ragflow");
    assert_eq!(manifest.compose.volume_prefix, "ragflow_");
    assert!(manifest.compose.services_stopped);
    assert!(manifest.upload.is_none());

    let job = fx.jobs.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.progress, 100);
    assert_eq!(
        job.output_dir.as_deref(),
        Some(&*pack.to_string_lossy())
    );
    assert!(job.started_at_ms.is_some() && job.finished_at_ms.is_some());

    let settings = fx.settings.get_settings().unwrap();
    assert!(settings.last_run_at_ms.is_some());
    assert!(settings.last_incremental_backup_time_ms.is_some());
    assert!(settings.last_full_backup_time_ms.is_none());

    // 停服 -> 导出 -> 恢复
    let lines = fx.runner.call_lines();
    let stop = position(&lines, |l| l.starts_with("docker compose -f") && l.ends_with(" stop"));
    let export = position(&lines, |l| l.starts_with("docker run"));
    let start = position(&lines, |l| l.starts_with("docker compose -f") && l.ends_with(" start"));
    assert!(stop < export && export < start);
    assert!(lines.iter().all(|l| !l.contains("other_v3")));
}

#[test]
fn test_export_failure_still_restarts_services() {
    let fx = Fixture::new();
    fx.runner
        .respond(&["docker", "run"], 1, "no space left on device");

    let (job_id, result) = fx.run(BackupKind::Incremental);
    let err = result.unwrap_err();
    assert!(err.to_string().contains("no space left on device"));

    let lines = fx.runner.call_lines();
    let last = lines.last().unwrap();
    assert!(last.starts_with("docker compose -f") && last.ends_with(" start"));

    let job = fx.jobs.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.detail.unwrap().contains("no space left on device"));
    assert!(job.finished_at_ms.is_some());
    assert!(
        fx.settings
            .get_settings()
            .unwrap()
            .last_incremental_backup_time_ms
            .is_none()
    );
}

#[test]
fn test_restart_failure_does_not_mask_export_error() {
    let fx = Fixture::new();
    let compose = fx.dir.path().join("ragflow/docker-compose.yml");
    let compose = compose.to_string_lossy().to_string();
    fx.runner.respond(&["docker", "run"], 1, "volume busy");
    fx.runner.respond(
        &["docker", "compose", "-f", compose.as_str(), "-p", "ragflow", "start"],
        1,
        "container name conflict",
    );

    let (job_id, result) = fx.run(BackupKind::Incremental);
    let text = result.unwrap_err().to_string();
    assert!(text.contains("volume busy"));
    assert!(text.contains("container name conflict"));
    assert!(text.find("volume busy") < text.find("container name conflict"));

    let job = fx.jobs.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
}

#[test]
fn test_panic_during_export_still_restarts_services() {
    let fx = Fixture::new();
    fx.runner.on_call(&["docker", "run"], |_| panic!("辅助容器崩溃"));

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        fx.run(BackupKind::Incremental)
    }));
    assert!(outcome.is_err());

    let lines = fx.runner.call_lines();
    let compose = fx.dir.path().join("ragflow/docker-compose.yml");
    assert_eq!(
        lines.last().unwrap(),
        &format!("docker compose -f {} -p ragflow start", compose.display())
    );
    let starts = lines.iter().filter(|l| l.ends_with(" start")).count();
    assert_eq!(starts, 1);
}

#[test]
fn test_missing_target_fails_before_any_phase() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        target_local_dir: Some(None),
        ..Default::default()
    });

    let (job_id, result) = fx.run(BackupKind::Incremental);
    assert!(result.unwrap_err().is_config());
    assert!(fx.runner.calls().is_empty());
    assert!(!fx.dir.path().join("backups").exists());

    let job = fx.jobs.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.progress, 0);
    assert!(job.output_dir.is_none());
}

#[test]
fn test_incomplete_upload_config_is_rejected_up_front() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        upload_after_backup: Some(true),
        upload_host: Some(Some("10.0.0.5".to_string())),
        ..Default::default()
    });

    let (_, result) = fx.run(BackupKind::Incremental);
    let err = result.unwrap_err();
    assert!(err.is_config());
    assert!(err.to_string().contains("upload_username"));
    assert!(fx.runner.calls().is_empty());
}

#[test]
fn test_upload_runs_scp_after_manifest() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        upload_after_backup: Some(true),
        upload_host: Some(Some("10.0.0.5".to_string())),
        upload_username: Some(Some("backup".to_string())),
        upload_target_path: Some(Some("/data/packs".to_string())),
        ..Default::default()
    });

    let (_, result) = fx.run(BackupKind::Incremental);
    let pack = result.unwrap();

    let lines = fx.runner.call_lines();
    assert_eq!(
        lines.last().unwrap(),
        &format!(
            "scp -r -o BatchMode=yes {} backup@10.0.0.5:/data/packs",
            pack.display()
        )
    );
    let manifest: Manifest =
        serde_json::from_reader(File::open(pack.join(backup::MANIFEST_FILE_NAME)).unwrap())
            .unwrap();
    assert_eq!(manifest.upload.unwrap().host, "10.0.0.5");
}

#[test]
fn test_upload_failure_fails_job() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        upload_after_backup: Some(true),
        upload_host: Some(Some("10.0.0.5".to_string())),
        upload_username: Some(Some("backup".to_string())),
        upload_target_path: Some(Some("/data/packs".to_string())),
        ..Default::default()
    });
    fx.runner.respond(&["scp"], 255, "Permission denied (publickey)");

    let (job_id, result) = fx.run(BackupKind::Incremental);
    assert!(matches!(result.unwrap_err(), DataSecError::Upload(_)));
    let job = fx.jobs.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.detail.unwrap().contains("Permission denied"));
}

#[test]
fn test_services_left_running_when_stop_disabled() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        stop_services: Some(false),
        ..Default::default()
    });

    let (_, result) = fx.run(BackupKind::Incremental);
    result.unwrap();
    assert!(
        fx.runner
            .call_lines()
            .iter()
            .all(|l| !l.starts_with("docker compose -f"))
    );
}

#[test]
fn test_full_backup_without_images_writes_placeholder() {
    let fx = Fixture::new();
    fx.update(SettingsUpdate {
        full_backup_enabled: Some(true),
        full_backup_include_images: Some(false),
        ..Default::default()
    });
    fx.runner.respond(&["docker", "ps"], 0, "ragflow-mysql\n");
    fx.runner
        .respond(&["docker", "inspect"], 0, r#"[{"Name": "/ragflow-mysql"}]"#);
    fx.runner
        .respond(&["docker", "network", "ls"], 0, "ragflow_default\n");
    fx.runner.respond(
        &["docker", "network", "inspect"],
        0,
        r#"[{"Name": "ragflow_default"}]"#,
    );

    let (_, result) = fx.run(BackupKind::Full);
    let pack = result.unwrap();

    let full: FullManifest = serde_json::from_reader(
        File::open(pack.join(backup::FULL_MANIFEST_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert!(full.images_skipped);
    assert!(full.images.is_empty());
    assert_eq!(full.volumes, ["ragflow_v1", "ragflow_v2"]);
    assert!(pack.join("platform/images/IMAGES_SKIPPED.txt").is_file());

    let containers: serde_json::Value =
        serde_json::from_reader(File::open(pack.join(&full.containers_file)).unwrap()).unwrap();
    assert_eq!(containers[0]["Name"], "/ragflow-mysql");
    assert!(pack.join(&full.networks_file).is_file());

    let manifest: Manifest =
        serde_json::from_reader(File::open(pack.join(backup::MANIFEST_FILE_NAME)).unwrap())
            .unwrap();
    assert_eq!(manifest.kind, BackupKind::Full);
    assert!(
        fx.runner
            .call_lines()
            .iter()
            .all(|l| !l.starts_with("docker save"))
    );

    let settings = fx.settings.get_settings().unwrap();
    assert!(settings.last_full_backup_time_ms.is_some());
    assert!(settings.last_incremental_backup_time_ms.is_none());
}

#[test]
fn test_full_backup_saves_tagged_images() {
    let fx = Fixture::new();
    fx.runner.respond(
        &["docker", "image", "ls"],
        0,
        "infiniflow/ragflow:v0.17.2\n<none>:<none>\n",
    );

    let (_, result) = fx.run(BackupKind::Full);
    let pack = result.unwrap();

    let expected = pack.join("platform/images/infiniflow_ragflow_v0.17.2.tar");
    let lines = fx.runner.call_lines();
    assert!(lines.contains(&format!(
        "docker save -o {} infiniflow/ragflow:v0.17.2",
        expected.display()
    )));
    assert_eq!(
        lines.iter().filter(|l| l.starts_with("docker save")).count(),
        1
    );
}
