use crate::Result;
use crate::constants::version::version_info::MANIFEST_FORMAT_VERSION;
use crate::db::BackupKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io;
use std::path::Path;

/// 迁移包清单（manifest.json）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub format_version: u32,
    pub kind: BackupKind,
    pub created_at: String,
    pub job_id: i64,
    pub app_db: AppDbEntry,
    pub compose: ComposeEntry,
    pub volumes: Vec<VolumeArchive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppDbEntry {
    /// 源数据库路径
    pub source: String,
    /// 包内相对路径
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComposeEntry {
    pub compose_file: String,
    /// 包内的 compose 副本
    pub copied_files: Vec<String>,
    pub project_name: String,
    pub volume_prefix: String,
    pub services_stopped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VolumeArchive {
    pub name: String,
    /// 归档文件名（位于 platform/volumes/ 下）
    pub archive: String,
    pub size_bytes: u64,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadEntry {
    pub host: String,
    pub username: String,
    pub target_path: String,
}

/// 全量备份清单（full_backup_manifest.json）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FullManifest {
    pub format_version: u32,
    pub created_at: String,
    pub job_id: i64,
    pub images: Vec<ImageArchive>,
    pub images_skipped: bool,
    pub containers_file: String,
    pub networks_file: String,
    pub volumes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageArchive {
    pub image: String,
    /// 归档文件名（位于 platform/images/ 下）
    pub archive: String,
}

impl Manifest {
    pub fn format_version() -> u32 {
        MANIFEST_FORMAT_VERSION
    }
}

/// 以格式化 JSON 写入文件
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

/// 计算文件的 sha256 和大小
pub fn file_digest(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_file_digest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.tar.gz");
        std::fs::write(&path, b"abc").unwrap();

        let (sha, size) = file_digest(&path).unwrap();
        assert_eq!(size, 3);
        assert_eq!(
            sha,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_upload_omitted_when_absent() {
        let manifest = Manifest {
            format_version: Manifest::format_version(),
            kind: BackupKind::Incremental,
            created_at: "2026-03-10T02:00:00+08:00".to_string(),
            job_id: 1,
            app_db: AppDbEntry {
                source: "data/auth.db".to_string(),
                file: "app.db".to_string(),
            },
            compose: ComposeEntry {
                compose_file: "/srv/ragflow/docker-compose.yml".to_string(),
                copied_files: vec!["platform/docker-compose.yml".to_string()],
                project_name: "ragflow".to_string(),
                volume_prefix: "ragflow_".to_string(),
                services_stopped: true,
            },
            volumes: Vec::new(),
            upload: None,
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert!(json.get("upload").is_none());
        assert_eq!(json["kind"], "incremental");
    }
}
