use super::manifest::{self, FullManifest, ImageArchive};
use super::{BackupExecutor, pack_relative};
use crate::constants::backup::{
    CONTAINERS_FILE_NAME, FULL_MANIFEST_FILE_NAME, IMAGE_ARCHIVE_EXTENSION, IMAGES_DIR_NAME,
    IMAGES_SKIPPED_NOTE, NETWORKS_FILE_NAME, PLATFORM_DIR_NAME,
};
use crate::constants::progress;
use crate::db::DataSecuritySettings;
use crate::Result;
use chrono::Local;
use std::fs;
use std::path::Path;
use tracing::info;

const IMAGES_SKIPPED_TEXT: &str = "本次全量备份未导出镜像（full_backup_include_images = false）。\n\
恢复前需要在目标主机上重新拉取伴随平台所用的镜像。\n";

/// 镜像名转换为文件名：`infiniflow/ragflow:v0.17.2` -> `infiniflow_ragflow_v0.17.2`
fn image_file_stem(image: &str) -> String {
    image
        .chars()
        .map(|c| match c {
            '/' | ':' | '@' | '\\' => '_',
            c => c,
        })
        .collect()
}

impl BackupExecutor {
    /// 全量扩展：镜像、容器与网络配置，以及第二份清单
    pub(super) fn run_full_extension(
        &self,
        job_id: i64,
        settings: &DataSecuritySettings,
        pack_dir: &Path,
        volumes: &[String],
    ) -> Result<FullManifest> {
        let platform_dir = pack_dir.join(PLATFORM_DIR_NAME);
        let images_dir = platform_dir.join(IMAGES_DIR_NAME);
        fs::create_dir_all(&images_dir)?;

        let mut images = Vec::new();
        let images_skipped = !settings.full_backup_include_images;
        if images_skipped {
            fs::write(images_dir.join(IMAGES_SKIPPED_NOTE), IMAGES_SKIPPED_TEXT)?;
        } else {
            for image in self.engine.list_images()? {
                let archive = format!("{}{IMAGE_ARCHIVE_EXTENSION}", image_file_stem(&image));
                info!("导出镜像: {}", image);
                self.engine.save_image(&image, &images_dir.join(&archive))?;
                images.push(ImageArchive { image, archive });
            }
        }
        self.report(
            job_id,
            progress::IMAGES_DONE,
            &format!("镜像处理完成（{} 个）", images.len()),
        )?;

        let containers = self.engine.list_containers()?;
        let containers_path = platform_dir.join(CONTAINERS_FILE_NAME);
        manifest::write_json(&containers_path, &self.engine.inspect_containers(&containers)?)?;

        let networks = self.engine.list_networks()?;
        let networks_path = platform_dir.join(NETWORKS_FILE_NAME);
        manifest::write_json(&networks_path, &self.engine.inspect_networks(&networks)?)?;
        self.report(job_id, progress::INSPECT_DONE, "容器与网络配置已导出")?;

        let full = FullManifest {
            format_version: manifest::Manifest::format_version(),
            created_at: Local::now().to_rfc3339(),
            job_id,
            images,
            images_skipped,
            containers_file: pack_relative(pack_dir, &containers_path),
            networks_file: pack_relative(pack_dir, &networks_path),
            volumes: volumes.to_vec(),
        };
        manifest::write_json(&pack_dir.join(FULL_MANIFEST_FILE_NAME), &full)?;
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_file_stem() {
        assert_eq!(
            image_file_stem("infiniflow/ragflow:v0.17.2"),
            "infiniflow_ragflow_v0.17.2"
        );
        assert_eq!(image_file_stem("redis:7"), "redis_7");
    }
}
