use async_trait::async_trait;
use log::{debug, warn};
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use std::io::ErrorKind;
use std::path::PathBuf;

use super::{not_found, ImageStore, StagedFile, StagedImage, StoredImage};
use crate::error::AppError;
use crate::upload::UploadedImage;

const EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "gif", "webp"];

/// Files named `{memory_id}.{ext}` under the upload directory.
///
/// New files are written under a temporary name by `stage` and renamed into
/// place by `commit`. Removal waits for `cleanup`. A rolled back transaction
/// therefore leaves the published files untouched.
pub struct DiskImageStore {
    root: PathBuf,
}

impl DiskImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, memory_id: &str, ext: &str) -> PathBuf {
        self.root.join(format!("{}.{}", memory_id, ext))
    }

    async fn remove_files(&self, memory_id: &str, keep: Option<&str>) {
        for ext in EXTENSIONS {
            if Some(ext) == keep {
                continue;
            }
            let path = self.path_for(memory_id, ext);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => debug!("removed image file {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!("failed to remove image file {}: {}", path.display(), e),
            }
        }
    }
}

fn check_id(memory_id: &str) -> Result<(), AppError> {
    // ids become file names
    uuid::Uuid::parse_str(memory_id)
        .map(|_| ())
        .map_err(|_| not_found(memory_id))
}

#[async_trait]
impl ImageStore for DiskImageStore {
    fn name(&self) -> &'static str {
        "disk"
    }

    async fn stage(&self, memory_id: &str, image: &UploadedImage) -> Result<StagedImage, AppError> {
        check_id(memory_id)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::storage("failed to create upload directory", e))?;
        let target = self.path_for(memory_id, image.extension());
        let staged = self.root.join(format!(
            "{}.{}.{}.tmp",
            memory_id,
            image.extension(),
            uuid::Uuid::new_v4().simple()
        ));
        tokio::fs::write(&staged, &image.bytes)
            .await
            .map_err(|e| AppError::storage("failed to write image file", e))?;
        Ok(StagedImage {
            file: Some(StagedFile { staged, target }),
        })
    }

    async fn save(
        &self,
        _txn: &DatabaseTransaction,
        memory_id: &str,
        _image: &UploadedImage,
    ) -> Result<(), AppError> {
        check_id(memory_id)
    }

    async fn fetch(&self, _db: &DatabaseConnection, memory_id: &str) -> Result<StoredImage, AppError> {
        check_id(memory_id)?;
        for ext in EXTENSIONS {
            let path = self.path_for(memory_id, ext);
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    let mime_type = mime_guess::from_ext(ext)
                        .first_raw()
                        .unwrap_or("application/octet-stream")
                        .to_string();
                    return Ok(StoredImage { bytes, mime_type });
                }
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::storage("failed to read image file", e)),
            }
        }
        Err(not_found(memory_id))
    }

    async fn delete(&self, _txn: &DatabaseTransaction, _memory_id: &str) -> Result<(), AppError> {
        Ok(())
    }

    async fn commit(&self, memory_id: &str, staged: StagedImage) {
        let Some(file) = staged.file else { return };
        if let Err(e) = tokio::fs::rename(&file.staged, &file.target).await {
            warn!(
                "failed to publish image file {}: {}",
                file.target.display(),
                e
            );
            return;
        }
        let keep = file.target.extension().and_then(|ext| ext.to_str());
        self.remove_files(memory_id, keep).await;
    }

    async fn discard(&self, staged: StagedImage) {
        let Some(file) = staged.file else { return };
        if let Err(e) = tokio::fs::remove_file(&file.staged).await {
            warn!("failed to remove staged file {}: {}", file.staged.display(), e);
        }
    }

    async fn cleanup(&self, memory_id: &str) {
        if check_id(memory_id).is_ok() {
            self.remove_files(memory_id, None).await;
        }
    }
}
