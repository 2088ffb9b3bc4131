//! Where image bytes live.
//!
//! Every strategy implements [`ImageStore`]. Writes take the open transaction
//! of the owning entry so the asset and its row commit or roll back together.
//! Stores that keep bytes outside the database stage them before the
//! transaction opens and publish or discard them once it has finished.
//! The repository owns `has_image`; stores only move bytes.

mod disk;
mod inline;
mod side_table;

pub use disk::DiskImageStore;
pub use inline::InlineImageStore;
pub use side_table::SideTableImageStore;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, DatabaseTransaction};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{AppConfig, ImageStorage};
use crate::error::AppError;
use crate::upload::UploadedImage;

#[derive(Clone, Debug, PartialEq)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Out-of-transaction state prepared by [`ImageStore::stage`].
#[derive(Debug, Default)]
pub struct StagedImage {
    file: Option<StagedFile>,
}

#[derive(Debug)]
struct StagedFile {
    staged: PathBuf,
    target: PathBuf,
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before the owning transaction opens. Nothing staged is visible
    /// until [`ImageStore::commit`].
    async fn stage(&self, _memory_id: &str, _image: &UploadedImage) -> Result<StagedImage, AppError> {
        Ok(StagedImage::default())
    }

    /// Stores `image` for the entry, replacing any previous asset.
    async fn save(
        &self,
        txn: &DatabaseTransaction,
        memory_id: &str,
        image: &UploadedImage,
    ) -> Result<(), AppError>;

    async fn fetch(&self, db: &DatabaseConnection, memory_id: &str) -> Result<StoredImage, AppError>;

    /// Removes the asset. Absent assets are not an error.
    async fn delete(&self, txn: &DatabaseTransaction, memory_id: &str) -> Result<(), AppError>;

    /// Publishes what `stage` prepared once the owning transaction committed.
    /// Failures are logged, never returned.
    async fn commit(&self, _memory_id: &str, _staged: StagedImage) {}

    /// Drops what `stage` prepared when the owning transaction failed.
    async fn discard(&self, _staged: StagedImage) {}

    /// Runs after the transaction that removed the asset has committed.
    /// Failures are logged, never returned.
    async fn cleanup(&self, _memory_id: &str) {}
}

pub type SharedImageStore = Arc<dyn ImageStore>;

pub fn build_image_store(config: &AppConfig) -> SharedImageStore {
    match config.image_storage {
        ImageStorage::Disk => Arc::new(DiskImageStore::new(config.upload_storage_path())),
        ImageStorage::Inline => Arc::new(InlineImageStore),
        ImageStorage::SideTable => Arc::new(SideTableImageStore),
    }
}

fn not_found(memory_id: &str) -> AppError {
    AppError::not_found(format!("image for memory {} not found", memory_id))
}
